/// Anonymous participant issued by the room backend.
#[derive(Debug, Clone)]
pub struct Participant {
    pub uid: String,
    pub created_at: i64,
}
