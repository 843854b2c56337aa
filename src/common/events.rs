use super::types::Message;

/// Events pushed from the room subscription up to the front end.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Full ordered log at the time of delivery.
    Snapshot(Vec<Message>),
    SubscriptionError(String),
    /// A user message gave up after its retries; `text` is kept for resending.
    SendFailed { text: String, error: String },
}
