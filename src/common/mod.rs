pub mod commands;
pub mod events;
pub mod types;

pub use commands::UserCommand;
pub use events::RoomEvent;
pub use types::{Identity, Message, MessageDraft};
