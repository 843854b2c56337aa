//! Real-time group chat core: a shared room log with live snapshots,
//! bounded retry, a simulated participant timer and AI summaries.

pub mod bot;
pub mod common;
pub mod config;
pub mod error;
pub mod identity;
pub mod retry;
pub mod room;
pub mod storage;
pub mod summarizer;
pub mod ui;

pub use common::{Identity, Message, MessageDraft, RoomEvent, UserCommand};
pub use error::{ChatError, ChatResult};
pub use retry::{RetryError, RetryPolicy, with_retry};
pub use room::{ConnectionState, RoomBackend, RoomChannel, SqliteBackend, Subscription};
