mod channel;
mod sqlite;

pub use channel::{ConnectionState, RoomChannel, Subscription};
pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::common::{Message, MessageDraft};
use crate::error::ChatResult;

/// Document-log service hosting one room.
///
/// The backend owns ordering and identity assignment; clients only propose
/// content through [`MessageDraft`].
#[async_trait]
pub trait RoomBackend: Send + Sync {
    /// Issue an opaque participant id without credentials.
    async fn sign_in_anonymously(&self) -> ChatResult<String>;

    /// Commit a draft and return the stored message.
    async fn insert(&self, draft: &MessageDraft) -> ChatResult<Message>;

    /// Every message, ordered by creation time then insertion order.
    async fn list_ordered(&self) -> ChatResult<Vec<Message>>;

    async fn list_ids(&self) -> ChatResult<Vec<String>>;

    /// Delete one message. Returns false when it was already gone.
    async fn delete(&self, id: &str) -> ChatResult<bool>;

    /// Fires after every committed mutation made through this handle.
    fn changes(&self) -> broadcast::Receiver<()>;
}
