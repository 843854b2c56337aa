use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::Result as SqlResult;
use tokio::sync::broadcast;

use super::RoomBackend;
use crate::common::{Message, MessageDraft};
use crate::error::{ChatError, ChatResult};
use crate::storage::{RoomDatabase, ensure_parent_dir};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// SQLite-hosted room. Several processes may open the same file; change
/// notifications only reach subscribers in this process.
pub struct SqliteBackend {
    room: String,
    db: Arc<Mutex<RoomDatabase>>,
    changes: broadcast::Sender<()>,
}

impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P, room: impl Into<String>) -> ChatResult<Self> {
        ensure_parent_dir(&path)?;
        let db = RoomDatabase::with_path(&path)?;
        log::info!("Opened room database {}", path.as_ref().display());
        Ok(Self::from_database(db, room))
    }

    pub fn in_memory(room: impl Into<String>) -> ChatResult<Self> {
        Ok(Self::from_database(RoomDatabase::in_memory()?, room))
    }

    fn from_database(db: RoomDatabase, room: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            room: room.into(),
            db: Arc::new(Mutex::new(db)),
            changes,
        }
    }

    /// Run `op` on the blocking pool; SQLite may wait up to its busy timeout
    /// on another process's write lock.
    ///
    /// A poisoned lock is taken over as-is. An interrupted transaction rolls
    /// back when dropped, so the connection is still usable.
    async fn with_db<T, F>(&self, op: F) -> ChatResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut RoomDatabase, &str) -> SqlResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let room = self.room.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = db.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut guard, &room)
        })
        .await
        .map_err(|err| ChatError::Task(err.to_string()))?;
        Ok(result?)
    }

    fn notify(&self) {
        // No receivers is fine
        let _ = self.changes.send(());
    }
}

#[async_trait]
impl RoomBackend for SqliteBackend {
    async fn sign_in_anonymously(&self) -> ChatResult<String> {
        let participant = self
            .with_db(|db, _| db.insert_participant())
            .await
            .map_err(|err| ChatError::AuthFailed(err.to_string()))?;
        log::debug!(
            "Issued anonymous participant {} at {}",
            participant.uid,
            participant.created_at
        );
        Ok(participant.uid)
    }

    async fn insert(&self, draft: &MessageDraft) -> ChatResult<Message> {
        if draft.text.trim().is_empty() {
            return Err(ChatError::WriteRejected("message text is empty".to_string()));
        }
        if draft.author_id.is_empty() {
            return Err(ChatError::WriteRejected("author id is missing".to_string()));
        }

        let draft = draft.clone();
        let message = self
            .with_db(move |db, room| db.insert_message(room, &draft))
            .await?;
        self.notify();
        Ok(message)
    }

    async fn list_ordered(&self) -> ChatResult<Vec<Message>> {
        self.with_db(|db, room| db.messages_ordered(room)).await
    }

    async fn list_ids(&self) -> ChatResult<Vec<String>> {
        self.with_db(|db, room| db.message_ids(room)).await
    }

    async fn delete(&self, id: &str) -> ChatResult<bool> {
        let id = id.to_string();
        let deleted = self
            .with_db(move |db, room| db.delete_message(room, &id))
            .await?;
        if deleted {
            self.notify();
        }
        Ok(deleted)
    }

    fn changes(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}
