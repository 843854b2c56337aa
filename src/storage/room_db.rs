use chrono::Utc;
use rusqlite::{Result as SqlResult, Row, TransactionBehavior, params};
use std::path::Path;
use uuid::Uuid;

use super::database::Database;
use super::models::Participant;
use crate::common::{Message, MessageDraft};

/// Document log for chat rooms plus the anonymous participant registry.
pub struct RoomDatabase {
    db: Database,
}

impl RoomDatabase {
    /// Open (or create) the room database at `path`.
    pub fn with_path<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let room_db = Self {
            db: Database::new(path)?,
        };
        room_db.init_schema()?;
        Ok(room_db)
    }

    pub fn in_memory() -> SqlResult<Self> {
        let room_db = Self {
            db: Database::in_memory()?,
        };
        room_db.init_schema()?;
        Ok(room_db)
    }

    fn init_schema(&self) -> SqlResult<()> {
        let conn = self.db.connection();

        // seq gives the stable tie-break for equal created_at values
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                room TEXT NOT NULL,
                text TEXT NOT NULL,
                author_id TEXT NOT NULL,
                author_name TEXT NOT NULL,
                author_color TEXT NOT NULL,
                is_summary INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS participants (
                uid TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_room_order ON messages(room, created_at, seq)",
            [],
        )?;

        Ok(())
    }

    // ========== Messages ==========

    /// Commit a draft, assigning its id and a non-decreasing server timestamp.
    pub fn insert_message(&mut self, room: &str, draft: &MessageDraft) -> SqlResult<Message> {
        let tx = self
            .db
            .connection_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let latest: i64 = tx.query_row(
            "SELECT COALESCE(MAX(created_at), 0) FROM messages WHERE room = ?1",
            params![room],
            |row| row.get(0),
        )?;
        let created_at = Utc::now().timestamp_millis().max(latest);
        let id = Uuid::new_v4().to_string();

        tx.execute(
            "INSERT INTO messages (id, room, text, author_id, author_name, author_color, is_summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                room,
                draft.text,
                draft.author_id,
                draft.author_display_name,
                draft.author_color,
                draft.is_summary,
                created_at
            ],
        )?;
        tx.commit()?;

        Ok(Message {
            id,
            text: draft.text.clone(),
            author_id: draft.author_id.clone(),
            author_display_name: draft.author_display_name.clone(),
            author_color: draft.author_color.clone(),
            created_at,
            is_summary: draft.is_summary,
        })
    }

    /// Full room log, oldest first.
    pub fn messages_ordered(&self, room: &str) -> SqlResult<Vec<Message>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare(
            "SELECT id, text, author_id, author_name, author_color, is_summary, created_at
             FROM messages
             WHERE room = ?1
             ORDER BY created_at ASC, seq ASC",
        )?;

        let messages = stmt
            .query_map(params![room], message_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(messages)
    }

    pub fn message_ids(&self, room: &str) -> SqlResult<Vec<String>> {
        let conn = self.db.connection();
        let mut stmt = conn.prepare("SELECT id FROM messages WHERE room = ?1 ORDER BY seq ASC")?;
        let ids = stmt
            .query_map(params![room], |row| row.get(0))?
            .collect::<SqlResult<Vec<String>>>()?;
        Ok(ids)
    }

    /// Delete one message. Returns false when it was already gone.
    pub fn delete_message(&self, room: &str, id: &str) -> SqlResult<bool> {
        let conn = self.db.connection();
        let deleted = conn.execute(
            "DELETE FROM messages WHERE room = ?1 AND id = ?2",
            params![room, id],
        )?;
        Ok(deleted > 0)
    }

    // ========== Participants ==========

    /// Register a fresh anonymous participant under a random id.
    pub fn insert_participant(&self) -> SqlResult<Participant> {
        let participant = Participant {
            uid: Uuid::new_v4().simple().to_string(),
            created_at: Utc::now().timestamp(),
        };
        self.db.connection().execute(
            "INSERT INTO participants (uid, created_at) VALUES (?1, ?2)",
            params![participant.uid, participant.created_at],
        )?;
        Ok(participant)
    }
}

fn message_from_row(row: &Row<'_>) -> SqlResult<Message> {
    Ok(Message {
        id: row.get(0)?,
        text: row.get(1)?,
        author_id: row.get(2)?,
        author_display_name: row.get(3)?,
        author_color: row.get(4)?,
        is_summary: row.get(5)?,
        created_at: row.get(6)?,
    })
}
