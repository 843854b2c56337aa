use rusqlite::{Connection, Result as SqlResult};
use std::path::Path;
use std::time::Duration;

/// How long a writer waits on a lock held by another process sharing the file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Base database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a file-backed database. WAL lets several chat processes share one room file.
    pub fn new<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {mode}");
        Ok(Self { conn })
    }

    pub fn in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
