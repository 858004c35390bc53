use anyhow::{Result, bail};
use rusqlite::OptionalExtension;

use crate::Database;
use crate::models::{MessageRow, RoomRow};

impl Database {
    // -- Rooms --

    /// Insert a room and return its assigned id.
    pub fn create_room(&self, name: &str, password: &str) -> Result<i64> {
        if name.is_empty() {
            bail!("Room name is empty");
        }
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rooms (name, password) VALUES (?1, ?2)",
                (name, password),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Stored password for a room; `None` when the room does not exist.
    /// An empty string means the room is unprotected.
    pub fn room_password(&self, room_id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let password = conn
                .query_row(
                    "SELECT password FROM rooms WHERE id = ?1",
                    [room_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(password)
        })
    }

    pub fn list_rooms(&self) -> Result<Vec<RoomRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, password FROM rooms ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    let password: String = row.get(2)?;
                    Ok(RoomRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        has_password: !password.is_empty(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message row. A row carries either free text or the path of
    /// a stored file, never both.
    pub fn insert_message(
        &self,
        room_id: i64,
        sender_id: i32,
        text: Option<&str>,
        file_path: Option<&str>,
    ) -> Result<()> {
        debug_assert!(text.is_some() != file_path.is_some());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (room_id, sender_id, message, file_path)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![room_id, sender_id, text, file_path],
            )?;
            Ok(())
        })
    }

    /// All messages for a room, oldest first. The id tiebreak keeps rows
    /// inserted within the same second in insertion order.
    pub fn messages_for_room(&self, room_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, message, file_path FROM messages
                 WHERE room_id = ?1 ORDER BY timestamp, id",
            )?;
            let rows = stmt
                .query_map([room_id], |row| {
                    Ok(MessageRow {
                        sender_id: row.get(0)?,
                        message: row.get(1)?,
                        file_path: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
