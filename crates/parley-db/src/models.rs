/// Database row types, mapping directly to SQLite rows. The wire-facing
/// shapes live in parley-protocol to keep the DB layer independent.

pub struct RoomRow {
    pub id: i64,
    pub name: String,
    pub has_password: bool,
}

pub struct MessageRow {
    pub sender_id: i32,
    pub message: Option<String>,
    pub file_path: Option<String>,
}
