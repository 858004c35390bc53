//! Server reply and push line formatting.
//!
//! `Display` renders the wire form without the trailing CRLF; the
//! connection writer appends it.

use std::fmt;

/// One outbound protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Unsolicited greeting carrying the session's assigned id.
    ClientId(i32),
    RoomCreated(i64),
    JoinedRoom,
    MessageSent,
    LeftRoom,
    /// Live member ids of a room, `None` when empty.
    UserList(Vec<i32>),
    RoomList(Vec<RoomEntry>),
    Messages {
        room_id: i64,
        entries: Vec<MessageEntry>,
    },
    /// Room-scoped chat message push.
    ChatMessage {
        room_id: i64,
        sender_id: i32,
        text: String,
    },
    UserJoined {
        room_id: i64,
        user_id: i32,
    },
    UserLeft {
        room_id: i64,
        user_id: i32,
    },
    Error(String),
}

/// One entry in a ROOM_LIST reply. The participant count is computed from
/// live registry membership, never read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEntry {
    pub id: i64,
    pub name: String,
    pub has_password: bool,
    pub participants: usize,
}

/// One entry in a MESSAGES reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEntry {
    pub sender_id: i32,
    pub body: MessageBody,
}

/// A stored message is either free text or a pointer at a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    File(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::ClientId(id) => write!(f, "SUCCESS:Client ID:{}", id),
            Reply::RoomCreated(id) => write!(f, "SUCCESS:Room created:{}", id),
            Reply::JoinedRoom => write!(f, "SUCCESS:Joined room"),
            Reply::MessageSent => write!(f, "SUCCESS:Message sent"),
            Reply::LeftRoom => write!(f, "SUCCESS:Left room"),
            Reply::UserList(ids) => {
                if ids.is_empty() {
                    return write!(f, "USER_LIST:None");
                }
                write!(f, "USER_LIST:")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ";")?;
                    }
                    write!(f, "{}", id)?;
                }
                Ok(())
            }
            Reply::RoomList(rooms) => {
                if rooms.is_empty() {
                    return write!(f, "ROOM_LIST:None");
                }
                write!(f, "ROOM_LIST:")?;
                for (i, room) in rooms.iter().enumerate() {
                    if i > 0 {
                        write!(f, ";")?;
                    }
                    write!(
                        f,
                        "{}:{}:{}:{}",
                        room.id,
                        room.name,
                        if room.has_password { "Yes" } else { "No" },
                        room.participants
                    )?;
                }
                Ok(())
            }
            Reply::Messages { room_id, entries } => {
                write!(f, "MESSAGES:{}:", room_id)?;
                if entries.is_empty() {
                    return write!(f, "None");
                }
                for (i, entry) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ";")?;
                    }
                    match &entry.body {
                        MessageBody::Text(text) => write!(f, "{},{}", entry.sender_id, text)?,
                        MessageBody::File(path) => {
                            write!(f, "{},File: {}", entry.sender_id, path)?
                        }
                    }
                }
                Ok(())
            }
            Reply::ChatMessage {
                room_id,
                sender_id,
                text,
            } => write!(f, "MESSAGE:{}:{}:{}", room_id, sender_id, text),
            Reply::UserJoined { room_id, user_id } => {
                write!(f, "USER_JOINED:{}:{}", room_id, user_id)
            }
            Reply::UserLeft { room_id, user_id } => {
                write!(f, "USER_LEFT:{}:{}", room_id, user_id)
            }
            Reply::Error(reason) => write!(f, "ERROR:{}", reason),
        }
    }
}
