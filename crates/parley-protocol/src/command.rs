//! Client command parsing.
//!
//! Commands are colon-separated fields on one text line. The final field
//! of each command keeps any embedded colons (message text and passwords
//! may contain them).

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateRoom { name: String, password: String },
    JoinRoom { room_id: i64, password: String },
    Message { room_id: i64, text: String },
    ListRooms,
    GetMessages { room_id: i64 },
    GetUsers { room_id: i64 },
    LeaveRoom { room_id: i64 },
}

/// Parse failures. `Display` output is the reason sent back on the wire
/// after the `ERROR:` prefix.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command")]
    Unknown,
    #[error("Invalid room ID")]
    InvalidRoomId,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let (verb, rest) = match line.split_once(':') {
            Some((verb, rest)) => (verb, rest),
            None => (line, ""),
        };

        match verb {
            "CREATE_ROOM" => {
                let (name, password) = split_tail(rest);
                Ok(Command::CreateRoom {
                    name: name.to_string(),
                    password: password.to_string(),
                })
            }
            "JOIN_ROOM" => {
                let (room_id, password) = split_tail(rest);
                Ok(Command::JoinRoom {
                    room_id: parse_room_id(room_id)?,
                    password: password.to_string(),
                })
            }
            "MESSAGE" => {
                let (room_id, text) = split_tail(rest);
                Ok(Command::Message {
                    room_id: parse_room_id(room_id)?,
                    text: text.to_string(),
                })
            }
            "LIST_ROOMS" => Ok(Command::ListRooms),
            "GET_MESSAGES" => Ok(Command::GetMessages {
                room_id: parse_room_id(rest)?,
            }),
            "GET_USERS" => Ok(Command::GetUsers {
                room_id: parse_room_id(rest)?,
            }),
            "LEAVE_ROOM" => Ok(Command::LeaveRoom {
                room_id: parse_room_id(rest)?,
            }),
            _ => Err(CommandError::Unknown),
        }
    }
}

/// Split one field off the front; the remainder keeps embedded colons.
fn split_tail(rest: &str) -> (&str, &str) {
    rest.split_once(':').unwrap_or((rest, ""))
}

fn parse_room_id(field: &str) -> Result<i64, CommandError> {
    field
        .trim()
        .parse::<i64>()
        .map_err(|_| CommandError::InvalidRoomId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_room_with_and_without_password() {
        assert_eq!(
            Command::parse("CREATE_ROOM:den:hunter2"),
            Ok(Command::CreateRoom {
                name: "den".into(),
                password: "hunter2".into()
            })
        );
        assert_eq!(
            Command::parse("CREATE_ROOM:den:"),
            Ok(Command::CreateRoom {
                name: "den".into(),
                password: String::new()
            })
        );
    }

    #[test]
    fn password_keeps_embedded_colons() {
        assert_eq!(
            Command::parse("JOIN_ROOM:3:a:b:c"),
            Ok(Command::JoinRoom {
                room_id: 3,
                password: "a:b:c".into()
            })
        );
    }

    #[test]
    fn message_text_keeps_embedded_colons() {
        assert_eq!(
            Command::parse("MESSAGE:12:note: remember the thing"),
            Ok(Command::Message {
                room_id: 12,
                text: "note: remember the thing".into()
            })
        );
    }

    #[test]
    fn bare_and_argument_commands() {
        assert_eq!(Command::parse("LIST_ROOMS"), Ok(Command::ListRooms));
        assert_eq!(
            Command::parse("GET_MESSAGES:5"),
            Ok(Command::GetMessages { room_id: 5 })
        );
        assert_eq!(
            Command::parse("GET_USERS:5"),
            Ok(Command::GetUsers { room_id: 5 })
        );
        assert_eq!(
            Command::parse("LEAVE_ROOM:5"),
            Ok(Command::LeaveRoom { room_id: 5 })
        );
    }

    #[test]
    fn bad_room_ids() {
        assert_eq!(
            Command::parse("JOIN_ROOM:abc:pw"),
            Err(CommandError::InvalidRoomId)
        );
        assert_eq!(
            Command::parse("MESSAGE::hi"),
            Err(CommandError::InvalidRoomId)
        );
        assert_eq!(
            Command::parse("GET_MESSAGES:"),
            Err(CommandError::InvalidRoomId)
        );
    }

    #[test]
    fn unknown_commands() {
        assert_eq!(Command::parse("SHOUT:1:hi"), Err(CommandError::Unknown));
        assert_eq!(Command::parse(""), Err(CommandError::Unknown));
    }
}
