//! Command interpretation: parsed lines and reassembled file frames turn
//! into store calls, registry mutation, and outbound lines/frames.
//!
//! Every reply to the acting session goes through its outbound channel, so
//! direct responses and pushed notifications stay in one ordered stream.

use anyhow::{Result, anyhow};
use tracing::{error, info, warn};

use parley_db::Database;
use parley_protocol::{Command, FileFrame, MessageBody, MessageEntry, Reply, RoomEntry, frame};

use crate::registry::Outbound;
use crate::server::RelayState;

pub(crate) async fn handle_line(state: &RelayState, session_id: i32, line: &str) {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            warn!(
                "session {} bad command: {} -- raw: {}",
                session_id,
                e,
                line.chars().take(200).collect::<String>()
            );
            reply(state, session_id, Reply::Error(e.to_string())).await;
            return;
        }
    };

    match command {
        Command::CreateRoom { name, password } => {
            create_room(state, session_id, name, password).await
        }
        Command::JoinRoom { room_id, password } => {
            join_room(state, session_id, room_id, password).await
        }
        Command::Message { room_id, text } => send_message(state, session_id, room_id, text).await,
        Command::ListRooms => list_rooms(state, session_id).await,
        Command::GetMessages { room_id } => get_messages(state, session_id, room_id).await,
        Command::GetUsers { room_id } => get_users(state, session_id, room_id).await,
        Command::LeaveRoom { .. } => leave_room(state, session_id).await,
    }
}

/// A complete file frame from a client: persist the blob, record a message
/// row pointing at it, and relay to the other members with the sender id
/// injected into the header. The sender does not get its own file back.
pub(crate) async fn handle_file(state: &RelayState, session_id: i32, file: FileFrame) {
    let Some(room_id) = state.registry().room_of(session_id).await else {
        // A file from a session outside any room is consumed and ignored;
        // there is no error line for this case.
        warn!(
            "session {} sent file {} ({} bytes) while in no room, dropping",
            session_id,
            file.name,
            file.data.len()
        );
        return;
    };

    let stored_path = match state
        .storage()
        .save(room_id, session_id, &file.name, &file.data)
        .await
    {
        Ok(path) => path,
        Err(e) => {
            error!(
                "failed to store file {} from session {}: {}",
                file.name, session_id, e
            );
            reply(
                state,
                session_id,
                Reply::Error(format!("Failed to save file:{}", e)),
            )
            .await;
            return;
        }
    };

    let row_path = stored_path.clone();
    if let Err(e) = run_db(state, move |db| {
        db.insert_message(room_id, session_id, None, Some(&row_path))
    })
    .await
    {
        error!(
            "failed to record file message for session {}: {}",
            session_id, e
        );
        reply(
            state,
            session_id,
            Reply::Error(format!("Failed to save file:{}", e)),
        )
        .await;
        return;
    }

    info!(
        "session {} sent file {} ({} bytes) to room {}, stored at {}",
        session_id,
        file.name,
        file.data.len(),
        room_id,
        stored_path
    );

    let outgoing = frame::encode_relay_frame(session_id, &file.name, &file.data);
    state
        .registry()
        .broadcast_frame(room_id, outgoing, Some(session_id))
        .await;
}

async fn create_room(state: &RelayState, session_id: i32, name: String, password: String) {
    let line = match run_db(state, move |db| db.create_room(&name, &password)).await {
        Ok(room_id) => {
            info!("session {} created room {}", session_id, room_id);
            Reply::RoomCreated(room_id)
        }
        Err(e) => Reply::Error(format!("Failed to create room:{}", e)),
    };
    reply(state, session_id, line).await;
}

async fn join_room(state: &RelayState, session_id: i32, room_id: i64, password: String) {
    let stored = match run_db(state, move |db| db.room_password(room_id)).await {
        Ok(stored) => stored,
        Err(e) => {
            error!("password lookup failed for room {}: {}", room_id, e);
            None
        }
    };

    let Some(stored) = stored else {
        reply(state, session_id, Reply::Error("Room not found".into())).await;
        return;
    };

    // An empty stored password admits any supplied password; a non-empty
    // one requires an exact match.
    if !stored.is_empty() && stored != password {
        reply(state, session_id, Reply::Error("Invalid password".into())).await;
        return;
    }

    let registry = state.registry();
    if let Some(old_room) = registry.set_room(session_id, room_id).await {
        registry
            .broadcast_line(
                old_room,
                Reply::UserLeft {
                    room_id: old_room,
                    user_id: session_id,
                }
                .to_string(),
                Some(session_id),
            )
            .await;
    }

    info!("session {} joined room {}", session_id, room_id);

    registry
        .broadcast_line(
            room_id,
            Reply::UserJoined {
                room_id,
                user_id: session_id,
            }
            .to_string(),
            Some(session_id),
        )
        .await;

    // Two-line handshake: the success line, then the live member list of
    // the new room (the joiner included).
    let members = registry.members_of(room_id).await;
    reply(state, session_id, Reply::JoinedRoom).await;
    reply(state, session_id, Reply::UserList(members)).await;
}

async fn send_message(state: &RelayState, session_id: i32, room_id: i64, text: String) {
    if state.registry().room_of(session_id).await != Some(room_id) {
        reply(state, session_id, Reply::Error("Not in room".into())).await;
        return;
    }

    let stored_text = text.clone();
    if let Err(e) = run_db(state, move |db| {
        db.insert_message(room_id, session_id, Some(&stored_text), None)
    })
    .await
    {
        reply(
            state,
            session_id,
            Reply::Error(format!("Failed to save message:{}", e)),
        )
        .await;
        return;
    }

    // Persist, then fan out to every member including the sender, whose
    // client renders its own message from the broadcast.
    state
        .registry()
        .broadcast_line(
            room_id,
            Reply::ChatMessage {
                room_id,
                sender_id: session_id,
                text,
            }
            .to_string(),
            None,
        )
        .await;
    reply(state, session_id, Reply::MessageSent).await;
}

async fn list_rooms(state: &RelayState, session_id: i32) {
    let rooms = match run_db(state, |db| db.list_rooms()).await {
        Ok(rooms) => rooms,
        Err(e) => {
            error!("room list query failed: {}", e);
            reply(
                state,
                session_id,
                Reply::Error("Failed to fetch room list".into()),
            )
            .await;
            return;
        }
    };

    let counts = state.registry().room_counts().await;
    let entries = rooms
        .into_iter()
        .map(|room| {
            let participants = counts.get(&room.id).copied().unwrap_or(0);
            RoomEntry {
                id: room.id,
                name: room.name,
                has_password: room.has_password,
                participants,
            }
        })
        .collect();
    reply(state, session_id, Reply::RoomList(entries)).await;
}

async fn get_messages(state: &RelayState, session_id: i32, room_id: i64) {
    let rows = match run_db(state, move |db| db.messages_for_room(room_id)).await {
        Ok(rows) => rows,
        Err(e) => {
            reply(
                state,
                session_id,
                Reply::Error(format!("Failed to fetch messages:{}", e)),
            )
            .await;
            return;
        }
    };

    let entries = rows
        .into_iter()
        .map(|row| {
            let body = match (row.message, row.file_path) {
                (Some(text), _) => MessageBody::Text(text),
                (None, Some(path)) => MessageBody::File(path),
                (None, None) => MessageBody::Text(String::new()),
            };
            MessageEntry {
                sender_id: row.sender_id,
                body,
            }
        })
        .collect();
    reply(state, session_id, Reply::Messages { room_id, entries }).await;
}

async fn get_users(state: &RelayState, session_id: i32, room_id: i64) {
    let members = state.registry().members_of(room_id).await;
    reply(state, session_id, Reply::UserList(members)).await;
}

async fn leave_room(state: &RelayState, session_id: i32) {
    match state.registry().clear_room(session_id).await {
        Some(room_id) => {
            info!("session {} left room {}", session_id, room_id);
            state
                .registry()
                .broadcast_line(
                    room_id,
                    Reply::UserLeft {
                        room_id,
                        user_id: session_id,
                    }
                    .to_string(),
                    Some(session_id),
                )
                .await;
            reply(state, session_id, Reply::LeftRoom).await;
        }
        None => {
            reply(state, session_id, Reply::Error("Not in any room".into())).await;
        }
    }
}

async fn reply(state: &RelayState, session_id: i32, reply: Reply) {
    state
        .registry()
        .send_to(session_id, Outbound::Line(reply.to_string()))
        .await;
}

/// Run a blocking store call off the async runtime.
async fn run_db<T, F>(state: &RelayState, f: F) -> Result<T>
where
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db();
    match tokio::task::spawn_blocking(move || f(&db)).await {
        Ok(result) => result,
        Err(e) => Err(anyhow!("task join error: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use tokio::sync::mpsc;

    async fn test_state() -> (RelayState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("relay.db")).unwrap();
        let storage = Storage::new(dir.path().join("files")).await.unwrap();
        (RelayState::new(db, storage), dir)
    }

    fn drain_lines(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Line(line) = item {
                lines.push(line);
            }
        }
        lines
    }

    #[tokio::test]
    async fn join_replies_with_the_two_line_handshake() {
        let (state, _dir) = test_state().await;
        let (id, mut rx) = state.registry().register().await;

        handle_line(&state, id, "CREATE_ROOM:den:").await;
        handle_line(&state, id, "JOIN_ROOM:1:").await;

        assert_eq!(
            drain_lines(&mut rx),
            vec![
                "SUCCESS:Room created:1".to_string(),
                "SUCCESS:Joined room".to_string(),
                format!("USER_LIST:{}", id),
            ]
        );
    }

    #[tokio::test]
    async fn message_from_a_non_member_is_rejected_without_a_store_write() {
        let (state, _dir) = test_state().await;
        let (id, mut rx) = state.registry().register().await;

        handle_line(&state, id, "CREATE_ROOM:den:").await;
        let _ = drain_lines(&mut rx);

        handle_line(&state, id, "MESSAGE:1:hello").await;
        assert_eq!(drain_lines(&mut rx), vec!["ERROR:Not in room"]);

        handle_line(&state, id, "GET_MESSAGES:1").await;
        assert_eq!(drain_lines(&mut rx), vec!["MESSAGES:1:None"]);
    }

    #[tokio::test]
    async fn unknown_and_malformed_commands_answer_with_errors() {
        let (state, _dir) = test_state().await;
        let (id, mut rx) = state.registry().register().await;

        handle_line(&state, id, "SHOUT:loud").await;
        handle_line(&state, id, "JOIN_ROOM:abc:pw").await;
        assert_eq!(
            drain_lines(&mut rx),
            vec!["ERROR:Unknown command", "ERROR:Invalid room ID"]
        );
    }

    #[tokio::test]
    async fn wrong_password_leaves_membership_unchanged() {
        let (state, _dir) = test_state().await;
        let (id, mut rx) = state.registry().register().await;

        handle_line(&state, id, "CREATE_ROOM:vault:secret").await;
        handle_line(&state, id, "JOIN_ROOM:1:wrong").await;
        assert_eq!(
            drain_lines(&mut rx),
            vec!["SUCCESS:Room created:1", "ERROR:Invalid password"]
        );
        assert_eq!(state.registry().room_of(id).await, None);
    }

    #[tokio::test]
    async fn file_outside_a_room_is_dropped_without_persisting() {
        let (state, _dir) = test_state().await;
        let (id, mut rx) = state.registry().register().await;

        let file = FileFrame {
            name: "a.txt".into(),
            data: bytes::Bytes::from_static(b"hi"),
            sender_id: None,
        };
        handle_file(&state, id, file).await;
        assert!(drain_lines(&mut rx).is_empty());
    }
}
