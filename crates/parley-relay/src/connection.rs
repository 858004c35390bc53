//! Per-connection protocol loops.

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

use parley_protocol::{FrameError, Framer, Reply, Unit, WireFormat};

use crate::commands;
use crate::registry::Outbound;
use crate::server::RelayState;

/// Read chunk size for the per-connection loop.
const READ_CHUNK: usize = 4096;

pub(crate) async fn handle_connection(state: RelayState, stream: TcpStream) -> Result<()> {
    let sock_ref = socket2::SockRef::from(&stream);
    sock_ref.set_nodelay(true)?;

    let (mut reader, mut writer) = stream.into_split();

    let (session_id, mut rx) = state.registry().register().await;

    // The peer learns its own identity before issuing any command.
    state
        .registry()
        .send_to(session_id, Outbound::Line(Reply::ClientId(session_id).to_string()))
        .await;

    // Writer task: drains the session's outbound channel. Lines go out
    // CRLF-terminated, file frames verbatim; everything a session is sent
    // shares this one ordered path.
    let write_handle = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            let result = match item {
                Outbound::Line(line) => {
                    writer.write_all(format!("{}\r\n", line).as_bytes()).await
                }
                Outbound::Frame(frame) => writer.write_all(&frame).await,
            };
            if result.is_err() {
                break;
            }
        }
    });

    info!("session {} connected", session_id);

    let mut framer = Framer::new(WireFormat::ClientToRelay);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break, // peer closed
            Ok(n) => n,
            Err(e) => {
                warn!("session {} read error: {}", session_id, e);
                break;
            }
        };
        framer.feed(&chunk[..n]);

        loop {
            match framer.next_unit() {
                Ok(Some(Unit::Line(line))) => {
                    commands::handle_line(&state, session_id, &line).await
                }
                Ok(Some(Unit::File(file))) => {
                    commands::handle_file(&state, session_id, file).await
                }
                Ok(None) => break,
                Err(e) => {
                    // The framer discarded its buffer; the connection stays
                    // open for subsequent commands.
                    warn!("session {} framing error: {}", session_id, e);
                    let reason = match e {
                        FrameError::InvalidFilePacket => "Invalid file packet",
                        FrameError::Overflow => "Message too large",
                    };
                    state
                        .registry()
                        .send_to(
                            session_id,
                            Outbound::Line(Reply::Error(reason.into()).to_string()),
                        )
                        .await;
                    break;
                }
            }
        }
    }

    // Unregister first so no new broadcast can target this session, then
    // tell its room it left.
    if let Some(room_id) = state.registry().unregister(session_id).await {
        state
            .registry()
            .broadcast_line(
                room_id,
                Reply::UserLeft {
                    room_id,
                    user_id: session_id,
                }
                .to_string(),
                None,
            )
            .await;
    }
    write_handle.abort();
    info!("session {} disconnected", session_id);

    Ok(())
}
