//! Wire protocol for the parley chat relay: dual-mode framing (newline
//! text lines interleaved with binary file frames on one stream), command
//! parsing, and reply formatting.

pub mod command;
pub mod frame;
pub mod reply;

pub use command::{Command, CommandError};
pub use frame::{
    FILE_MAGIC, FileFrame, FrameError, Framer, MAX_BUFFER, MAX_DATA_LEN, MAX_NAME_LEN, Unit,
    WireFormat, encode_client_frame, encode_relay_frame,
};
pub use reply::{MessageBody, MessageEntry, Reply, RoomEntry};
