//! Partial-I/O framing engine for the kmp wire protocol.
//!
//! Every message is a fixed 20-byte header followed by a body of at most
//! 1024 bytes. All multi-byte header fields are big-endian:
//! - version (1B) and total length (3B)
//! - flag (1B) and command code (3B)
//! - application id, hop-by-hop id, end-to-end id (4B each)
//!
//! [`advance_receive`] and [`advance_send`] move one message forward by at
//! most one `read`/`write` on a non-blocking socket, keeping their progress in
//! a [`TransferState`] so that any partial transfer resumes where it stopped.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod state;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::KmpCodec;
pub use codec::{
    decode_header, decode_message, encode, encode_message, Header, Message, HEADER_SIZE,
    MAX_BODY, MAX_U24, PROTOCOL_VERSION,
};
pub use error::{ErrorKind, FrameError, Result};
pub use reader::{advance_receive, RecvStatus};
pub use state::TransferState;
pub use writer::{advance_send, SendStatus};
