/// Errors that can occur during message encoding, decoding and transfer.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The body exceeds the maximum the wire format allows.
    #[error("body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// The command code does not fit the 24-bit code field.
    #[error("command code {0:#x} does not fit in 24 bits")]
    CodeOutOfRange(u32),

    /// Fewer than 20 header bytes were supplied.
    #[error("short header ({len} bytes, need 20)")]
    ShortHeader { len: usize },

    /// The declared length leaves no room for a body.
    #[error("malformed declared length {length} (must exceed the 20-byte header)")]
    MalformedLength { length: u32 },

    /// The declared body is larger than the receive buffer.
    #[error("declared body of {declared} bytes exceeds max {max}")]
    OversizedBody { declared: usize, max: usize },

    /// A complete message was expected but the body is truncated.
    #[error("short body (expected {expected} bytes, got {actual})")]
    ShortBody { expected: usize, actual: usize },

    /// An I/O error occurred while reading or writing.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transfer bookkeeping reached a state that must never occur.
    #[error("invalid transfer state: {0}")]
    InvalidState(&'static str),
}

/// Coarse classification of a [`FrameError`], used to decide how loudly a
/// connection teardown is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The outbound message cannot be represented on the wire.
    Encode,
    /// The peer sent bytes that violate the wire format.
    ProtocolViolation,
    /// The socket failed.
    IoFailure,
    /// Framing engine bug.
    InvalidState,
}

impl FrameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::BodyTooLarge { .. } | FrameError::CodeOutOfRange(_) => ErrorKind::Encode,
            FrameError::ShortHeader { .. }
            | FrameError::MalformedLength { .. }
            | FrameError::OversizedBody { .. }
            | FrameError::ShortBody { .. } => ErrorKind::ProtocolViolation,
            FrameError::Io(_) => ErrorKind::IoFailure,
            FrameError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
