//! Length-prefixed message framing over non-blocking TCP.
//!
//! Every kmp message is a 20-byte big-endian header followed by a body of up
//! to 1024 bytes. Peers exchange messages over non-blocking sockets and make
//! progress one partial `read`/`write` at a time.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP listener/stream, readiness dispatcher, shutdown signal
//! - [`frame`]: wire codec and the partial-I/O framing engine
//! - [`peer`]: multiplexing server and request client (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use kmp_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use kmp_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use kmp_peer::*;
}
