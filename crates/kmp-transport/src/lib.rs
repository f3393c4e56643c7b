//! Non-blocking TCP transport for kmp.
//!
//! Provides the socket plumbing the framing engine runs on:
//! - [`TcpTransport`]: bind / accept / connect with host-name resolution
//! - [`KmpStream`]: a connected non-blocking stream (`Read + Write`)
//! - [`Dispatcher`]: readiness multiplexing (epoll / kqueue / IOCP via mio)
//! - [`ShutdownSignal`]: a wakeable stop request for event loops
//!
//! This is the lowest layer of kmp. Everything else builds on top of it.

pub mod dispatcher;
pub mod error;
pub mod shutdown;
pub mod stream;
pub mod tcp;

pub use dispatcher::{Dispatcher, Readiness};
pub use error::{Result, TransportError};
pub use shutdown::ShutdownSignal;
pub use stream::KmpStream;
pub use tcp::{resolve, TcpTransport};

pub use mio::{Interest, Token};
