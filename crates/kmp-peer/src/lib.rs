//! Connection management for kmp peers.
//!
//! This is the "just works" layer: a multiplexing [`Server`] that runs one
//! [`Connection`] state machine per accepted socket, and a request/reply
//! [`Client`]. Both drive the non-blocking framing engine from `kmp-frame`
//! over sockets from `kmp-transport`.

pub mod client;
pub mod connection;
pub mod error;
pub mod responder;
pub mod server;

pub use client::{Client, ClientConfig};
pub use connection::{Connection, Disposition, Phase};
pub use error::{PeerError, Result};
pub use responder::{Echo, Reply, Responder};
pub use server::{Server, ServerConfig, ServerStats};
