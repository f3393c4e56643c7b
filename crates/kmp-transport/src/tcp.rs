use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use mio::event::Source;
use mio::{Interest, Registry, Token};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::KmpStream;

/// Non-blocking TCP listener transport.
///
/// Provides bind/accept/connect over IPv4 and IPv6. The listener is created
/// non-blocking with `SO_REUSEADDR` set (unix), so it can be registered with a
/// [`Dispatcher`](crate::Dispatcher) and drained on readiness.
pub struct TcpTransport {
    listener: mio::net::TcpListener,
    addr: SocketAddr,
}

impl TcpTransport {
    /// Port used when none is given.
    pub const DEFAULT_PORT: u16 = 8000;

    /// Bind and listen on a socket address.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = mio::net::TcpListener::bind(addr)
            .map_err(|source| TransportError::Bind { addr, source })?;
        // Port 0 binds an ephemeral port; report the one actually assigned.
        let addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%addr, "listening on tcp socket");

        Ok(Self { listener, addr })
    }

    /// Resolve `host` and bind to the first address that accepts.
    pub fn bind_host(host: &str, port: u16) -> Result<Self> {
        let mut last_err = None;
        for addr in resolve(host, port)? {
            match Self::bind(addr) {
                Ok(transport) => return Ok(transport),
                Err(err) => {
                    debug!(%addr, error = %err, "bind attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| unresolved(host, port)))
    }

    /// Accept one pending connection without blocking.
    ///
    /// Returns `Ok(None)` when the accept queue is empty. Callers driven by
    /// edge-triggered readiness must keep calling until `None`.
    pub fn accept(&self) -> Result<Option<KmpStream>> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    return Ok(Some(KmpStream::from_mio(stream, peer)));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// Connect to a listening TCP socket.
    ///
    /// The connect itself is blocking (bounded by `timeout` when given); the
    /// returned stream is switched to non-blocking mode afterwards.
    pub fn connect(addr: SocketAddr, timeout: Option<Duration>) -> Result<KmpStream> {
        let stream = match timeout {
            Some(timeout) => std::net::TcpStream::connect_timeout(&addr, timeout),
            None => std::net::TcpStream::connect(addr),
        }
        .map_err(|source| TransportError::Connect { addr, source })?;
        let stream = KmpStream::from_std(stream)?;
        debug!(%addr, "connected to tcp socket");
        Ok(stream)
    }

    /// Resolve `host` and connect to the first address that answers.
    pub fn connect_host(host: &str, port: u16, timeout: Option<Duration>) -> Result<KmpStream> {
        let mut last_err = None;
        for addr in resolve(host, port)? {
            match Self::connect(addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| unresolved(host, port)))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl Source for TcpTransport {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> std::io::Result<()> {
        self.listener.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> std::io::Result<()> {
        self.listener.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.listener.deregister(registry)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("addr", &self.addr)
            .finish()
    }
}

/// Resolve a host name or literal address into socket addresses.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|err| TransportError::Resolve {
            host: host.to_string(),
            port,
            reason: err.to_string(),
        })?
        .collect();
    if addrs.is_empty() {
        return Err(unresolved(host, port));
    }
    Ok(addrs)
}

fn unresolved(host: &str, port: u16) -> TransportError {
    TransportError::Resolve {
        host: host.to_string(),
        port,
        reason: "no addresses found".to_string(),
    }
}
