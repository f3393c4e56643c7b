use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr};

use mio::event::Source;
use mio::{Interest, Registry, Token};

use crate::error::{Result, TransportError};

/// A connected, non-blocking TCP stream.
///
/// Reads and writes never block: when the kernel has no data (or no buffer
/// space) they fail with `ErrorKind::WouldBlock`, which the framing engine
/// turns into a "wait for the next readiness event" status.
pub struct KmpStream {
    inner: mio::net::TcpStream,
    peer: SocketAddr,
}

impl Read for KmpStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for KmpStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Source for KmpStream {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> std::io::Result<()> {
        self.inner.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> std::io::Result<()> {
        self.inner.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> std::io::Result<()> {
        self.inner.deregister(registry)
    }
}

impl KmpStream {
    pub(crate) fn from_mio(inner: mio::net::TcpStream, peer: SocketAddr) -> Self {
        Self { inner, peer }
    }

    /// Wrap an already-connected std stream, switching it to non-blocking mode.
    pub fn from_std(stream: std::net::TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nonblocking(true)?;
        Ok(Self::from_mio(mio::net::TcpStream::from_std(stream), peer))
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of this end.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }

    /// Check `SO_ERROR` for a pending socket error.
    ///
    /// Returns `Err` when the kernel has recorded an asynchronous failure
    /// (connection reset, refused connect) that has not surfaced through
    /// `read`/`write` yet.
    pub fn check_health(&self) -> Result<()> {
        match self.inner.take_error()? {
            Some(err) => Err(TransportError::Io(err)),
            None => Ok(()),
        }
    }

    /// Disable Nagle's algorithm.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.inner.set_nodelay(nodelay).map_err(Into::into)
    }

    /// Shut down both halves of the connection.
    pub fn shutdown(&self) -> Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for KmpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmpStream")
            .field("type", &"tcp")
            .field("peer", &self.peer)
            .finish()
    }
}
