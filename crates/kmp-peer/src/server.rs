use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use kmp_frame::ErrorKind;
use kmp_transport::{
    Dispatcher, Interest, KmpStream, Readiness, ShutdownSignal, TcpTransport, Token,
    TransportError,
};
use tracing::{debug, error, info, trace, warn};

use crate::connection::{Connection, Disposition};
use crate::error::{PeerError, Result};
use crate::responder::{Echo, Responder};

const LISTENER: Token = Token(0);
const WAKE: Token = Token(usize::MAX);

/// Server event loop tuning.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Upper bound on one dispatcher wait. Expiry is not an error.
    pub wait_timeout: Duration,
    /// Readiness events collected per wait.
    pub event_capacity: usize,
    /// Connections beyond this are accepted and immediately dropped.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(10),
            event_capacity: Dispatcher::DEFAULT_CAPACITY,
            max_connections: 1024,
        }
    }
}

/// Counters reported when [`Server::run`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    pub rejected: u64,
    pub closed: u64,
    /// Request/reply cycles completed by connections that have closed.
    pub served: u64,
}

/// Single-threaded multiplexing server.
///
/// One dispatcher watches the listener and every accepted connection. Each
/// connection runs its own [`Connection`] state machine, so a slow or
/// misbehaving peer never holds up the others.
pub struct Server<R = Echo> {
    transport: TcpTransport,
    dispatcher: Dispatcher,
    shutdown: ShutdownSignal,
    responder: R,
    config: ServerConfig,
    connections: HashMap<Token, Connection<KmpStream>>,
    next_token: usize,
    stats: ServerStats,
}

impl Server<Echo> {
    /// Bind an echo server on `host:port`.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        Self::bind_with_config(host, port, ServerConfig::default())
    }

    /// Bind an echo server with explicit configuration.
    pub fn bind_with_config(host: &str, port: u16, config: ServerConfig) -> Result<Self> {
        let transport = TcpTransport::bind_host(host, port)?;
        Self::from_transport(transport, config)
    }

    /// Serve on an already bound listener.
    pub fn from_transport(mut transport: TcpTransport, config: ServerConfig) -> Result<Self> {
        let dispatcher = Dispatcher::new(config.event_capacity)?;
        dispatcher.register(&mut transport, LISTENER, Interest::READABLE)?;
        let shutdown = dispatcher.shutdown_signal(WAKE)?;

        info!(
            addr = %transport.local_addr(),
            transport = transport.transport_name(),
            "server listening"
        );

        Ok(Self {
            transport,
            dispatcher,
            shutdown,
            responder: Echo,
            config,
            connections: HashMap::new(),
            next_token: LISTENER.0 + 1,
            stats: ServerStats::default(),
        })
    }
}

impl<R: Responder> Server<R> {
    /// Replace the application layer.
    pub fn with_responder<T: Responder>(self, responder: T) -> Server<T> {
        Server {
            transport: self.transport,
            dispatcher: self.dispatcher,
            shutdown: self.shutdown,
            responder,
            config: self.config,
            connections: self.connections,
            next_token: self.next_token,
            stats: self.stats,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Handle that stops [`run`](Self::run) from any thread.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Serve until the shutdown signal is triggered.
    ///
    /// Per-connection failures close that connection only. Only a failing
    /// dispatcher ends the loop with an error.
    pub fn run(&mut self) -> Result<ServerStats> {
        while !self.shutdown.is_triggered() {
            let events = self.dispatcher.wait(Some(self.config.wait_timeout))?;
            if events.is_empty() {
                debug!(
                    timeout = ?self.config.wait_timeout,
                    connections = self.connections.len(),
                    "wait expired with no events"
                );
                continue;
            }

            for readiness in events {
                match readiness.token {
                    LISTENER => self.accept_pending(),
                    WAKE => trace!("dispatcher woken"),
                    token => self.service(token, readiness),
                }
            }
        }

        self.close_all();
        info!(
            accepted = self.stats.accepted,
            served = self.stats.served,
            "server stopped, goodbye"
        );
        Ok(self.stats)
    }

    fn accept_pending(&mut self) {
        loop {
            let mut stream = match self.transport.accept() {
                Ok(Some(stream)) => stream,
                Ok(None) => return,
                Err(TransportError::Accept(err)) if is_per_connection(&err) => {
                    debug!(reason = %err, "pending connection failed before accept");
                    self.stats.rejected += 1;
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    return;
                }
            };
            let peer = stream.peer_addr();

            if self.connections.len() >= self.config.max_connections {
                warn!(
                    %peer,
                    limit = self.config.max_connections,
                    "connection limit reached, dropping connection"
                );
                self.stats.rejected += 1;
                continue;
            }
            if let Err(err) = stream.check_health() {
                warn!(%peer, reason = %err, "socket unhealthy after accept");
                self.stats.rejected += 1;
                continue;
            }

            if let Err(err) = stream.set_nodelay(true) {
                debug!(%peer, reason = %err, "failed to disable nagle");
            }

            let token = self.allocate_token();
            if let Err(err) = self
                .dispatcher
                .register(&mut stream, token, Interest::READABLE)
            {
                warn!(%peer, reason = %err, "failed to register connection");
                self.stats.rejected += 1;
                continue;
            }

            let id = token.0 as u64;
            info!(conn = id, %peer, "connection established");
            self.connections.insert(token, Connection::new(id, stream));
            self.stats.accepted += 1;
        }
    }

    fn allocate_token(&mut self) -> Token {
        loop {
            let token = Token(self.next_token);
            self.next_token = self.next_token.wrapping_add(1);
            if token != LISTENER && token != WAKE && !self.connections.contains_key(&token) {
                return token;
            }
        }
    }

    fn service(&mut self, token: Token, readiness: Readiness) {
        let Some(conn) = self.connections.get_mut(&token) else {
            trace!(token = token.0, "event for released connection");
            return;
        };

        if readiness.error {
            if let Err(err) = conn.stream().check_health() {
                warn!(conn = conn.id(), reason = %err, "socket error reported");
                self.close(token);
                return;
            }
        }

        let before = conn.interest();
        match conn.on_ready(&mut self.responder) {
            Ok(Disposition::Pending) => {
                let after = conn.interest();
                if after == before {
                    return;
                }
                trace!(conn = conn.id(), interest = ?after, "interest changed");
                if let Err(err) = self.dispatcher.reregister(conn.stream_mut(), token, after) {
                    warn!(conn = conn.id(), reason = %err, "failed to update interest");
                    self.close(token);
                }
            }
            Ok(Disposition::PeerClosed) => {
                info!(conn = conn.id(), served = conn.served(), "peer closed connection");
                self.close(token);
            }
            Err(err) => {
                log_teardown(conn.id(), &err);
                self.close(token);
            }
        }
    }

    fn close(&mut self, token: Token) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        if let Err(err) = self.dispatcher.deregister(conn.stream_mut()) {
            debug!(conn = conn.id(), reason = %err, "deregister failed");
        }
        if let Err(err) = conn.stream().shutdown() {
            debug!(conn = conn.id(), reason = %err, "socket shutdown failed");
        }
        self.stats.closed += 1;
        self.stats.served += conn.served();
        debug!(conn = conn.id(), "connection released");
    }

    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        if !tokens.is_empty() {
            info!(count = tokens.len(), "closing open connections");
        }
        for token in tokens {
            self.close(token);
        }
    }
}

impl<R> std::fmt::Debug for Server<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.transport.local_addr())
            .field("connections", &self.connections.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Accept failures that concern only the connection being accepted; the
/// rest of the queue can still be drained.
fn is_per_connection(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
            | io::ErrorKind::PermissionDenied
    )
}

fn log_teardown(conn: u64, err: &PeerError) {
    match err {
        PeerError::Frame(frame) => match frame.kind() {
            ErrorKind::InvalidState => {
                error!(conn, reason = %frame, "framing state corrupted, closing connection")
            }
            ErrorKind::ProtocolViolation => {
                warn!(conn, reason = %frame, "protocol violation, closing connection")
            }
            ErrorKind::IoFailure | ErrorKind::Encode => {
                warn!(conn, reason = %frame, "connection failed")
            }
        },
        other => warn!(conn, reason = %other, "connection failed"),
    }
}
