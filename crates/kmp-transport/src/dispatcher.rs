use std::io::ErrorKind;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::shutdown::ShutdownSignal;

/// Readiness reported for one registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// The peer closed its write half, or both halves are gone.
    pub closed: bool,
    pub error: bool,
}

/// Readiness multiplexer over epoll / kqueue / IOCP.
///
/// Registrations are edge-triggered: a source is reported once per
/// transition to ready, so consumers must drain it until `WouldBlock`.
pub struct Dispatcher {
    poll: Poll,
    events: Events,
}

impl Dispatcher {
    /// Default number of events collected per wait.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create a dispatcher collecting up to `capacity` events per wait.
    pub fn new(capacity: usize) -> Result<Self> {
        let poll = Poll::new().map_err(TransportError::Dispatcher)?;
        Ok(Self {
            poll,
            events: Events::with_capacity(capacity.max(1)),
        })
    }

    /// Start watching `source` for `interest`.
    pub fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .register(source, token, interest)
            .map_err(TransportError::Dispatcher)
    }

    /// Change the interest set of an already registered source.
    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .reregister(source, token, interest)
            .map_err(TransportError::Dispatcher)
    }

    /// Stop watching `source`.
    pub fn deregister<S>(&self, source: &mut S) -> Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll
            .registry()
            .deregister(source)
            .map_err(TransportError::Dispatcher)
    }

    /// Create a shutdown signal that wakes [`wait`](Self::wait) on `token`.
    pub fn shutdown_signal(&self, token: Token) -> Result<ShutdownSignal> {
        ShutdownSignal::new(self.poll.registry(), token)
    }

    /// Block until at least one source is ready or `timeout` expires.
    ///
    /// Expiry returns an empty list. A signal interrupting the wait is not an
    /// error either; the caller simply loops back.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<Readiness>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                trace!("dispatcher wait interrupted");
                return Ok(Vec::new());
            }
            Err(err) => return Err(TransportError::Dispatcher(err)),
        }

        Ok(self
            .events
            .iter()
            .map(|event| Readiness {
                token: event.token(),
                readable: event.is_readable(),
                writable: event.is_writable(),
                closed: event.is_read_closed() || event.is_write_closed(),
                error: event.is_error(),
            })
            .collect())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("capacity", &self.events.capacity())
            .finish()
    }
}
