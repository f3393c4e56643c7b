use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::{Registry, Token, Waker};

use crate::error::{Result, TransportError};

/// Cross-thread shutdown request observed by an event loop.
///
/// Triggering sets a flag and wakes the owning [`Dispatcher`](crate::Dispatcher)
/// so a blocked wait returns immediately. The loop checks
/// [`is_triggered`](Self::is_triggered) after every wait.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
    token: Token,
}

impl ShutdownSignal {
    pub(crate) fn new(registry: &Registry, token: Token) -> Result<Self> {
        let waker = Waker::new(registry, token).map_err(TransportError::Dispatcher)?;
        Ok(Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(waker),
            token,
        })
    }

    /// Request shutdown and wake the dispatcher.
    pub fn trigger(&self) -> Result<()> {
        self.flag.store(true, Ordering::SeqCst);
        self.waker.wake().map_err(TransportError::Dispatcher)
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Token the wake-up is reported on.
    pub fn token(&self) -> Token {
        self.token
    }
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("triggered", &self.is_triggered())
            .field("token", &self.token)
            .finish()
    }
}
