//! Death bookkeeping shared by the manager loop and its handles.
//!
//! `kill` is asynchronous: it records why the manager should die and wakes
//! the loop. `wait` resolves only after the loop has exited, drained its
//! queue and published the final cause.

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::WaitForCancellationFuture;

use crate::Error;
use crate::Result;
use crate::StoreError;

/// Why the manager stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Death {
    /// Cooperative stop; not an error.
    Stopped,
    Killed(String),
    Store(StoreError),
}

impl Death {
    /// The error handed to callers whose requests hit a dead manager.
    pub(crate) fn to_error(&self) -> Error {
        match self {
            Death::Stopped => Error::Stopped,
            Death::Killed(reason) => Error::Killed(reason.clone()),
            Death::Store(e) => Error::Store(e.clone()),
        }
    }

    pub(crate) fn to_result(&self) -> Result<()> {
        match self {
            Death::Stopped => Ok(()),
            _ => Err(self.to_error()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Tomb {
    dying: CancellationToken,
    cause: Mutex<Option<Death>>,
    dead: watch::Sender<bool>,
}

impl Tomb {
    pub(crate) fn new() -> Self {
        let (dead, _) = watch::channel(false);
        Self {
            dying: CancellationToken::new(),
            cause: Mutex::new(None),
            dead,
        }
    }

    /// Record `death` and ask the loop to exit. The first error wins; a clean
    /// stop recorded earlier is replaced by a later error, never the reverse.
    pub(crate) fn kill(
        &self,
        death: Death,
    ) {
        {
            let mut cause = self.cause.lock();
            match (&*cause, &death) {
                (None, _) | (Some(Death::Stopped), Death::Killed(_) | Death::Store(_)) => {
                    *cause = Some(death);
                }
                _ => {}
            }
        }
        self.dying.cancel();
    }

    pub(crate) fn dying(&self) -> WaitForCancellationFuture<'_> {
        self.dying.cancelled()
    }

    pub(crate) fn is_dying(&self) -> bool {
        self.dying.is_cancelled()
    }

    pub(crate) fn cause(&self) -> Death {
        self.cause.lock().clone().unwrap_or(Death::Stopped)
    }

    /// Called once by the loop after its final cleanup.
    pub(crate) fn mark_dead(&self) {
        self.dead.send_replace(true);
    }

    pub(crate) fn is_dead(&self) -> bool {
        *self.dead.borrow()
    }

    /// Blocks until the loop is gone, then reports its cause.
    pub(crate) async fn wait(&self) -> Death {
        let mut dead = self.dead.subscribe();
        // The sender lives in `self`, so this only ends once `dead` is true.
        let _ = dead.wait_for(|dead| *dead).await;
        self.cause()
    }
}

impl Default for Tomb {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks the tomb dead when dropped, so waiters are released even if the
/// loop unwinds before its normal cleanup.
pub(crate) struct DeathGuard(pub(crate) std::sync::Arc<Tomb>);

impl Drop for DeathGuard {
    fn drop(&mut self) {
        if !self.0.is_dead() {
            self.0.kill(Death::Killed("lease manager loop aborted".into()));
            self.0.mark_dead();
        }
    }
}
