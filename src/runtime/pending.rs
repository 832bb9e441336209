//! In-flight request registry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::TerminalError;
use crate::{Error, Result};

/// Maps request ids to one-shot delivery slots.
///
/// Each slot is consumed at most once: by [`resolve`](Self::resolve), by
/// [`abandon`](Self::abandon), or by the terminal transition
/// ([`mark_process_died`](Self::mark_process_died) /
/// [`close`](Self::close)). The entry is removed from the map before the slot
/// fires, so a second outcome for the same id cannot happen.
///
/// Abandoned slots are dropped without a value; the waiting receiver sees
/// [`oneshot::error::RecvError`].
#[derive(Debug)]
pub struct PendingRegistry<T> {
    state: Mutex<RegistryState<T>>,
}

#[derive(Debug)]
struct RegistryState<T> {
    pending: HashMap<String, oneshot::Sender<T>>,
    terminal: Option<TerminalError>,
    closed: bool,
}

impl<T> Default for PendingRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingRegistry<T> {
    /// Create an empty, open registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                pending: HashMap::new(),
                terminal: None,
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a slot for `id`.
    ///
    /// Fails with the terminal error if one is set, or with
    /// [`Error::ClientClosed`] if the registry was closed.
    pub fn register(&self, id: impl Into<String>, slot: oneshot::Sender<T>) -> Result<()> {
        let mut state = self.lock();
        if let Some(err) = &state.terminal {
            return Err(err.clone().into());
        }
        if state.closed {
            return Err(Error::ClientClosed);
        }
        state.pending.insert(id.into(), slot);
        Ok(())
    }

    /// Deliver `value` to the slot for `id`.
    ///
    /// Returns whether a pending request matched.
    pub fn resolve(&self, id: &str, value: T) -> bool {
        let slot = self.lock().pending.remove(id);
        match slot {
            Some(slot) => {
                // The waiter may already be gone; the id was still pending.
                let _ = slot.send(value);
                true
            }
            None => false,
        }
    }

    /// Remove the slot for `id` without delivering anything.
    pub fn abandon(&self, id: &str) {
        let slot = self.lock().pending.remove(id);
        drop(slot);
    }

    /// Record that the process died and abandon every pending slot.
    ///
    /// Later registrations fail with [`Error::ProcessDied`] carrying `cause`.
    /// Only the first terminal transition sets the error.
    pub fn mark_process_died(&self, cause: Option<String>) {
        self.fail_pending(TerminalError::ProcessDied { cause }, false);
    }

    /// Close the registry to new registrations and abandon every pending slot.
    ///
    /// Unless the process already died, the terminal error becomes
    /// [`Error::ClientClosed`].
    pub fn close(&self) {
        self.fail_pending(TerminalError::Closed, true);
    }

    fn fail_pending(&self, err: TerminalError, close: bool) {
        let pending = {
            let mut state = self.lock();
            if state.terminal.is_none() {
                state.terminal = Some(err);
            }
            if close {
                state.closed = true;
            }
            std::mem::take(&mut state.pending)
        };
        // Senders are dropped outside the lock.
        drop(pending);
    }

    /// The terminal error, if the registry has one.
    pub fn current_error(&self) -> Option<Error> {
        self.lock().terminal.clone().map(Error::from)
    }

    /// Whether the registry rejects new registrations.
    pub fn is_closed(&self) -> bool {
        let state = self.lock();
        state.closed || state.terminal.is_some()
    }

    /// Number of requests awaiting a response.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
