//! Listener registration with explicit disposal.
//!
//! DESIGN
//! ======
//! Every live feed in the app (identity session changes, document snapshots,
//! collection snapshots) hands its callback a `Gate`. Callbacks run while
//! holding the gate lock, and `Subscription::dispose` closes the gate under
//! the same lock, so once `dispose` returns no callback is running and none
//! will start. Dropping a `Subscription` disposes it.
//!
//! A listener must not dispose its own subscription from inside the callback.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

/// Callback invoked once per logical state change.
pub type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<T, F>(f: F) -> Listener<T>
where
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Open/closed flag shared between a subscription and its delivery task.
#[derive(Clone, Debug)]
pub struct Gate {
    open: Arc<Mutex<bool>>,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self { open: Arc::new(Mutex::new(true)) }
    }

    /// Run `f` if the gate is still open. Returns whether it ran.
    pub fn run(&self, f: impl FnOnce()) -> bool {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return false;
        }
        f();
        true
    }

    pub fn close(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// Disposer returned by every `subscribe`/`on_*` registration.
pub struct Subscription {
    gate: Gate,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    #[must_use]
    pub fn new(gate: Gate) -> Self {
        Self { gate, task: None }
    }

    /// Bind the delivery task so disposal also stops it.
    #[must_use]
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Stop delivery. Idempotent.
    pub fn dispose(&mut self) {
        self.gate.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.gate.is_open()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("active", &self.is_active()).finish()
    }
}

#[cfg(test)]
#[path = "subscription_test.rs"]
mod tests;
