//! Lazy, once-only initialization of an expensive shared dependency.
//!
//! A loaded model (or any other slow-to-construct resource) must be
//! initialized exactly once process-wide and shared safely across
//! concurrent stage invocations. [`SharedResourceHandle`] makes the
//! lifecycle explicit instead of hiding it in a lazy global: a state
//! machine `{Uninitialized, Initializing, Ready, Failed}` with
//! notification-based waiting.
//!
//! Exactly one initialization attempt executes even under concurrent first
//! use; callers arriving while initialization is in flight wait and then
//! share the same instance (or the same failure). `Failed` is sticky for
//! the process lifetime (an unrecoverable dependency fails fast) unless
//! [`reset`](SharedResourceHandle::reset) is invoked explicitly.

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

/// Error produced when constructing the shared resource fails.
///
/// Cloneable so that every waiter blocked on the same initialization
/// attempt observes the same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The factory returned an error; sticky until the handle is reset
    #[error("resource initialization failed: {0}")]
    InitializationFailed(String),
}

/// Lifecycle state of the shared resource, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// No initialization attempt has started
    Uninitialized,
    /// One caller is running the factory; others are waiting
    Initializing,
    /// The resource is constructed and shared
    Ready,
    /// Construction failed; sticky until reset
    Failed,
}

/// Async factory invoked at most once to construct the resource.
pub type ResourceFactory<T> =
    Box<dyn Fn() -> BoxFuture<'static, Result<T, ResourceError>> + Send + Sync>;

/// Box an async closure into a [`ResourceFactory`].
pub fn boxed_factory<T, F, Fut>(factory: F) -> ResourceFactory<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<T, ResourceError>> + Send + 'static,
{
    Box::new(move || Box::pin(factory()))
}

enum Slot<T> {
    Uninitialized,
    Initializing,
    Ready(Arc<T>),
    Failed(ResourceError),
}

/// Holds at most one instance of the expensive resource.
///
/// The state lock is held only for state transitions, never across the
/// factory's await; waiters park on a [`Notify`] instead of contending on
/// the lock.
pub struct SharedResourceHandle<T> {
    factory: ResourceFactory<T>,
    slot: Mutex<Slot<T>>,
    notify: Notify,
}

impl<T: Send + Sync + 'static> SharedResourceHandle<T> {
    /// Create a handle around a factory. The factory is not invoked until
    /// the first [`acquire`](Self::acquire).
    pub fn new(factory: ResourceFactory<T>) -> Self {
        Self {
            factory,
            slot: Mutex::new(Slot::Uninitialized),
            notify: Notify::new(),
        }
    }

    /// Obtain the shared resource, initializing it on first use.
    ///
    /// The first caller transitions to `Initializing` and runs the
    /// factory; everyone arriving meanwhile waits for the outcome. On
    /// success all callers receive clones of the same `Arc`; on failure
    /// all callers receive the same error, and so does every future caller
    /// until [`reset`](Self::reset).
    pub async fn acquire(&self) -> Result<Arc<T>, ResourceError> {
        loop {
            // The waiter must be registered before the state is observed,
            // otherwise a notify_waiters between the check and the await
            // is lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let run_factory = {
                let mut slot = self.slot.lock();
                match &mut *slot {
                    Slot::Ready(resource) => return Ok(Arc::clone(resource)),
                    Slot::Failed(err) => return Err(err.clone()),
                    Slot::Initializing => false,
                    state @ Slot::Uninitialized => {
                        *state = Slot::Initializing;
                        true
                    }
                }
            };

            if run_factory {
                tracing::info!("initializing shared resource");
                let outcome = (self.factory)().await;
                let result = {
                    let mut slot = self.slot.lock();
                    match outcome {
                        Ok(resource) => {
                            let resource = Arc::new(resource);
                            *slot = Slot::Ready(Arc::clone(&resource));
                            Ok(resource)
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "shared resource initialization failed");
                            *slot = Slot::Failed(err.clone());
                            Err(err)
                        }
                    }
                };
                self.notify.notify_waiters();
                return result;
            }

            notified.await;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ResourceState {
        match &*self.slot.lock() {
            Slot::Uninitialized => ResourceState::Uninitialized,
            Slot::Initializing => ResourceState::Initializing,
            Slot::Ready(_) => ResourceState::Ready,
            Slot::Failed(_) => ResourceState::Failed,
        }
    }

    /// Return the handle to `Uninitialized` so the next acquire retries
    /// the factory. Intended for tests and explicit operator action; a
    /// reset while initialization is in flight is refused.
    pub fn reset(&self) -> bool {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Initializing) {
            return false;
        }
        *slot = Slot::Uninitialized;
        true
    }
}
