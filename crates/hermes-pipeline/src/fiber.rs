//! The fiber engine.
//!
//! A fiber is one logical invocation's suspendable, resumable execution of a
//! stage chain. Many fibers run concurrently, each logically single-threaded;
//! a fiber is hosted on an async-runtime task, so it may be executed by any
//! available worker and, after a suspension, may resume on a different
//! worker. Only program order within one fiber is guaranteed.
//!
//! Every fiber carries a completion callback that fires exactly once across
//! its whole lifetime: with the final reply envelope, with a terminal
//! failure, or with a cancellation failure. A stage may *transfer* the
//! callback out of its fiber into a nested fiber, linking the nested
//! operation's outcome to the outer operation's caller.

use crate::chain::StageChain;
use dashmap::DashMap;
use hermes_core::{Envelope, HermesError, HermesResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::AbortHandle;
use tracing::{debug, error};
use uuid::Uuid;

/// A unique fiber identifier, using UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(Uuid);

impl FiberId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for FiberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The completion callback of one fiber.
pub type FiberCompletion = Box<dyn FnOnce(HermesResult<Envelope>) + Send + 'static>;

struct FiberInner {
    id: FiberId,
    callback: Mutex<Option<FiberCompletion>>,
    cancelled: AtomicBool,
    abort: Mutex<Option<AbortHandle>>,
}

/// A handle to one fiber.
///
/// Handles are cheap to clone; every stage receives the invocation's handle
/// explicitly rather than fetching it from ambient state.
#[derive(Clone)]
pub struct FiberHandle {
    inner: Arc<FiberInner>,
}

impl FiberHandle {
    fn new(callback: Option<FiberCompletion>) -> Self {
        Self {
            inner: Arc::new(FiberInner {
                id: FiberId::new(),
                callback: Mutex::new(callback),
                cancelled: AtomicBool::new(false),
                abort: Mutex::new(None),
            }),
        }
    }

    /// Creates a handle with no completion callback, for driving a chain
    /// outside the engine (typically in tests).
    #[must_use]
    pub fn detached() -> Self {
        Self::new(None)
    }

    /// Returns this fiber's id.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.inner.id
    }

    /// Returns `true` once the fiber has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Transfers the completion callback out of this fiber.
    ///
    /// After a transfer the fiber's own completion becomes a no-op; the
    /// callback's single firing is owed by whoever took it.
    #[must_use]
    pub fn take_callback(&self) -> Option<FiberCompletion> {
        self.inner.callback.lock().take()
    }

    /// Cancels the fiber.
    ///
    /// Safe to call at any point in the fiber's lifetime: if the callback has
    /// not fired yet it fires now with [`HermesError::Cancelled`]; a fiber
    /// that already reached a terminal state is unaffected.
    pub fn cancel(&self) {
        let already = self.inner.cancelled.swap(true, Ordering::SeqCst);
        if let Some(callback) = self.take_callback() {
            debug!(fiber = %self.id(), "fiber cancelled before completion");
            callback(Err(HermesError::Cancelled));
        }
        if !already {
            if let Some(abort) = self.inner.abort.lock().take() {
                abort.abort();
            }
        }
    }

    /// Completes the fiber with the given outcome.
    ///
    /// A no-op when the callback already fired or was transferred.
    pub(crate) fn complete(&self, outcome: HermesResult<Envelope>) {
        if let Some(callback) = self.take_callback() {
            debug!(fiber = %self.id(), ok = outcome.is_ok(), "fiber completed");
            callback(outcome);
        }
    }

    fn attach(&self, abort: AbortHandle) {
        *self.inner.abort.lock() = Some(abort);
    }
}

impl std::fmt::Debug for FiberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberHandle")
            .field("id", &self.inner.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[derive(Default)]
struct EngineInner {
    active: DashMap<FiberId, Instant>,
}

/// Spawns and tracks fibers.
///
/// The engine owns no worker threads of its own; fibers are hosted on the
/// surrounding tokio runtime. Must be used from within a runtime context.
///
/// # Example
///
/// ```no_run
/// use hermes_pipeline::{FiberEngine, StageChain};
/// use hermes_core::Envelope;
/// use bytes::Bytes;
///
/// # async fn demo(chain: StageChain) {
/// let engine = FiberEngine::new();
/// let fiber = engine.spawn(chain, Envelope::new(Bytes::new()), Box::new(|outcome| {
///     // fires exactly once, with the reply or a terminal failure
///     drop(outcome);
/// }));
/// # drop(fiber);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct FiberEngine {
    inner: Arc<EngineInner>,
}

impl FiberEngine {
    /// Creates a new engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of fibers that have started but not yet reached a
    /// terminal state.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    /// Spawns a fiber executing `chain` on `request`.
    ///
    /// The chain runs to completion on the runtime; `on_complete` fires
    /// exactly once with the outcome. A panicking stage is converted into an
    /// internal-error completion rather than propagating.
    pub fn spawn(
        &self,
        chain: StageChain,
        request: Envelope,
        on_complete: FiberCompletion,
    ) -> FiberHandle {
        let handle = FiberHandle::new(Some(on_complete));
        self.inner.active.insert(handle.id(), Instant::now());
        debug!(fiber = %handle.id(), stages = chain.len(), "spawning fiber");

        let runner = handle.clone();
        let join = tokio::spawn(async move {
            let mut chain = chain;
            let outcome = chain.run(&runner, request).await;
            chain.close();
            runner.complete(outcome);
        });
        handle.attach(join.abort_handle());

        let registry = Arc::clone(&self.inner);
        let watched = handle.clone();
        tokio::spawn(async move {
            match join.await {
                Ok(()) => {}
                Err(join_error) if join_error.is_panic() => {
                    error!(fiber = %watched.id(), "stage panicked during pipeline execution");
                    watched.complete(Err(HermesError::internal(
                        "stage panicked during pipeline execution",
                    )));
                }
                // Aborted by cancel(); the cancellation outcome already fired.
                Err(_) => {}
            }
            registry.active.remove(&watched.id());
        });

        handle
    }
}
