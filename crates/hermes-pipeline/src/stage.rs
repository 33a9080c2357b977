//! The stage contract.
//!
//! A [`Stage`] is one link in the processing pipeline. Stages carry immutable
//! configuration plus per-invocation mutable state; [`Stage::copy`] produces
//! an independent runtime clone sharing only the immutable part, so that
//! concurrent invocations never share in-flight state.

use crate::fiber::FiberHandle;
use hermes_core::{Envelope, HermesResult};
use std::future::Future;
use std::pin::Pin;

/// A boxed future, as returned by stage methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased stage.
pub type BoxStage = Box<dyn Stage>;

/// Outcome of a stage's request-direction processing.
#[derive(Debug)]
pub enum StageAction {
    /// Pass the (possibly transformed) request to the next stage down.
    Continue(Envelope),
    /// Short-circuit: this envelope is the reply. The terminal stage of a
    /// chain always returns this.
    Reply(Envelope),
}

/// One processing unit in the pipeline.
///
/// Stages see the request on the way down ([`process_request`](Self::process_request))
/// and the reply on the way back up ([`process_response`](Self::process_response)),
/// in strict reverse order of entry. Both methods receive the invocation's
/// fiber handle explicitly; stages never reach for ambient state.
///
/// # Invariants
///
/// - A stage must either continue or reply on the way down; the chain below
///   it runs at most once per invocation.
/// - Per-invocation mutable state must live in the stage itself so that
///   [`copy`](Self::copy) isolates concurrent invocations.
/// - [`close`](Self::close) must be idempotent.
pub trait Stage: Send + 'static {
    /// Returns the unique name of this stage, used for logging and
    /// diagnostics.
    fn name(&self) -> &'static str;

    /// Processes the request on the way down the chain.
    fn process_request<'a>(
        &'a mut self,
        fiber: &'a FiberHandle,
        request: Envelope,
    ) -> BoxFuture<'a, HermesResult<StageAction>>;

    /// Processes the reply on the way back up the chain.
    ///
    /// The default implementation passes the reply through unchanged.
    fn process_response<'a>(
        &'a mut self,
        fiber: &'a FiberHandle,
        response: Envelope,
    ) -> BoxFuture<'a, HermesResult<Envelope>> {
        let _ = fiber;
        Box::pin(std::future::ready(Ok(response)))
    }

    /// Produces an independent runtime clone of this stage.
    ///
    /// The clone shares immutable configuration with the original but starts
    /// with fresh per-invocation state.
    fn copy(&self) -> BoxStage;

    /// Releases any resources held by this stage. Idempotent.
    fn close(&mut self) {}
}

impl std::fmt::Debug for dyn Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage").field("name", &self.name()).finish()
    }
}

/// A stage built from a closure, for simple transformations and tests.
///
/// The closure decides synchronously; stages that need to await something
/// implement [`Stage`] directly.
///
/// # Example
///
/// ```
/// use hermes_pipeline::{FnStage, Stage, StageAction};
///
/// let stage = FnStage::new("echo", |request| {
///     let payload = request.payload().clone();
///     Ok(StageAction::Reply(request.derive_reply(payload)))
/// });
/// assert_eq!(stage.name(), "echo");
/// ```
pub struct FnStage<F> {
    name: &'static str,
    func: F,
}

impl<F> FnStage<F>
where
    F: FnMut(Envelope) -> HermesResult<StageAction> + Clone + Send + 'static,
{
    /// Creates a new closure-based stage.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Stage for FnStage<F>
where
    F: FnMut(Envelope) -> HermesResult<StageAction> + Clone + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process_request<'a>(
        &'a mut self,
        _fiber: &'a FiberHandle,
        request: Envelope,
    ) -> BoxFuture<'a, HermesResult<StageAction>> {
        let result = (self.func)(request);
        Box::pin(std::future::ready(result))
    }

    fn copy(&self) -> BoxStage {
        Box::new(Self {
            name: self.name,
            func: self.func.clone(),
        })
    }
}
