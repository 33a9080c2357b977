//! The terminal, user-code-invoking stage.
//!
//! The [`InvokerStage`] sits at the bottom of every server pipeline. It picks
//! the target application object (a fixed singleton, or the instance resolved
//! from the request's session token), invokes it, and derives the reply
//! envelope from the request.

use bytes::Bytes;
use hermes_core::{Envelope, ErrorClass, HermesResult};
use hermes_pipeline::{BoxFuture, BoxStage, FiberHandle, Stage, StageAction};
use hermes_session::StatefulResolver;
use std::sync::Arc;
use tracing::{debug, warn};

/// An application-supplied handler object.
///
/// Providers receive the request envelope and produce the reply payload;
/// envelope correlation (fresh `MessageID`, `RelatesTo`) is handled by the
/// engine.
pub trait Provider: Send + Sync + 'static {
    /// Handles a request and returns the reply payload.
    fn invoke<'a>(&'a self, request: &'a Envelope) -> BoxFuture<'a, HermesResult<Bytes>>;
}

enum Target<T: Send + Sync + 'static> {
    Singleton(Arc<T>),
    Stateful(Arc<StatefulResolver<T>>),
}

impl<T: Send + Sync + 'static> Clone for Target<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Singleton(instance) => Self::Singleton(Arc::clone(instance)),
            Self::Stateful(resolver) => Self::Stateful(Arc::clone(resolver)),
        }
    }
}

/// Terminal stage dispatching to an application object.
pub struct InvokerStage<T: Provider> {
    target: Target<T>,
}

impl<T: Provider> InvokerStage<T> {
    /// Creates an invoker dispatching every request to one shared instance.
    #[must_use]
    pub fn singleton(instance: Arc<T>) -> Self {
        Self {
            target: Target::Singleton(instance),
        }
    }

    /// Creates an invoker resolving the target instance per request from the
    /// session token.
    #[must_use]
    pub fn stateful(resolver: Arc<StatefulResolver<T>>) -> Self {
        Self {
            target: Target::Stateful(resolver),
        }
    }

    fn target_instance(&self, request: &Envelope) -> HermesResult<Arc<T>> {
        match &self.target {
            Target::Singleton(instance) => Ok(Arc::clone(instance)),
            Target::Stateful(resolver) => resolver.resolve(request),
        }
    }
}

impl<T: Provider> Stage for InvokerStage<T> {
    fn name(&self) -> &'static str {
        "invoker"
    }

    fn process_request<'a>(
        &'a mut self,
        _fiber: &'a FiberHandle,
        request: Envelope,
    ) -> BoxFuture<'a, HermesResult<StageAction>> {
        Box::pin(async move {
            let instance = match self.target_instance(&request) {
                Ok(instance) => instance,
                // Session-routing failures are protocol faults: they travel
                // the ordinary reply path. Defects re-signal upward.
                Err(error) if error.class() == ErrorClass::ProtocolFault => {
                    warn!(%error, "request could not be routed to an instance");
                    return Ok(StageAction::Reply(error.to_fault(request.message_id())));
                }
                Err(error) => return Err(error),
            };

            match instance.invoke(&request).await {
                Ok(payload) => {
                    debug!(bytes = payload.len(), "provider produced a reply");
                    Ok(StageAction::Reply(request.derive_reply(payload)))
                }
                Err(error) if error.class() == ErrorClass::ProtocolFault => {
                    Ok(StageAction::Reply(error.to_fault(request.message_id())))
                }
                Err(error) => Err(error),
            }
        })
    }

    fn copy(&self) -> BoxStage {
        Box::new(Self {
            target: self.target.clone(),
        })
    }
}
