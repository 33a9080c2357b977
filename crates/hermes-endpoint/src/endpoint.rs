//! The endpoint root.
//!
//! An [`Endpoint`] is the composition root for one deployed service: it
//! assembles the master stage chain once, spawns a fiber per inbound
//! envelope, and converts every terminal failure into a fault-bearing reply
//! so that transports never observe an escaped error.

use crate::config::EndpointConfig;
use crate::invoker::{InvokerStage, Provider};
use hermes_core::{BackChannel, Envelope, ErrorClass, HermesError, HermesResult};
use hermes_pipeline::{
    BindingConfig, BoxStage, FiberEngine, PipelineAssembler, StageChain, Transport,
};
use hermes_session::{EndpointContext, LifecycleDescriptor, StatefulResolver};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// One deployed service endpoint.
///
/// Construction goes through [`Endpoint::builder`]; see the crate-level
/// example. Invocation goes through [`Endpoint::process`], the single entry
/// point transports call with inbound envelopes.
pub struct Endpoint<T: Provider> {
    config: EndpointConfig,
    engine: FiberEngine,
    master: Mutex<StageChain>,
    resolver: Option<Arc<StatefulResolver<T>>>,
}

impl<T: Provider> Endpoint<T> {
    /// Creates a builder for an endpoint with the given configuration.
    #[must_use]
    pub fn builder(config: EndpointConfig) -> EndpointBuilder<T> {
        EndpointBuilder {
            config,
            transport: None,
            provider: None,
            descriptor: None,
            context: None,
            protocol_stages: Vec::new(),
        }
    }

    /// Returns the endpoint's configuration.
    #[must_use]
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Returns the instance resolver, when the endpoint hosts a stateful
    /// service.
    #[must_use]
    pub fn resolver(&self) -> Option<&Arc<StatefulResolver<T>>> {
        self.resolver.as_ref()
    }

    /// Returns the fiber engine driving this endpoint's invocations.
    #[must_use]
    pub fn engine(&self) -> &FiberEngine {
        &self.engine
    }

    /// Processes one inbound envelope and returns the reply to hand back on
    /// the transport's synchronous channel.
    ///
    /// The returned envelope is the application reply, a fault, or a
    /// no-content placeholder when the real reply went out of band to a
    /// non-anonymous destination. This method never panics outward and never
    /// returns an error: defects and cancellations surface as fault replies.
    pub async fn process(
        &self,
        mut request: Envelope,
        back_channel: Option<Arc<dyn BackChannel>>,
    ) -> Envelope {
        if let Some(channel) = back_channel {
            request.set_back_channel(channel);
        }
        let relates_to = request.message_id().map(str::to_string);

        let chain = self.master.lock().copy();
        let (tx, rx) = oneshot::channel();
        let fiber = self.engine.spawn(
            chain,
            request,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        debug!(fiber = %fiber.id(), "dispatched inbound envelope");

        match rx.await {
            Ok(Ok(reply)) => reply,
            Ok(Err(failure)) => {
                match failure.class() {
                    ErrorClass::Defect => {
                        error!(%failure, "invocation failed with a defect");
                    }
                    ErrorClass::Cancellation => {
                        debug!("invocation was cancelled before completing");
                    }
                    ErrorClass::ProtocolFault => {
                        warn!(%failure, "invocation failed");
                    }
                }
                failure.to_fault(relates_to.as_deref())
            }
            // The fiber settled without firing its callback; treat as a defect.
            Err(_) => {
                error!("invocation dropped its completion callback");
                HermesError::internal("invocation completed without an outcome")
                    .to_fault(relates_to.as_deref())
            }
        }
    }

    /// Tears the endpoint down: closes the master chain's stages and, for
    /// stateful services, disposes the resolver and every live instance.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Lifecycle`] when called twice, or when an
    /// instance's pre-destroy hook fails.
    pub fn dispose(&self) -> HermesResult<()> {
        info!(address = self.config.address(), "disposing endpoint");
        self.master.lock().close();
        if let Some(resolver) = &self.resolver {
            resolver.dispose()?;
        }
        Ok(())
    }
}

impl<T: Provider> std::fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.config.address())
            .field("stateful", &self.resolver.is_some())
            .finish()
    }
}

/// Builder for [`Endpoint`].
pub struct EndpointBuilder<T: Provider> {
    config: EndpointConfig,
    transport: Option<Arc<dyn Transport>>,
    provider: Option<Arc<T>>,
    descriptor: Option<LifecycleDescriptor<T>>,
    context: Option<EndpointContext>,
    protocol_stages: Vec<BoxStage>,
}

impl<T: Provider> EndpointBuilder<T> {
    /// Sets the transport used for out-of-band reply delivery.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Hosts a singleton service: every request is dispatched to this one
    /// shared instance.
    #[must_use]
    pub fn provider(mut self, instance: Arc<T>) -> Self {
        self.provider = Some(instance);
        self
    }

    /// Hosts a stateful service: requests are routed by session token to
    /// instances managed under the given lifecycle descriptor.
    #[must_use]
    pub fn stateful(mut self, descriptor: LifecycleDescriptor<T>) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// Sets the dependency context handed to stateful instances on prepare.
    #[must_use]
    pub fn context(mut self, context: EndpointContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Adds a protocol-stage prototype above the terminal stage; stages run
    /// in the order they were added.
    #[must_use]
    pub fn protocol_stage(mut self, stage: BoxStage) -> Self {
        self.protocol_stages.push(stage);
        self
    }

    /// Builds the endpoint, assembling its master chain.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Lifecycle`] when no transport is set, or when
    /// neither (or both) of [`provider`](Self::provider) and
    /// [`stateful`](Self::stateful) was chosen.
    pub fn build(self) -> HermesResult<Endpoint<T>> {
        let transport = self
            .transport
            .ok_or_else(|| HermesError::lifecycle("endpoint requires a transport"))?;

        let (terminal, resolver): (BoxStage, Option<Arc<StatefulResolver<T>>>) =
            match (self.provider, self.descriptor) {
                (Some(instance), None) => (Box::new(InvokerStage::singleton(instance)), None),
                (None, Some(descriptor)) => {
                    let resolver =
                        Arc::new(StatefulResolver::new(self.config.address(), descriptor));
                    resolver.start(self.context.unwrap_or_default())?;
                    (
                        Box::new(InvokerStage::stateful(Arc::clone(&resolver))),
                        Some(resolver),
                    )
                }
                (None, None) => {
                    return Err(HermesError::lifecycle(
                        "endpoint requires a provider or a stateful descriptor",
                    ))
                }
                (Some(_), Some(_)) => {
                    return Err(HermesError::lifecycle(
                        "endpoint cannot be both singleton and stateful",
                    ))
                }
            };

        let engine = FiberEngine::new();
        let assembler = Arc::new(PipelineAssembler::new(transport, engine.clone()));

        let mut binding = BindingConfig::new();
        for (action, policy) in self.config.operations() {
            binding = binding.operation(action.clone(), *policy);
        }
        for stage in self.protocol_stages {
            binding = binding.protocol_stage(stage);
        }

        let master = assembler.assemble_server(&binding, terminal);
        info!(
            address = self.config.address(),
            operations = self.config.operations().len(),
            "endpoint assembled"
        );

        Ok(Endpoint {
            config: self.config,
            engine,
            master: Mutex::new(master),
            resolver,
        })
    }
}
