//! Pipeline assembly.
//!
//! The [`PipelineAssembler`] builds the ordered stage chain for a binding
//! configuration. Assembly runs once per endpoint or client; every invocation
//! reuses the assembled chain through [`StageChain::copy`].
//!
//! Server and client assembly are distinct entry points: server assembly
//! receives the terminal, user-code-invoking stage already constructed and
//! only prepends protocol stages; client assembly puts a transport stage at
//! the tail, talking to the network or an in-process peer.

use crate::chain::StageChain;
use crate::correlator::AddressingStage;
use crate::fiber::FiberEngine;
use crate::stage::BoxStage;
use hermes_core::{AnonymousPolicy, HermesResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Produces the tail stage of a client pipeline for a destination address.
///
/// This is the seam where concrete transports (network, in-process) attach;
/// the engine itself never talks to a connection directly.
pub trait Transport: Send + Sync + 'static {
    /// Connects to `destination` and returns the transport stage.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Transport`](hermes_core::HermesError::Transport)
    /// when the destination is unreachable.
    fn connect(&self, destination: &str) -> HermesResult<BoxStage>;
}

/// Binding configuration consumed by server assembly.
///
/// Carries the operation table (action URI to anonymous-reply policy) and the
/// protocol-stage prototypes to install above the terminal stage, in strict
/// configuration order.
#[derive(Default)]
pub struct BindingConfig {
    operations: HashMap<String, AnonymousPolicy>,
    protocol_stages: Vec<BoxStage>,
}

impl BindingConfig {
    /// Creates an empty binding configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an operation's anonymous-reply policy, keyed by action URI.
    #[must_use]
    pub fn operation(mut self, action: impl Into<String>, policy: AnonymousPolicy) -> Self {
        self.operations.insert(action.into(), policy);
        self
    }

    /// Adds a protocol-stage prototype; prototypes are installed in the
    /// order they were added, copied per assembled chain.
    #[must_use]
    pub fn protocol_stage(mut self, stage: BoxStage) -> Self {
        self.protocol_stages.push(stage);
        self
    }

    /// Returns the policy bound to `action`, if any.
    #[must_use]
    pub fn anonymous_policy(&self, action: &str) -> Option<AnonymousPolicy> {
        self.operations.get(action).copied()
    }

    pub(crate) fn operations(&self) -> &HashMap<String, AnonymousPolicy> {
        &self.operations
    }
}

/// Builds stage chains for bindings.
pub struct PipelineAssembler {
    transport: Arc<dyn Transport>,
    engine: FiberEngine,
}

impl PipelineAssembler {
    /// Creates an assembler over the given transport and fiber engine.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, engine: FiberEngine) -> Self {
        Self { transport, engine }
    }

    /// Returns the fiber engine this assembler wires into its stages.
    #[must_use]
    pub fn engine(&self) -> &FiberEngine {
        &self.engine
    }

    /// Assembles the server-side chain for a binding.
    ///
    /// The chain is, top to bottom: the addressing correlator, the binding's
    /// protocol stages in configuration order, then the supplied terminal
    /// stage.
    #[must_use]
    pub fn assemble_server(self: &Arc<Self>, binding: &BindingConfig, terminal: BoxStage) -> StageChain {
        let mut stages: Vec<BoxStage> = Vec::with_capacity(binding.protocol_stages.len() + 2);
        stages.push(Box::new(AddressingStage::new(
            Arc::new(binding.operations().clone()),
            self.engine.clone(),
            Arc::clone(self),
        )));
        for prototype in &binding.protocol_stages {
            stages.push(prototype.copy());
        }
        stages.push(terminal);

        let chain = StageChain::new(stages);
        debug!(stages = ?chain.stage_names(), "assembled server pipeline");
        chain
    }

    /// Assembles a client chain addressed to `destination`.
    ///
    /// The transport stage sits at the tail; an optional user-handler stage
    /// sits above it.
    pub fn assemble_client(
        &self,
        destination: &str,
        user_stage: Option<BoxStage>,
    ) -> HermesResult<StageChain> {
        let tail = self.transport.connect(destination)?;
        let mut stages: Vec<BoxStage> = Vec::with_capacity(2);
        if let Some(stage) = user_stage {
            stages.push(stage);
        }
        stages.push(tail);

        let chain = StageChain::new(stages);
        debug!(destination, stages = ?chain.stage_names(), "assembled client pipeline");
        Ok(chain)
    }
}
