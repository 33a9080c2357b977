//! The assembled stage chain.
//!
//! A [`StageChain`] owns an ordered list of stages. It is built once per
//! endpoint or client and cloned per concurrent invocation; execution walks
//! the stages in order on the way down, and in reverse order of entry on the
//! way back up.

use crate::fiber::FiberHandle;
use crate::stage::{BoxStage, StageAction};
use hermes_core::{Envelope, HermesError, HermesResult};
use tracing::debug;

/// An ordered chain of stages.
#[derive(Debug)]
pub struct StageChain {
    stages: Vec<BoxStage>,
    closed: bool,
}

impl StageChain {
    /// Creates a chain from stages in top-to-bottom order.
    ///
    /// The last stage is the terminal one and must reply.
    #[must_use]
    pub fn new(stages: Vec<BoxStage>) -> Self {
        Self {
            stages,
            closed: false,
        }
    }

    /// Returns the stage names in top-to-bottom order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Produces an independent runtime clone of the whole chain.
    ///
    /// Each stage is copied in order, so the copy of stage *i* sits directly
    /// above the copy of its original downstream neighbor.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            stages: self.stages.iter().map(|s| s.copy()).collect(),
            closed: false,
        }
    }

    /// Runs one invocation through the chain.
    ///
    /// The request flows down until a stage replies; the reply then flows
    /// back up through the stages that were entered, in reverse order.
    pub async fn run(
        &mut self,
        fiber: &FiberHandle,
        request: Envelope,
    ) -> HermesResult<Envelope> {
        let mut current = request;
        let mut reply = None;
        // Index of the stage that produced the reply; stages above it see
        // the response path.
        let mut replied_at = self.stages.len();

        for (index, stage) in self.stages.iter_mut().enumerate() {
            debug!(stage = stage.name(), fiber = %fiber.id(), "processing request");
            match stage.process_request(fiber, current).await? {
                StageAction::Continue(envelope) => current = envelope,
                StageAction::Reply(envelope) => {
                    reply = Some(envelope);
                    replied_at = index;
                    break;
                }
            }
        }

        let Some(mut response) = reply else {
            return Err(HermesError::internal(
                "pipeline ran off the end without a terminal reply",
            ));
        };

        for stage in self.stages[..replied_at].iter_mut().rev() {
            debug!(stage = stage.name(), fiber = %fiber.id(), "processing response");
            response = stage.process_response(fiber, response).await?;
        }

        Ok(response)
    }

    /// Closes every stage. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for stage in &mut self.stages {
            stage.close();
        }
    }
}

impl Drop for StageChain {
    fn drop(&mut self) {
        self.close();
    }
}
