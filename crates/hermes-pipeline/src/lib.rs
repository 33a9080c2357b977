//! # Hermes Pipeline
//!
//! The processing pipeline of the Hermes message engine.
//!
//! An inbound envelope flows *down* an ordered chain of [`Stage`]s to a
//! terminal stage that produces the reply, then the reply flows back *up*
//! through the stages that were entered, in reverse order. The chain is
//! assembled once per endpoint or client by the [`PipelineAssembler`] and
//! cloned via [`Stage::copy`] for every concurrent invocation, so
//! per-invocation mutable state is never shared.
//!
//! Each invocation executes on a [fiber](FiberEngine): a suspendable logical
//! execution hosted on the async runtime. A stage suspends by awaiting an
//! externally-completed channel; no worker thread blocks, and the fiber may
//! resume on a different worker. Every fiber carries a completion callback
//! fired exactly once, and a fiber may transfer that callback to a nested
//! fiber so the nested operation's outcome becomes the outer operation's
//! outcome.
//!
//! The [`AddressingStage`] validates reply destinations against each
//! operation's anonymous-reply policy and decides whether a reply rides the
//! inbound back-channel or is delivered asynchronously over a freshly
//! assembled outbound pipeline.

#![doc(html_root_url = "https://docs.rs/hermes-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod assembler;
mod chain;
mod correlator;
mod fiber;
mod stage;

pub use assembler::{BindingConfig, PipelineAssembler, Transport};
pub use chain::StageChain;
pub use correlator::{validate_addressing, AddressingStage};
pub use fiber::{FiberCompletion, FiberEngine, FiberHandle, FiberId};
pub use stage::{BoxFuture, BoxStage, FnStage, Stage, StageAction};
