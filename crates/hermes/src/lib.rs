//! # Hermes
//!
//! **Asynchronous request/reply message-processing engine**
//!
//! Hermes moves self-describing envelopes through configurable stage
//! pipelines on lightweight fibers:
//!
//! - **Envelopes** – opaque payload, ordered addressing headers, and an
//!   out-of-band metadata bag; replies are always fresh envelopes derived
//!   from their request
//! - **Stage pipelines** – an ordered chain processes each request on the
//!   way down and the reply on the way back up, in reverse order
//! - **Fibers** – one suspendable execution per invocation, hosted on the
//!   async runtime, with an exactly-once completion callback that can be
//!   transferred to link nested operations
//! - **Addressing** – anonymous replies ride the inbound connection back;
//!   concrete `ReplyTo`/`FaultTo` destinations get asynchronous delivery
//!   over a freshly assembled outbound pipeline
//! - **Sessions** – token-based routing to exported stateful instances with
//!   declarative lifecycle (injection, post-construct, pre-destroy)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bytes::Bytes;
//! use hermes::prelude::*;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl Provider for Echo {
//!     fn invoke<'a>(&'a self, request: &'a Envelope) -> BoxFuture<'a, HermesResult<Bytes>> {
//!         Box::pin(async move { Ok(request.payload().clone()) })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> HermesResult<()> {
//!     let config = EndpointConfig::builder()
//!         .address("http://example.org/echo")
//!         .operation("urn:example:echo", AnonymousPolicy::Optional)
//!         .build();
//!     let endpoint = Endpoint::builder(config)
//!         .transport(Arc::new(InMemoryTransport::new()))
//!         .provider(Arc::new(Echo))
//!         .build()?;
//!
//!     let reply = endpoint.process(Envelope::new("hi".into()), None).await;
//!     println!("{:?}", reply.payload());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Every server pipeline has the addressing correlator at the top and the
//! user-code invoker at the bottom; protocol stages sit in between, in
//! configuration order:
//!
//! ```text
//! Request → Addressing → Protocol stages… → Invoker
//!                                              ↓
//! Reply   ← Addressing ← Protocol stages… ←───┘
//! ```

#![doc(html_root_url = "https://docs.rs/hermes/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export envelope, addressing, and error types
pub use hermes_core as core;

// Re-export stage, chain, fiber, and assembler types
pub use hermes_pipeline as pipeline;

// Re-export stateful-session types
pub use hermes_session as session;

// Re-export endpoint root and transports
pub use hermes_endpoint as endpoint;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use hermes::prelude::*;
/// ```
pub mod prelude {
    pub use hermes_core::{
        AnonymousPolicy, BackChannel, Envelope, EnvelopeKind, ErrorClass, FaultBody, HermesError,
        HermesResult, Metadata, QName, ANONYMOUS_ADDRESS,
    };

    pub use hermes_pipeline::{
        BoxFuture, BoxStage, FiberEngine, FiberHandle, PipelineAssembler, Stage, StageAction,
        StageChain, Transport,
    };

    pub use hermes_session::{
        EndpointContext, LifecycleDescriptor, SessionToken, StatefulResolver,
    };

    pub use hermes_endpoint::{
        Endpoint, EndpointConfig, InMemoryTransport, InvokerStage, Provider,
    };
}
