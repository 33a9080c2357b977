//! # Hermes Endpoint
//!
//! The endpoint root of the Hermes message engine.
//!
//! An [`Endpoint`] owns the assembled pipeline, the fiber engine, the
//! binding configuration, and (for stateful services) the instance resolver
//! for one deployed service. Transports hand it inbound envelopes through
//! the single [`Endpoint::process`] entry point, which never lets an
//! internal failure escape: every failure becomes a fault-bearing reply.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use hermes_core::{AnonymousPolicy, Envelope, HermesResult};
//! use hermes_endpoint::{Endpoint, EndpointConfig, InMemoryTransport, Provider};
//! use hermes_pipeline::BoxFuture;
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
//! # async fn demo() -> HermesResult<()> {
//! let config = EndpointConfig::builder()
//!     .address("http://example.org/echo")
//!     .operation("urn:example:echo", AnonymousPolicy::Optional)
//!     .build();
//! let endpoint = Endpoint::builder(config)
//!     .transport(Arc::new(InMemoryTransport::new()))
//!     .provider(Arc::new(Echo))
//!     .build()?;
//!
//! let reply = endpoint.process(Envelope::new(Bytes::from_static(b"hi")), None).await;
//! assert_eq!(reply.payload().as_ref(), b"hi");
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-endpoint/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod endpoint;
mod invoker;
mod transport;

pub use config::{EndpointConfig, EndpointConfigBuilder};
pub use endpoint::{Endpoint, EndpointBuilder};
pub use invoker::{InvokerStage, Provider};
pub use transport::InMemoryTransport;
