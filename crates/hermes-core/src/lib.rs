//! # Hermes Core
//!
//! Core types for the Hermes message-processing engine.
//!
//! This crate provides the foundational types used throughout Hermes:
//!
//! - [`Envelope`] - The request/reply message unit carrying payload, headers,
//!   and out-of-band metadata through the pipeline
//! - [`QName`] / addressing header constants - Qualified header names and the
//!   well-known addressing vocabulary (`To`, `ReplyTo`, `FaultTo`, ...)
//! - [`EndpointReference`] - A serializable address plus reference parameters
//!   sufficient to route a future message back to a specific instance
//! - [`BackChannel`] - The transport's handle for one request's reply path
//! - [`HermesError`] - Standard error types and fault-reply conversion

#![doc(html_root_url = "https://docs.rs/hermes-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod addressing;
mod backchannel;
mod envelope;
mod error;
mod metadata;

pub use addressing::{
    AnonymousPolicy, EndpointReference, Header, QName, ReferenceParameter, ADDRESSING_NS,
    ANONYMOUS_ADDRESS, SESSION_NS, SESSION_TOKEN_TAG,
};
pub use backchannel::{close_back_channel, BackChannel};
pub use envelope::{Envelope, EnvelopeKind, MessageId};
pub use error::{ErrorClass, FaultBody, FaultDetail, HermesError, HermesResult};
pub use metadata::Metadata;
