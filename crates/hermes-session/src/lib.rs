//! # Hermes Session
//!
//! Stateful-session support for the Hermes message engine.
//!
//! The [`StatefulResolver`] binds long-lived application-object instances to
//! opaque session tokens carried in message metadata. Exporting an instance
//! yields an [`EndpointReference`](hermes_core::EndpointReference) whose
//! single reference parameter is the token; a later inbound message carrying
//! that token resolves back to the same instance.
//!
//! Instance preparation (dependency injection and the post-construct hook)
//! and teardown (the pre-destroy hook) are declared explicitly through a
//! [`LifecycleDescriptor`] rather than discovered by reflection; malformed
//! declarations are rejected when the descriptor is built, never at first
//! use.

#![doc(html_root_url = "https://docs.rs/hermes-session/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod lifecycle;
mod resolver;

pub use lifecycle::{
    EndpointContext, Hook, Injector, LifecycleDescriptor, LifecycleDescriptorBuilder,
    LifecycleError,
};
pub use resolver::{IdleCallback, IdleDisposition, SessionToken, StatefulResolver};
