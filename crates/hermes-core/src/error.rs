//! Error types for Hermes.
//!
//! This module provides [`HermesError`], the standard error type used
//! throughout the engine, and its conversion into fault-bearing reply
//! envelopes.
//!
//! Two classes of failure exist. *Protocol faults* (addressing-policy
//! violations, session-routing errors) are reported to the sender as a fault
//! envelope flowing back through the ordinary reply path. *Defects*
//! (lifecycle/injection failures, unexpected internal errors) are logged with
//! developer detail and converted to a fault only at the outermost endpoint
//! boundary; interior stages re-signal them rather than swallowing them.

use crate::addressing::QName;
use crate::envelope::Envelope;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`HermesError`].
pub type HermesResult<T> = Result<T, HermesError>;

/// Coarse classification driving propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Reported to the sender as a protocol fault.
    ProtocolFault,
    /// Configuration or internal defect; converted at the boundary only.
    Defect,
    /// The invocation was cancelled before producing a reply.
    Cancellation,
}

/// Standard error type for Hermes.
///
/// # Example
///
/// ```
/// use hermes_core::{HermesError, ErrorClass, QName};
///
/// let error = HermesError::addressing_violation(
///     QName::reply_to(),
///     "non-anonymous ReplyTo is not allowed for this operation",
/// );
/// assert_eq!(error.class(), ErrorClass::ProtocolFault);
/// ```
#[derive(Error, Debug)]
pub enum HermesError {
    /// A reply or fault destination violated the operation's anonymous-reply
    /// policy.
    #[error("invalid addressing header {header}: {message}")]
    AddressingViolation {
        /// The offending header's qualified name.
        header: QName,
        /// Human-readable description of the violation.
        message: String,
    },

    /// The request carried an `Action` URI the endpoint cannot process.
    #[error("invalid action '{action}': {message}")]
    InvalidAction {
        /// The action URI that was invalid.
        action: String,
        /// Human-readable description.
        message: String,
    },

    /// No session token was present and no fallback instance is configured.
    #[error("a session token is required and no fallback instance is configured")]
    SessionTokenRequired,

    /// The session token was unrecognized and no fallback instance is
    /// configured.
    #[error("unrecognized session token '{token}'")]
    SessionTokenInvalid {
        /// The unrecognized token value.
        token: String,
    },

    /// Injection or lifecycle-hook failure, or a malformed lifecycle
    /// declaration.
    #[error("lifecycle failure: {message}")]
    Lifecycle {
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A delivery or connection failure at the transport seam.
    #[error("transport failure: {message}")]
    Transport {
        /// Human-readable description.
        message: String,
    },

    /// An unexpected internal failure during pipeline execution.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The continuation was cancelled before a reply was produced.
    #[error("the invocation was cancelled before a reply was produced")]
    Cancelled,
}

impl HermesError {
    /// Creates an addressing-policy violation tagged with the offending
    /// header.
    #[must_use]
    pub fn addressing_violation(header: QName, message: impl Into<String>) -> Self {
        Self::AddressingViolation {
            header,
            message: message.into(),
        }
    }

    /// Creates an invalid-action error carrying the offending action URI.
    #[must_use]
    pub fn invalid_action(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAction {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Creates a session-token-invalid error.
    #[must_use]
    pub fn session_token_invalid(token: impl Into<String>) -> Self {
        Self::SessionTokenInvalid {
            token: token.into(),
        }
    }

    /// Creates a lifecycle error.
    #[must_use]
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a lifecycle error with a source error.
    pub fn lifecycle_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Lifecycle {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the propagation class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::AddressingViolation { .. }
            | Self::InvalidAction { .. }
            | Self::SessionTokenRequired
            | Self::SessionTokenInvalid { .. }
            | Self::Transport { .. } => ErrorClass::ProtocolFault,
            Self::Lifecycle { .. } | Self::Internal { .. } => ErrorClass::Defect,
            Self::Cancelled => ErrorClass::Cancellation,
        }
    }

    /// Returns a machine-readable fault code.
    #[must_use]
    pub const fn fault_code(&self) -> &'static str {
        match self {
            Self::AddressingViolation { .. } => "InvalidAddressingHeader",
            Self::InvalidAction { .. } => "ActionNotSupported",
            Self::SessionTokenRequired => "SessionTokenRequired",
            Self::SessionTokenInvalid { .. } => "SessionTokenInvalid",
            Self::Lifecycle { .. } => "LifecycleFailure",
            Self::Transport { .. } => "DeliveryFailure",
            Self::Internal { .. } => "InternalFailure",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Returns the marshaled fault detail, if this error carries one.
    #[must_use]
    pub fn fault_detail(&self) -> Option<FaultDetail> {
        match self {
            Self::AddressingViolation { header, .. } => {
                Some(FaultDetail::ProblemHeader(header.clone()))
            }
            Self::InvalidAction { action, .. } => {
                Some(FaultDetail::ProblemAction(action.clone()))
            }
            _ => None,
        }
    }

    /// Converts this error into a fault reply envelope correlated to
    /// `relates_to` (the failed request's `MessageID`).
    #[must_use]
    pub fn to_fault(&self, relates_to: Option<&str>) -> Envelope {
        let body = FaultBody {
            code: self.fault_code().to_string(),
            reason: self.to_string(),
            detail: self.fault_detail(),
        };
        let payload = serde_json::to_vec(&body).unwrap_or_default();
        Envelope::fault(relates_to, Bytes::from(payload))
    }
}

/// The serialized body of a fault reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultBody {
    /// Machine-readable fault code.
    pub code: String,
    /// Human-readable reason.
    pub reason: String,
    /// Optional marshaled detail element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<FaultDetail>,
}

impl FaultBody {
    /// Parses a fault body from a fault envelope's payload.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        if !envelope.is_fault() {
            return None;
        }
        serde_json::from_slice(envelope.payload()).ok()
    }
}

/// The fault-detail element shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultDetail {
    /// The action URI that was invalid.
    ProblemAction(String),
    /// The offending header's qualified name.
    ProblemHeader(QName),
}
