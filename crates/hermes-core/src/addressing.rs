//! Addressing vocabulary and endpoint references.
//!
//! This module defines the qualified-name type used for message headers, the
//! well-known addressing header names, the anonymous address, and the
//! [`EndpointReference`] value produced by the session resolver and consumed
//! on later inbound messages.

use serde::{Deserialize, Serialize};

/// Namespace for the addressing headers (`To`, `ReplyTo`, `FaultTo`, ...).
pub const ADDRESSING_NS: &str = "http://www.w3.org/2005/08/addressing";

/// The well-known anonymous address.
///
/// A reply destination equal to this URI means "reply on the same channel the
/// request arrived on".
pub const ANONYMOUS_ADDRESS: &str = "http://www.w3.org/2005/08/addressing/anonymous";

/// Namespace for Hermes session headers and reference parameters.
pub const SESSION_NS: &str = "urn:hermes:session";

/// Local name of the single well-known reference parameter carrying the
/// session token.
pub const SESSION_TOKEN_TAG: &str = "InstanceToken";

/// A qualified header name: a namespace URI plus a local name.
///
/// # Example
///
/// ```
/// use hermes_core::QName;
///
/// let name = QName::addressing("ReplyTo");
/// assert_eq!(name.local(), "ReplyTo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    /// Namespace URI.
    namespace: String,
    /// Local name within the namespace.
    local: String,
}

impl QName {
    /// Creates a qualified name from a namespace URI and a local name.
    #[must_use]
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Creates a qualified name in the addressing namespace.
    #[must_use]
    pub fn addressing(local: impl Into<String>) -> Self {
        Self::new(ADDRESSING_NS, local)
    }

    /// The `To` header name.
    #[must_use]
    pub fn to() -> Self {
        Self::addressing("To")
    }

    /// The `Action` header name.
    #[must_use]
    pub fn action() -> Self {
        Self::addressing("Action")
    }

    /// The `ReplyTo` header name.
    #[must_use]
    pub fn reply_to() -> Self {
        Self::addressing("ReplyTo")
    }

    /// The `FaultTo` header name.
    #[must_use]
    pub fn fault_to() -> Self {
        Self::addressing("FaultTo")
    }

    /// The `MessageID` header name.
    #[must_use]
    pub fn message_id() -> Self {
        Self::addressing("MessageID")
    }

    /// The `RelatesTo` header name.
    #[must_use]
    pub fn relates_to() -> Self {
        Self::addressing("RelatesTo")
    }

    /// The well-known session-token header name.
    #[must_use]
    pub fn session_token() -> Self {
        Self::new(SESSION_NS, SESSION_TOKEN_TAG)
    }

    /// Returns the namespace URI.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the local name.
    #[must_use]
    pub fn local(&self) -> &str {
        &self.local
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local)
    }
}

/// One named header entry of an [`Envelope`](crate::Envelope).
///
/// Header names are not required to be unique within a message; order is
/// preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Qualified header name.
    pub name: QName,
    /// Header value.
    pub value: String,
}

impl Header {
    /// Creates a header entry.
    #[must_use]
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Per-operation policy for the anonymous reply address.
///
/// Attached to each operation by the service's interface description and
/// evaluated once per invocation before any application-code dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymousPolicy {
    /// No check is performed.
    Optional,
    /// `ReplyTo`/`FaultTo`, when present, must be the anonymous address.
    Required,
    /// `ReplyTo`/`FaultTo`, when present, must not be the anonymous address.
    Prohibited,
}

/// One opaque reference parameter of an [`EndpointReference`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceParameter {
    /// Qualified parameter name.
    pub name: QName,
    /// Opaque parameter value.
    pub value: String,
}

/// A serializable endpoint address plus opaque reference parameters.
///
/// References produced by the session resolver carry exactly one parameter:
/// the session token under the well-known [`SESSION_TOKEN_TAG`]. The
/// reference must round-trip: a later inbound message carrying that token
/// resolves back to the same instance.
///
/// # Example
///
/// ```
/// use hermes_core::EndpointReference;
///
/// let epr = EndpointReference::for_session("http://example.org/svc", "tok-1");
/// assert_eq!(epr.session_token(), Some("tok-1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointReference {
    /// The base address of the endpoint.
    address: String,
    /// Opaque reference parameters.
    reference_parameters: Vec<ReferenceParameter>,
}

impl EndpointReference {
    /// Creates a reference with no parameters.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reference_parameters: Vec::new(),
        }
    }

    /// Creates a reference carrying a session token as its single
    /// reference parameter.
    #[must_use]
    pub fn for_session(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reference_parameters: vec![ReferenceParameter {
                name: QName::session_token(),
                value: token.into(),
            }],
        }
    }

    /// Returns the base address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the reference parameters.
    #[must_use]
    pub fn reference_parameters(&self) -> &[ReferenceParameter] {
        &self.reference_parameters
    }

    /// Returns the session token if this reference carries one.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        let name = QName::session_token();
        self.reference_parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}
