//! The message envelope.
//!
//! An [`Envelope`] is the unit of data flowing through the pipeline: opaque
//! payload, ordered headers, and a bag of out-of-band metadata. Exactly one
//! envelope is in flight per logical request; a reply is always a *new*
//! envelope derived from the request, never the request mutated in place, so
//! stages that ran before a suspension can still inspect the original.

use crate::addressing::{Header, QName};
use crate::backchannel::BackChannel;
use crate::metadata::Metadata;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Metadata key under which the transport back-channel handle travels.
const BACK_CHANNEL_KEY: &str = "hermes.transport.back-channel";

/// A unique message identifier, using UUID v7.
///
/// UUID v7 is time-ordered, which makes message ids naturally sortable in
/// logs and correlation stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new unique message id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the id as an addressing URI (`urn:uuid:...`).
    #[must_use]
    pub fn as_uri(&self) -> String {
        format!("urn:uuid:{}", self.0)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "urn:uuid:{}", self.0)
    }
}

/// Classification of an envelope within the reply protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeKind {
    /// An ordinary request or reply carrying application content.
    #[default]
    Normal,
    /// A synthesized empty reply: the real reply travels out-of-band and the
    /// inbound transport connection may be closed immediately.
    NoContent,
    /// A fault reply; the payload is a serialized fault body.
    Fault,
}

/// The request/reply message unit.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use hermes_core::{Envelope, QName, ANONYMOUS_ADDRESS};
///
/// let mut request = Envelope::new(Bytes::from_static(b"{\"q\":1}"));
/// request.set_action("urn:example:echo");
/// request.set_reply_to(ANONYMOUS_ADDRESS);
///
/// let reply = request.derive_reply(Bytes::from_static(b"{\"a\":2}"));
/// assert_eq!(reply.relates_to(), request.message_id());
/// ```
#[derive(Debug)]
pub struct Envelope {
    kind: EnvelopeKind,
    payload: Bytes,
    headers: Vec<Header>,
    metadata: Metadata,
}

impl Envelope {
    /// Creates a new envelope with a fresh `MessageID` header.
    #[must_use]
    pub fn new(payload: Bytes) -> Self {
        let mut envelope = Self {
            kind: EnvelopeKind::Normal,
            payload,
            headers: Vec::new(),
            metadata: Metadata::new(),
        };
        envelope.add_header(QName::message_id(), MessageId::new().as_uri());
        envelope
    }

    /// Creates a synthesized empty reply correlated to `relates_to`.
    #[must_use]
    pub fn no_content(relates_to: Option<&str>) -> Self {
        let mut envelope = Self::new(Bytes::new());
        envelope.kind = EnvelopeKind::NoContent;
        if let Some(id) = relates_to {
            envelope.add_header(QName::relates_to(), id);
        }
        envelope
    }

    /// Creates a fault reply correlated to `relates_to` with the given
    /// serialized fault payload.
    #[must_use]
    pub fn fault(relates_to: Option<&str>, payload: Bytes) -> Self {
        let mut envelope = Self::new(payload);
        envelope.kind = EnvelopeKind::Fault;
        if let Some(id) = relates_to {
            envelope.add_header(QName::relates_to(), id);
        }
        envelope
    }

    /// Derives the reply envelope for this request.
    ///
    /// The reply is a new envelope: it gets a fresh `MessageID`, its
    /// `RelatesTo` is set from this request's `MessageID`, and the transport
    /// back-channel handle is carried over so the reply can still reach the
    /// inbound connection.
    #[must_use]
    pub fn derive_reply(&self, payload: Bytes) -> Self {
        let mut reply = Self::new(payload);
        if let Some(id) = self.message_id() {
            reply.add_header(QName::relates_to(), id);
        }
        if let Some(channel) = self.back_channel() {
            reply.set_back_channel(channel);
        }
        reply
    }

    /// Returns the envelope classification.
    #[must_use]
    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    /// Returns `true` for a synthesized empty reply.
    #[must_use]
    pub fn is_no_content(&self) -> bool {
        self.kind == EnvelopeKind::NoContent
    }

    /// Returns `true` for a fault reply.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.kind == EnvelopeKind::Fault
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Replaces the payload.
    pub fn set_payload(&mut self, payload: Bytes) {
        self.payload = payload;
    }

    /// Returns all headers in order.
    #[must_use]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Returns the value of the first header with the given name.
    #[must_use]
    pub fn header(&self, name: &QName) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| &h.name == name)
            .map(|h| h.value.as_str())
    }

    /// Appends a header entry; duplicates are allowed and order is kept.
    pub fn add_header(&mut self, name: QName, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    /// Replaces all headers with the given name by a single entry.
    pub fn set_header(&mut self, name: QName, value: impl Into<String>) {
        self.headers.retain(|h| h.name != name);
        self.headers.push(Header::new(name, value));
    }

    /// Returns the metadata bag.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the metadata bag mutably.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Returns the `To` destination address.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.header(&QName::to())
    }

    /// Sets the `To` destination address.
    pub fn set_to(&mut self, address: impl Into<String>) {
        self.set_header(QName::to(), address);
    }

    /// Returns the `Action` URI.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.header(&QName::action())
    }

    /// Sets the `Action` URI.
    pub fn set_action(&mut self, action: impl Into<String>) {
        self.set_header(QName::action(), action);
    }

    /// Returns the `ReplyTo` address.
    #[must_use]
    pub fn reply_to(&self) -> Option<&str> {
        self.header(&QName::reply_to())
    }

    /// Sets the `ReplyTo` address.
    pub fn set_reply_to(&mut self, address: impl Into<String>) {
        self.set_header(QName::reply_to(), address);
    }

    /// Returns the `FaultTo` address.
    #[must_use]
    pub fn fault_to(&self) -> Option<&str> {
        self.header(&QName::fault_to())
    }

    /// Sets the `FaultTo` address.
    pub fn set_fault_to(&mut self, address: impl Into<String>) {
        self.set_header(QName::fault_to(), address);
    }

    /// Returns the `MessageID`.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.header(&QName::message_id())
    }

    /// Returns the `RelatesTo` correlation id.
    #[must_use]
    pub fn relates_to(&self) -> Option<&str> {
        self.header(&QName::relates_to())
    }

    /// Returns the session token header if present.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.header(&QName::session_token())
    }

    /// Sets the session token header.
    pub fn set_session_token(&mut self, token: impl Into<String>) {
        self.set_header(QName::session_token(), token);
    }

    /// Returns the transport back-channel handle if one is attached.
    #[must_use]
    pub fn back_channel(&self) -> Option<Arc<dyn BackChannel>> {
        self.metadata
            .get::<Arc<dyn BackChannel>>(BACK_CHANNEL_KEY)
            .cloned()
    }

    /// Attaches the transport back-channel handle.
    pub fn set_back_channel(&mut self, channel: Arc<dyn BackChannel>) {
        self.metadata.insert(BACK_CHANNEL_KEY, channel);
    }

    /// Detaches and returns the transport back-channel handle.
    pub fn take_back_channel(&mut self) -> Option<Arc<dyn BackChannel>> {
        self.metadata.remove::<Arc<dyn BackChannel>>(BACK_CHANNEL_KEY)
    }
}
