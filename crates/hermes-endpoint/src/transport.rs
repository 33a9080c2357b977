//! In-memory transport.
//!
//! Connects client pipelines to in-process peers: each peer is a responder
//! function bound to an address. This transport backs tests and local
//! (in-process) delivery; network transports implement the same
//! [`Transport`] seam elsewhere.

use dashmap::DashMap;
use hermes_core::{Envelope, HermesError, HermesResult};
use hermes_pipeline::{BoxFuture, BoxStage, FiberHandle, Stage, StageAction, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

type Responder = Arc<dyn Fn(Envelope) -> HermesResult<Envelope> + Send + Sync>;

/// A transport whose destinations are in-process responder functions.
///
/// # Example
///
/// ```
/// use hermes_endpoint::InMemoryTransport;
/// use hermes_pipeline::Transport;
///
/// let transport = InMemoryTransport::new();
/// let sink = transport.bind_sink("urn:test:peer");
/// assert!(transport.connect("urn:test:peer").is_ok());
/// assert!(transport.connect("urn:test:unknown").is_err());
/// # drop(sink);
/// ```
#[derive(Default)]
pub struct InMemoryTransport {
    peers: DashMap<String, Responder>,
}

impl InMemoryTransport {
    /// Creates a transport with no peers bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a responder function to an address.
    pub fn bind<F>(&self, address: impl Into<String>, responder: F)
    where
        F: Fn(Envelope) -> HermesResult<Envelope> + Send + Sync + 'static,
    {
        self.peers.insert(address.into(), Arc::new(responder));
    }

    /// Binds a recording sink to an address.
    ///
    /// Delivered envelopes are captured in the returned buffer; the peer
    /// acknowledges each delivery with a no-content reply.
    pub fn bind_sink(&self, address: impl Into<String>) -> Arc<Mutex<Vec<Envelope>>> {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&sink);
        self.bind(address, move |envelope: Envelope| {
            let relates_to = envelope.relates_to().map(str::to_string);
            captured.lock().push(envelope);
            Ok(Envelope::no_content(relates_to.as_deref()))
        });
        sink
    }

    /// Removes the peer bound to `address`.
    pub fn unbind(&self, address: &str) {
        self.peers.remove(address);
    }
}

impl Transport for InMemoryTransport {
    fn connect(&self, destination: &str) -> HermesResult<BoxStage> {
        let responder = self
            .peers
            .get(destination)
            .map(|r| Arc::clone(&r))
            .ok_or_else(|| {
                HermesError::transport(format!("no peer bound to '{destination}'"))
            })?;
        Ok(Box::new(InMemoryStage {
            destination: destination.to_string(),
            responder,
        }))
    }
}

/// Tail stage delivering to one in-process peer.
struct InMemoryStage {
    destination: String,
    responder: Responder,
}

impl Stage for InMemoryStage {
    fn name(&self) -> &'static str {
        "in-memory-transport"
    }

    fn process_request<'a>(
        &'a mut self,
        _fiber: &'a FiberHandle,
        request: Envelope,
    ) -> BoxFuture<'a, HermesResult<StageAction>> {
        debug!(destination = %self.destination, "delivering over in-memory transport");
        let result = (self.responder)(request).map(StageAction::Reply);
        Box::pin(std::future::ready(result))
    }

    fn copy(&self) -> BoxStage {
        Box::new(Self {
            destination: self.destination.clone(),
            responder: Arc::clone(&self.responder),
        })
    }
}
