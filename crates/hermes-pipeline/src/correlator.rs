//! Addressing correlation.
//!
//! The [`AddressingStage`] sits at the top of every server pipeline. On the
//! way down it validates the request's reply destinations against the matched
//! operation's anonymous-reply policy, before any application-code dispatch.
//! On the way back up it decides how the reply travels: the anonymous address
//! means "back over the inbound back-channel"; a concrete destination means
//! asynchronous delivery over a freshly assembled outbound pipeline, with the
//! fiber's completion callback transferred so the delivery outcome completes
//! the original caller.

use crate::assembler::PipelineAssembler;
use crate::fiber::{FiberEngine, FiberHandle};
use crate::stage::{BoxFuture, BoxStage, Stage, StageAction};
use hermes_core::{
    close_back_channel, AnonymousPolicy, BackChannel, Envelope, HermesError, HermesResult, QName,
    ANONYMOUS_ADDRESS,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Validates a request's reply destinations against an operation policy.
///
/// The check runs once per invocation, before dispatch. Failures are tagged
/// with whichever of `ReplyTo`/`FaultTo` is offending.
pub fn validate_addressing(request: &Envelope, policy: AnonymousPolicy) -> HermesResult<()> {
    check_destination(QName::reply_to(), request.reply_to(), policy)?;
    check_destination(QName::fault_to(), request.fault_to(), policy)
}

fn check_destination(
    header: QName,
    address: Option<&str>,
    policy: AnonymousPolicy,
) -> HermesResult<()> {
    let Some(address) = address else {
        // An absent destination defaults to anonymous behavior and never
        // violates either policy.
        return Ok(());
    };
    match policy {
        AnonymousPolicy::Optional => Ok(()),
        AnonymousPolicy::Required if address != ANONYMOUS_ADDRESS => {
            Err(HermesError::addressing_violation(
                header,
                "this operation requires the anonymous reply address",
            ))
        }
        AnonymousPolicy::Prohibited if address == ANONYMOUS_ADDRESS => {
            Err(HermesError::addressing_violation(
                header,
                "this operation prohibits the anonymous reply address",
            ))
        }
        AnonymousPolicy::Required | AnonymousPolicy::Prohibited => Ok(()),
    }
}

/// The addressing correlator stage.
///
/// Immutable configuration (the operation table, the engine, the assembler)
/// is shared across copies; the destinations and back-channel captured from
/// the request on the way down are per-invocation state and start fresh in
/// every copy.
pub struct AddressingStage {
    policies: Arc<HashMap<String, AnonymousPolicy>>,
    engine: FiberEngine,
    assembler: Arc<PipelineAssembler>,
    // Per-invocation state, captured on the way down.
    reply_to: Option<String>,
    fault_to: Option<String>,
    back_channel: Option<Arc<dyn BackChannel>>,
}

impl AddressingStage {
    /// Creates the correlator stage for an operation table.
    #[must_use]
    pub fn new(
        policies: Arc<HashMap<String, AnonymousPolicy>>,
        engine: FiberEngine,
        assembler: Arc<PipelineAssembler>,
    ) -> Self {
        Self {
            policies,
            engine,
            assembler,
            reply_to: None,
            fault_to: None,
            back_channel: None,
        }
    }

    /// The effective destination for this reply: `FaultTo` takes precedence
    /// for faults, `ReplyTo` otherwise.
    fn effective_destination(&self, response: &Envelope) -> Option<String> {
        if response.is_fault() {
            self.fault_to.clone().or_else(|| self.reply_to.clone())
        } else {
            self.reply_to.clone()
        }
    }

    fn deliver_out_of_band(
        &mut self,
        fiber: &FiberHandle,
        destination: &str,
        response: Envelope,
    ) -> HermesResult<Envelope> {
        let relates_to = response.relates_to().map(str::to_string);

        let chain = self.assembler.assemble_client(destination, None)?;
        let mut outbound = response;
        outbound.set_to(destination);
        // The reply no longer rides the inbound connection.
        let _ = outbound.take_back_channel();

        let callback = fiber
            .take_callback()
            .unwrap_or_else(|| Box::new(|_outcome| {}));
        let nested = self.engine.spawn(chain, outbound, callback);
        info!(
            fiber = %nested.id(),
            destination,
            "reply handed off for asynchronous delivery"
        );

        if let Some(channel) = self.back_channel.take() {
            close_back_channel(channel.as_ref());
        }

        Ok(Envelope::no_content(relates_to.as_deref()))
    }
}

impl Stage for AddressingStage {
    fn name(&self) -> &'static str {
        "addressing"
    }

    fn process_request<'a>(
        &'a mut self,
        _fiber: &'a FiberHandle,
        request: Envelope,
    ) -> BoxFuture<'a, HermesResult<StageAction>> {
        self.reply_to = request.reply_to().map(str::to_string);
        self.fault_to = request.fault_to().map(str::to_string);
        self.back_channel = request.back_channel();

        match request.action() {
            Some(action) => match self.policies.get(action) {
                Some(policy) => {
                    if let Err(violation) = validate_addressing(&request, *policy) {
                        warn!(%violation, action, "rejecting request with invalid addressing");
                        let fault = violation.to_fault(request.message_id());
                        return Box::pin(std::future::ready(Ok(StageAction::Reply(fault))));
                    }
                }
                None => {
                    debug!(action, "no operation bound to action; skipping addressing check");
                }
            },
            None => {
                debug!("request carries no action header; skipping addressing check");
            }
        }

        Box::pin(std::future::ready(Ok(StageAction::Continue(request))))
    }

    fn process_response<'a>(
        &'a mut self,
        fiber: &'a FiberHandle,
        response: Envelope,
    ) -> BoxFuture<'a, HermesResult<Envelope>> {
        let destination = self.effective_destination(&response);
        Box::pin(async move {
            match destination {
                Some(address) if address != ANONYMOUS_ADDRESS => {
                    self.deliver_out_of_band(fiber, &address, response)
                }
                _ => Ok(response),
            }
        })
    }

    fn copy(&self) -> BoxStage {
        Box::new(Self::new(
            Arc::clone(&self.policies),
            self.engine.clone(),
            Arc::clone(&self.assembler),
        ))
    }

    fn close(&mut self) {
        self.reply_to = None;
        self.fault_to = None;
        self.back_channel = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::{BindingConfig, Transport};
    use crate::chain::StageChain;
    use crate::stage::FnStage;
    use bytes::Bytes;
    use hermes_core::FaultBody;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::oneshot;

    #[test]
    fn required_rejects_concrete_and_accepts_anonymous() {
        let mut request = Envelope::new(Bytes::new());
        request.set_reply_to("http://example.org/client");
        let error = validate_addressing(&request, AnonymousPolicy::Required)
            .expect_err("concrete must be rejected");
        match error {
            HermesError::AddressingViolation { header, .. } => {
                assert_eq!(header, QName::reply_to());
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut request = Envelope::new(Bytes::new());
        request.set_reply_to(ANONYMOUS_ADDRESS);
        validate_addressing(&request, AnonymousPolicy::Required).expect("anonymous accepted");
    }

    #[test]
    fn prohibited_is_the_symmetric_check() {
        let mut request = Envelope::new(Bytes::new());
        request.set_reply_to(ANONYMOUS_ADDRESS);
        let error = validate_addressing(&request, AnonymousPolicy::Prohibited)
            .expect_err("anonymous must be rejected");
        assert!(matches!(error, HermesError::AddressingViolation { .. }));

        let mut request = Envelope::new(Bytes::new());
        request.set_reply_to("http://example.org/client");
        validate_addressing(&request, AnonymousPolicy::Prohibited).expect("concrete accepted");
    }

    #[test]
    fn offending_fault_to_is_tagged_as_fault_to() {
        let mut request = Envelope::new(Bytes::new());
        request.set_reply_to(ANONYMOUS_ADDRESS);
        request.set_fault_to("http://example.org/faults");
        let error = validate_addressing(&request, AnonymousPolicy::Required)
            .expect_err("concrete FaultTo must be rejected");
        match error {
            HermesError::AddressingViolation { header, .. } => {
                assert_eq!(header, QName::fault_to());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn optional_and_absent_destinations_pass() {
        let request = Envelope::new(Bytes::new());
        validate_addressing(&request, AnonymousPolicy::Required).expect("absent passes");
        validate_addressing(&request, AnonymousPolicy::Prohibited).expect("absent passes");

        let mut request = Envelope::new(Bytes::new());
        request.set_reply_to("http://example.org/client");
        validate_addressing(&request, AnonymousPolicy::Optional).expect("optional never checks");
    }

    /// Transport that records delivered envelopes per destination.
    struct RecordingTransport {
        delivered: Arc<Mutex<Vec<(String, Envelope)>>>,
        reachable: bool,
    }

    impl Transport for RecordingTransport {
        fn connect(&self, destination: &str) -> HermesResult<BoxStage> {
            if !self.reachable {
                return Err(HermesError::transport("destination unreachable"));
            }
            let delivered = Arc::clone(&self.delivered);
            let destination = destination.to_string();
            Ok(Box::new(FnStage::new("recording-transport", move |env: Envelope| {
                let relates_to = env.relates_to().map(str::to_string);
                delivered.lock().push((destination.clone(), env));
                Ok(StageAction::Reply(Envelope::no_content(relates_to.as_deref())))
            })))
        }
    }

    fn server_chain(
        reachable: bool,
    ) -> (Arc<Mutex<Vec<(String, Envelope)>>>, StageChain, FiberEngine) {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let engine = FiberEngine::new();
        let assembler = Arc::new(PipelineAssembler::new(
            Arc::new(RecordingTransport {
                delivered: Arc::clone(&delivered),
                reachable,
            }),
            engine.clone(),
        ));
        let binding = BindingConfig::new().operation("urn:test:op", AnonymousPolicy::Optional);
        let terminal = Box::new(FnStage::new("invoker", |request: Envelope| {
            Ok(StageAction::Reply(
                request.derive_reply(Bytes::from_static(b"result")),
            ))
        }));
        let chain = assembler.assemble_server(&binding, terminal);
        (delivered, chain, engine)
    }

    fn make_request(reply_to: &str) -> Envelope {
        let mut request = Envelope::new(Bytes::from_static(b"question"));
        request.set_action("urn:test:op");
        request.set_reply_to(reply_to);
        request
    }

    #[tokio::test]
    async fn anonymous_reply_rides_the_same_path() {
        let (delivered, chain, engine) = server_chain(true);
        let (tx, rx) = oneshot::channel();
        engine.spawn(
            chain,
            make_request(ANONYMOUS_ADDRESS),
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        let reply = rx.await.expect("fired").expect("reply");
        assert_eq!(reply.payload().as_ref(), b"result");
        assert!(delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn concrete_reply_is_delivered_out_of_band() {
        let (delivered, chain, engine) = server_chain(true);

        // Track that the inbound back-channel gets closed on hand-off.
        struct Flag(AtomicU32);
        impl BackChannel for Flag {
            fn close(&self) -> Result<(), HermesError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
        let flag = Arc::new(Flag(AtomicU32::new(0)));

        let mut request = make_request("http://example.org/client-endpoint");
        let request_id = request.message_id().map(str::to_string);
        request.set_back_channel(flag.clone());

        let (tx, rx) = oneshot::channel();
        engine.spawn(
            chain,
            request,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );

        // The transferred callback fires with the nested delivery's outcome:
        // a no-content acknowledgement.
        let outcome = rx.await.expect("fired").expect("delivery succeeded");
        assert!(outcome.is_no_content());
        assert_eq!(outcome.relates_to(), request_id.as_deref());

        let deliveries = delivered.lock();
        assert_eq!(deliveries.len(), 1);
        let (destination, envelope) = &deliveries[0];
        assert_eq!(destination, "http://example.org/client-endpoint");
        assert_eq!(envelope.payload().as_ref(), b"result");
        assert_eq!(envelope.to(), Some("http://example.org/client-endpoint"));
        assert_eq!(flag.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_destination_fails_the_original_callback() {
        let (_delivered, chain, engine) = server_chain(false);
        let (tx, rx) = oneshot::channel();
        engine.spawn(
            chain,
            make_request("http://example.org/client-endpoint"),
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        let outcome = rx.await.expect("fired");
        assert!(matches!(outcome, Err(HermesError::Transport { .. })));
    }

    #[tokio::test]
    async fn policy_violation_short_circuits_with_a_tagged_fault() {
        let engine = FiberEngine::new();
        let assembler = Arc::new(PipelineAssembler::new(
            Arc::new(RecordingTransport {
                delivered: Arc::new(Mutex::new(Vec::new())),
                reachable: true,
            }),
            engine.clone(),
        ));
        let binding = BindingConfig::new().operation("urn:test:op", AnonymousPolicy::Required);
        let terminal = Box::new(FnStage::new("invoker", |_request: Envelope| -> HermesResult<StageAction> {
            panic!("must not be dispatched")
        }));
        let chain = assembler.assemble_server(&binding, terminal);

        let (tx, rx) = oneshot::channel();
        engine.spawn(
            chain,
            make_request("http://example.org/client-endpoint"),
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        let reply = rx.await.expect("fired").expect("fault reply produced");
        assert!(reply.is_fault());
        let body = FaultBody::from_envelope(&reply).expect("fault body");
        assert_eq!(body.code, "InvalidAddressingHeader");
    }
}
