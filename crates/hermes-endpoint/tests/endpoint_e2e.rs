//! End-to-end endpoint scenarios: full pipelines over the in-memory
//! transport, exercising synchronous replies, out-of-band delivery,
//! addressing enforcement, session routing, and failure containment.

use bytes::Bytes;
use hermes_core::{
    AnonymousPolicy, BackChannel, Envelope, FaultBody, FaultDetail, HermesError, HermesResult,
    QName, ANONYMOUS_ADDRESS,
};
use hermes_endpoint::{Endpoint, EndpointConfig, InMemoryTransport, Provider};
use hermes_pipeline::BoxFuture;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const ACTION: &str = "urn:test:exchange";
const CLIENT_ADDRESS: &str = "http://example.org/client-endpoint";

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Replies with a fixed name, so tests can tell which instance handled the
/// request.
struct Named(&'static str);

impl Provider for Named {
    fn invoke<'a>(&'a self, _request: &'a Envelope) -> BoxFuture<'a, HermesResult<Bytes>> {
        Box::pin(async move { Ok(Bytes::from(self.0)) })
    }
}

struct ClosableFlag(AtomicU32);

impl BackChannel for ClosableFlag {
    fn close(&self) -> Result<(), HermesError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn singleton_endpoint(
    policy: AnonymousPolicy,
    transport: Arc<InMemoryTransport>,
) -> Endpoint<Named> {
    let config = EndpointConfig::builder()
        .address("urn:test:service")
        .operation(ACTION, policy)
        .build();
    Endpoint::builder(config)
        .transport(transport)
        .provider(Arc::new(Named("singleton")))
        .build()
        .expect("endpoint builds")
}

fn request(reply_to: &str) -> Envelope {
    let mut envelope = Envelope::new(Bytes::from_static(b"question"));
    envelope.set_action(ACTION);
    envelope.set_reply_to(reply_to);
    envelope
}

#[tokio::test]
async fn tokenless_request_is_served_by_the_fallback_synchronously() {
    use hermes_session::LifecycleDescriptor;

    init_tracing();
    let config = EndpointConfig::builder()
        .address("urn:test:service")
        .operation(ACTION, AnonymousPolicy::Required)
        .build();
    let endpoint = Endpoint::builder(config)
        .transport(Arc::new(InMemoryTransport::new()))
        .stateful(LifecycleDescriptor::<Named>::empty())
        .build()
        .expect("endpoint builds");
    endpoint
        .resolver()
        .expect("stateful endpoint has a resolver")
        .set_fallback(Some(Arc::new(Named("fallback"))))
        .expect("fallback installs");

    let inbound = request(ANONYMOUS_ADDRESS);
    let request_id = inbound.message_id().map(str::to_string);

    let reply = endpoint.process(inbound, None).await;
    assert!(!reply.is_fault());
    assert_eq!(reply.payload().as_ref(), b"fallback");
    assert_eq!(reply.relates_to(), request_id.as_deref());
}

#[tokio::test]
async fn exported_instance_is_routed_by_session_token() {
    use hermes_session::LifecycleDescriptor;

    init_tracing();
    let config = EndpointConfig::builder()
        .address("urn:test:service")
        .operation(ACTION, AnonymousPolicy::Optional)
        .build();
    let endpoint = Endpoint::builder(config)
        .transport(Arc::new(InMemoryTransport::new()))
        .stateful(LifecycleDescriptor::<Named>::empty())
        .build()
        .expect("endpoint builds");
    let resolver = endpoint.resolver().expect("resolver").clone();
    resolver
        .set_fallback(Some(Arc::new(Named("fallback"))))
        .expect("fallback installs");
    let reference = resolver
        .export(&Arc::new(Named("session-a")))
        .expect("export succeeds");
    let token = reference.session_token().expect("reference carries token");

    let mut inbound = request(ANONYMOUS_ADDRESS);
    inbound.set_session_token(token);
    let reply = endpoint.process(inbound, None).await;
    assert_eq!(reply.payload().as_ref(), b"session-a");

    // Without the token the fallback answers instead.
    let reply = endpoint.process(request(ANONYMOUS_ADDRESS), None).await;
    assert_eq!(reply.payload().as_ref(), b"fallback");
}

#[tokio::test]
async fn non_anonymous_reply_travels_out_of_band() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let sink = transport.bind_sink(CLIENT_ADDRESS);
    let endpoint = singleton_endpoint(AnonymousPolicy::Optional, transport);

    let flag = Arc::new(ClosableFlag(AtomicU32::new(0)));
    let inbound = request(CLIENT_ADDRESS);
    let request_id = inbound.message_id().map(str::to_string);

    let returned = endpoint.process(inbound, Some(flag.clone())).await;

    // The transport's synchronous channel gets a placeholder; the real reply
    // was recorded at the client's address and the inbound channel closed.
    assert!(returned.is_no_content());
    assert_eq!(returned.relates_to(), request_id.as_deref());

    let deliveries = sink.lock();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].payload().as_ref(), b"singleton");
    assert_eq!(deliveries[0].relates_to(), request_id.as_deref());
    assert_eq!(deliveries[0].to(), Some(CLIENT_ADDRESS));
    assert_eq!(flag.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_reply_destination_surfaces_as_a_delivery_fault() {
    init_tracing();
    // Nothing bound at the client's address.
    let endpoint = singleton_endpoint(AnonymousPolicy::Optional, Arc::new(InMemoryTransport::new()));

    let inbound = request(CLIENT_ADDRESS);
    let request_id = inbound.message_id().map(str::to_string);

    let returned = endpoint.process(inbound, None).await;
    assert!(returned.is_fault());
    assert_eq!(returned.relates_to(), request_id.as_deref());
    let body = FaultBody::from_envelope(&returned).expect("fault body");
    assert_eq!(body.code, "DeliveryFailure");
}

#[tokio::test]
async fn required_policy_rejects_a_concrete_reply_address() {
    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let sink = transport.bind_sink(CLIENT_ADDRESS);
    let endpoint = singleton_endpoint(AnonymousPolicy::Required, transport);

    let inbound = request(CLIENT_ADDRESS);
    let request_id = inbound.message_id().map(str::to_string);

    let returned = endpoint.process(inbound, None).await;
    assert!(returned.is_fault());
    assert_eq!(returned.relates_to(), request_id.as_deref());
    let body = FaultBody::from_envelope(&returned).expect("fault body");
    assert_eq!(body.code, "InvalidAddressingHeader");
    assert_eq!(body.detail, Some(FaultDetail::ProblemHeader(QName::reply_to())));

    // The violation is reported before dispatch; nothing reached the client.
    assert!(sink.lock().is_empty());
}

#[tokio::test]
async fn unbound_action_skips_addressing_validation() {
    init_tracing();
    let endpoint = singleton_endpoint(AnonymousPolicy::Required, Arc::new(InMemoryTransport::new()));

    // A concrete ReplyTo would violate the policy, but the action matches no
    // declared operation, so validation is skipped; the anonymous reply path
    // still applies because the destination is anonymous here.
    let mut inbound = Envelope::new(Bytes::from_static(b"question"));
    inbound.set_action("urn:test:undeclared");
    inbound.set_reply_to(ANONYMOUS_ADDRESS);

    let reply = endpoint.process(inbound, None).await;
    assert!(!reply.is_fault());
    assert_eq!(reply.payload().as_ref(), b"singleton");
}

#[tokio::test]
async fn panicking_provider_is_contained_as_a_fault_reply() {
    init_tracing();

    struct Exploding;

    impl Provider for Exploding {
        fn invoke<'a>(&'a self, _request: &'a Envelope) -> BoxFuture<'a, HermesResult<Bytes>> {
            panic!("defect in user code")
        }
    }

    let config = EndpointConfig::builder()
        .address("urn:test:service")
        .operation(ACTION, AnonymousPolicy::Optional)
        .build();
    let endpoint = Endpoint::builder(config)
        .transport(Arc::new(InMemoryTransport::new()))
        .provider(Arc::new(Exploding))
        .build()
        .expect("endpoint builds");

    let inbound = request(ANONYMOUS_ADDRESS);
    let request_id = inbound.message_id().map(str::to_string);

    let returned = endpoint.process(inbound, None).await;
    assert!(returned.is_fault());
    assert_eq!(returned.relates_to(), request_id.as_deref());
    let body = FaultBody::from_envelope(&returned).expect("fault body");
    assert_eq!(body.code, "InternalFailure");

    // The endpoint survives and keeps serving.
    let again = endpoint.process(request(ANONYMOUS_ADDRESS), None).await;
    assert!(again.is_fault());
}

#[tokio::test]
async fn fault_to_wins_for_faults() {
    use hermes_session::LifecycleDescriptor;

    init_tracing();
    let transport = Arc::new(InMemoryTransport::new());
    let fault_sink = transport.bind_sink("http://example.org/faults");
    let reply_sink = transport.bind_sink(CLIENT_ADDRESS);

    // A stateful endpoint with no fallback: a tokenless request produces a
    // session-routing fault on the reply path.
    let config = EndpointConfig::builder()
        .address("urn:test:service")
        .operation(ACTION, AnonymousPolicy::Optional)
        .build();
    let endpoint = Endpoint::builder(config)
        .transport(transport)
        .stateful(LifecycleDescriptor::<Named>::empty())
        .build()
        .expect("endpoint builds");

    let mut inbound = request(CLIENT_ADDRESS);
    inbound.set_fault_to("http://example.org/faults");

    let returned = endpoint.process(inbound, None).await;
    assert!(returned.is_no_content());

    let faults = fault_sink.lock();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].is_fault());
    let body = FaultBody::from_envelope(&faults[0]).expect("fault body");
    assert_eq!(body.code, "SessionTokenRequired");
    assert!(reply_sink.lock().is_empty());
}
