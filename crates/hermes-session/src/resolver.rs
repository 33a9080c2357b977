//! The stateful instance resolver.
//!
//! Maps opaque session tokens to live application-object instances. An
//! instance is exported at most once: export prepares it (injection plus
//! post-construct hook), generates an unguessable random token, and publishes
//! the token↔instance mapping in both directions. Inbound messages carrying
//! the token in the well-known session header resolve back to that instance;
//! messages without a recognizable token fall through to a configured
//! fallback instance, or fail with a session-routing fault.

use crate::lifecycle::{EndpointContext, LifecycleDescriptor};
use dashmap::DashMap;
use hermes_core::{EndpointReference, Envelope, HermesError, HermesResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An opaque, unguessable session token.
///
/// Tokens are random (UUID v4), never sequential: the token is the sole
/// authorization for routing to its instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an idle callback wants done with an idle instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleDisposition {
    /// Keep the instance; restart its idle clock.
    Renew,
    /// Unexport the instance.
    Evict,
}

/// Callback invoked when an exported instance has been idle past a
/// threshold.
///
/// Idle tracking itself is external policy: the resolver stores the
/// registration and exposes it, but does not run a sweeper.
pub trait IdleCallback<T>: Send + Sync {
    /// Decides the fate of an idle instance.
    fn on_idle(&self, token: &SessionToken, instance: &Arc<T>) -> IdleDisposition;
}

struct IdleRegistration<T> {
    threshold: Duration,
    callback: Arc<dyn IdleCallback<T>>,
}

/// Maps session tokens to live application-object instances.
///
/// # Concurrency
///
/// The token↔instance maps are mutated under a resolver-wide mutex on the
/// export/unexport path; the resolve path reads the concurrent map without
/// taking it. Export is idempotent, and concurrent exports of the same
/// instance prepare it exactly once.
///
/// # Example
///
/// ```
/// use hermes_session::{EndpointContext, LifecycleDescriptor, StatefulResolver};
/// use std::sync::Arc;
///
/// struct Counter;
///
/// let resolver = StatefulResolver::new(
///     "http://example.org/svc",
///     LifecycleDescriptor::<Counter>::empty(),
/// );
/// resolver.start(EndpointContext::new()).unwrap();
///
/// let instance = Arc::new(Counter);
/// let reference = resolver.export(&instance).unwrap();
/// assert!(reference.session_token().is_some());
/// ```
pub struct StatefulResolver<T: Send + Sync + 'static> {
    address: String,
    descriptor: LifecycleDescriptor<T>,
    by_token: DashMap<SessionToken, Arc<T>>,
    by_instance: DashMap<usize, SessionToken>,
    fallback: RwLock<Option<Arc<T>>>,
    export_lock: Mutex<()>,
    context: OnceLock<EndpointContext>,
    disposed: AtomicBool,
    idle: RwLock<Option<IdleRegistration<T>>>,
}

fn instance_key<T>(instance: &Arc<T>) -> usize {
    Arc::as_ptr(instance) as usize
}

impl<T: Send + Sync + 'static> StatefulResolver<T> {
    /// Creates a resolver for the endpoint at `address`.
    ///
    /// The lifecycle declaration was validated when the descriptor was
    /// built; construction cannot observe a malformed one.
    #[must_use]
    pub fn new(address: impl Into<String>, descriptor: LifecycleDescriptor<T>) -> Self {
        Self {
            address: address.into(),
            descriptor,
            by_token: DashMap::new(),
            by_instance: DashMap::new(),
            fallback: RwLock::new(None),
            export_lock: Mutex::new(()),
            context: OnceLock::new(),
            disposed: AtomicBool::new(false),
            idle: RwLock::new(None),
        }
    }

    /// Supplies the injection context. Must be called exactly once, before
    /// any call that prepares instances.
    pub fn start(&self, context: EndpointContext) -> HermesResult<()> {
        self.context
            .set(context)
            .map_err(|_| HermesError::lifecycle("resolver already started"))
    }

    /// Returns the endpoint address references are built from.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the number of currently exported instances.
    #[must_use]
    pub fn exported_count(&self) -> usize {
        self.by_token.len()
    }

    fn ensure_live(&self) -> HermesResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(HermesError::lifecycle("resolver has been disposed"));
        }
        Ok(())
    }

    fn prepare(&self, instance: &Arc<T>) -> HermesResult<()> {
        let context = self.context.get().ok_or_else(|| {
            HermesError::lifecycle("resolver not started: call start() before preparing instances")
        })?;
        self.descriptor.prepare(instance, context)?;
        Ok(())
    }

    /// Resolves the request's target instance.
    ///
    /// A recognized session token wins; an unrecognized or absent token
    /// routes to the fallback instance when one is configured, and otherwise
    /// fails with a session-routing fault distinguishing the two cases.
    pub fn resolve(&self, request: &Envelope) -> HermesResult<Arc<T>> {
        self.ensure_live()?;
        match request.session_token() {
            Some(token) => {
                let key = SessionToken::from(token);
                if let Some(instance) = self.by_token.get(&key) {
                    debug!(%key, "resolved session instance");
                    return Ok(Arc::clone(&instance));
                }
                match self.fallback_instance() {
                    Some(fallback) => {
                        warn!(token, "unrecognized session token; routing to fallback");
                        Ok(fallback)
                    }
                    None => Err(HermesError::session_token_invalid(token)),
                }
            }
            None => self
                .fallback_instance()
                .ok_or(HermesError::SessionTokenRequired),
        }
    }

    /// Exports an instance as an addressable reference.
    ///
    /// Idempotent: an already-exported instance returns a reference carrying
    /// its existing token. A first export prepares the instance exactly once
    /// (under the export mutex, re-checked to avoid racing exports), then
    /// publishes both mapping directions.
    pub fn export(&self, instance: &Arc<T>) -> HermesResult<EndpointReference> {
        self.ensure_live()?;
        let key = instance_key(instance);
        if let Some(token) = self.by_instance.get(&key) {
            return Ok(self.reference(&token));
        }

        let _guard = self.export_lock.lock();
        // Re-check both under the lock: a racing export may have published,
        // and a racing dispose may have torn the resolver down, while we
        // waited.
        self.ensure_live()?;
        if let Some(token) = self.by_instance.get(&key) {
            return Ok(self.reference(&token));
        }

        self.prepare(instance)?;
        let token = SessionToken::generate();
        self.by_token.insert(token.clone(), Arc::clone(instance));
        self.by_instance.insert(key, token.clone());
        info!(%token, "exported stateful instance");
        Ok(self.reference(&token))
    }

    /// Removes an instance's token binding. No-op if the instance was never
    /// exported or is already unexported.
    pub fn unexport(&self, instance: &Arc<T>) {
        let _guard = self.export_lock.lock();
        if let Some((_, token)) = self.by_instance.remove(&instance_key(instance)) {
            self.by_token.remove(&token);
            info!(%token, "unexported stateful instance");
        }
    }

    /// Installs the fallback instance used when no token is present or the
    /// token is unrecognized, preparing it first. Runs under the export
    /// mutex so teardown cannot interleave.
    ///
    /// Replacing an existing fallback does not tear the previous one down;
    /// that is the caller's responsibility.
    pub fn set_fallback(&self, instance: Option<Arc<T>>) -> HermesResult<()> {
        let _guard = self.export_lock.lock();
        self.ensure_live()?;
        if let Some(instance) = &instance {
            self.prepare(instance)?;
        }
        *self.fallback.write() = instance;
        Ok(())
    }

    /// Returns the configured fallback instance, if any.
    #[must_use]
    pub fn fallback_instance(&self) -> Option<Arc<T>> {
        self.fallback.read().clone()
    }

    /// Registers the idle-timeout boundary: `callback` is to be invoked when
    /// an instance has been idle past `threshold`, and may renew or evict.
    ///
    /// Enforcement belongs to an external sweeper; the resolver only holds
    /// the registration.
    pub fn register_idle_callback(&self, threshold: Duration, callback: Arc<dyn IdleCallback<T>>) {
        *self.idle.write() = Some(IdleRegistration {
            threshold,
            callback,
        });
    }

    /// Returns the registered idle threshold and callback, if any.
    #[must_use]
    pub fn idle_registration(&self) -> Option<(Duration, Arc<dyn IdleCallback<T>>)> {
        self.idle
            .read()
            .as_ref()
            .map(|r| (r.threshold, Arc::clone(&r.callback)))
    }

    /// Tears down every exported instance and the fallback, invoking each
    /// instance's pre-destroy hook exactly once, then clears all mappings.
    ///
    /// The resolver must not be used afterwards. The first teardown failure
    /// is surfaced after all instances have been visited.
    pub fn dispose(&self) -> HermesResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Err(HermesError::lifecycle("resolver already disposed"));
        }
        let _guard = self.export_lock.lock();

        let mut first_failure: Option<HermesError> = None;
        let mut seen = HashSet::new();

        let mut instances: Vec<Arc<T>> = Vec::new();
        for entry in &self.by_token {
            instances.push(Arc::clone(entry.value()));
        }
        if let Some(fallback) = self.fallback.write().take() {
            instances.push(fallback);
        }

        for instance in instances {
            // An instance may be both exported and installed as fallback;
            // it is destroyed once.
            if !seen.insert(instance_key(&instance)) {
                continue;
            }
            if let Err(error) = self.descriptor.destroy(&instance) {
                warn!(%error, "pre-destroy hook failed during dispose");
                if first_failure.is_none() {
                    first_failure = Some(error.into());
                }
            }
        }

        self.by_token.clear();
        self.by_instance.clear();
        info!("stateful resolver disposed");

        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn reference(&self, token: &SessionToken) -> EndpointReference {
        EndpointReference::for_session(&self.address, token.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleDescriptor;
    use bytes::Bytes;
    use std::sync::atomic::AtomicU32;

    #[derive(Debug, Default)]
    struct Session {
        prepared: AtomicU32,
        destroyed: AtomicU32,
    }

    fn counting_descriptor() -> LifecycleDescriptor<Session> {
        LifecycleDescriptor::<Session>::builder()
            .post_construct(|session| {
                session.prepared.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .pre_destroy(|session| {
                session.destroyed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .expect("valid declaration")
    }

    fn started_resolver() -> StatefulResolver<Session> {
        let resolver = StatefulResolver::new("http://example.org/svc", counting_descriptor());
        resolver.start(EndpointContext::new()).expect("first start");
        resolver
    }

    fn request_with_token(token: &str) -> Envelope {
        let mut request = Envelope::new(Bytes::new());
        request.set_session_token(token);
        request
    }

    #[test]
    fn export_is_idempotent_and_prepares_once() {
        let resolver = started_resolver();
        let instance = Arc::new(Session::default());

        let first = resolver.export(&instance).expect("first export");
        let second = resolver.export(&instance).expect("second export");
        assert_eq!(first.session_token(), second.session_token());
        assert_eq!(instance.prepared.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.exported_count(), 1);
    }

    #[test]
    fn resolve_unexport_resolve_follows_fallback_configuration() {
        let resolver = started_resolver();
        let instance = Arc::new(Session::default());
        let reference = resolver.export(&instance).expect("export");
        let token = reference.session_token().expect("token").to_string();

        let resolved = resolver
            .resolve(&request_with_token(&token))
            .expect("known token resolves");
        assert!(Arc::ptr_eq(&resolved, &instance));

        resolver.unexport(&instance);

        // Without a fallback the stale token is a session-routing fault.
        let error = resolver
            .resolve(&request_with_token(&token))
            .expect_err("stale token fails");
        assert!(matches!(error, HermesError::SessionTokenInvalid { .. }));

        // With a fallback it routes there instead.
        let fallback = Arc::new(Session::default());
        resolver
            .set_fallback(Some(Arc::clone(&fallback)))
            .expect("fallback installs");
        let resolved = resolver
            .resolve(&request_with_token(&token))
            .expect("stale token falls back");
        assert!(Arc::ptr_eq(&resolved, &fallback));
    }

    #[test]
    fn missing_token_errors_are_distinguished() {
        let resolver = started_resolver();
        let error = resolver
            .resolve(&Envelope::new(Bytes::new()))
            .expect_err("no token, no fallback");
        assert!(matches!(error, HermesError::SessionTokenRequired));
    }

    #[test]
    fn exported_references_round_trip_without_collisions() {
        let resolver = started_resolver();
        let mut tokens = HashSet::new();

        for _ in 0..1000 {
            let instance = Arc::new(Session::default());
            let reference = resolver.export(&instance).expect("export");
            let token = reference.session_token().expect("token").to_string();
            assert!(tokens.insert(token.clone()), "token collision");

            let resolved = resolver
                .resolve(&request_with_token(&token))
                .expect("token resolves");
            assert!(Arc::ptr_eq(&resolved, &instance));
        }
        assert_eq!(resolver.exported_count(), 1000);
    }

    #[test]
    fn concurrent_exports_prepare_exactly_once() {
        let resolver = Arc::new(started_resolver());
        let instance = Arc::new(Session::default());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let resolver = Arc::clone(&resolver);
            let instance = Arc::clone(&instance);
            handles.push(std::thread::spawn(move || {
                resolver
                    .export(&instance)
                    .expect("export")
                    .session_token()
                    .expect("token")
                    .to_string()
            }));
        }

        let tokens: HashSet<String> = handles
            .into_iter()
            .map(|h| h.join().expect("thread joins"))
            .collect();
        assert_eq!(tokens.len(), 1, "all exports must agree on one token");
        assert_eq!(instance.prepared.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_destroys_each_instance_once_and_empties_the_maps() {
        let resolver = started_resolver();
        let exported = Arc::new(Session::default());
        let fallback = Arc::new(Session::default());
        resolver.export(&exported).expect("export");
        resolver
            .set_fallback(Some(Arc::clone(&fallback)))
            .expect("fallback installs");

        resolver.dispose().expect("dispose succeeds");
        assert_eq!(exported.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.exported_count(), 0);

        // The resolver is unusable afterwards.
        assert!(resolver.dispose().is_err());
        assert!(resolver.export(&Arc::new(Session::default())).is_err());
        assert!(resolver.resolve(&Envelope::new(Bytes::new())).is_err());
        assert!(resolver
            .set_fallback(Some(Arc::new(Session::default())))
            .is_err());
    }

    #[test]
    fn exports_racing_dispose_never_leak_undestroyed_instances() {
        // An export that wins the race is torn down by dispose; an export
        // that loses never prepares its instance. Either way no instance
        // ends up prepared-but-never-destroyed.
        for _ in 0..50 {
            let resolver = Arc::new(started_resolver());
            let mut exporters = Vec::new();
            for _ in 0..4 {
                let resolver = Arc::clone(&resolver);
                exporters.push(std::thread::spawn(move || {
                    let instance = Arc::new(Session::default());
                    let exported = resolver.export(&instance).is_ok();
                    (instance, exported)
                }));
            }
            let disposer = {
                let resolver = Arc::clone(&resolver);
                std::thread::spawn(move || {
                    resolver.dispose().expect("single disposal succeeds");
                })
            };

            disposer.join().expect("disposer joins");
            for handle in exporters {
                let (instance, exported) = handle.join().expect("exporter joins");
                if exported {
                    assert_eq!(instance.prepared.load(Ordering::SeqCst), 1);
                    assert_eq!(instance.destroyed.load(Ordering::SeqCst), 1);
                } else {
                    assert_eq!(instance.prepared.load(Ordering::SeqCst), 0);
                    assert_eq!(instance.destroyed.load(Ordering::SeqCst), 0);
                }
            }
            assert_eq!(resolver.exported_count(), 0);
        }
    }

    #[test]
    fn fallback_also_exported_is_destroyed_once() {
        let resolver = started_resolver();
        let instance = Arc::new(Session::default());
        resolver.export(&instance).expect("export");
        resolver
            .set_fallback(Some(Arc::clone(&instance)))
            .expect("fallback installs");

        resolver.dispose().expect("dispose succeeds");
        assert_eq!(instance.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_twice_is_rejected() {
        let resolver = started_resolver();
        let error = resolver
            .start(EndpointContext::new())
            .expect_err("second start fails");
        assert!(matches!(error, HermesError::Lifecycle { .. }));
    }

    #[test]
    fn export_before_start_is_rejected() {
        let resolver =
            StatefulResolver::new("http://example.org/svc", counting_descriptor());
        let error = resolver
            .export(&Arc::new(Session::default()))
            .expect_err("export before start fails");
        assert!(matches!(error, HermesError::Lifecycle { .. }));
    }

    #[test]
    fn idle_registration_is_a_stored_boundary() {
        struct Evictor;
        impl IdleCallback<Session> for Evictor {
            fn on_idle(&self, _token: &SessionToken, _instance: &Arc<Session>) -> IdleDisposition {
                IdleDisposition::Evict
            }
        }

        let resolver = started_resolver();
        assert!(resolver.idle_registration().is_none());
        resolver.register_idle_callback(Duration::from_secs(60), Arc::new(Evictor));
        let (threshold, callback) = resolver.idle_registration().expect("registered");
        assert_eq!(threshold, Duration::from_secs(60));
        let instance = Arc::new(Session::default());
        assert_eq!(
            callback.on_idle(&SessionToken::generate(), &instance),
            IdleDisposition::Evict
        );
    }
}
