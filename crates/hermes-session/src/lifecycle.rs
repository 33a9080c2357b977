//! Instance lifecycle declarations.
//!
//! Application types declare their injection targets and lifecycle hooks
//! explicitly through a [`LifecycleDescriptor`]: a fixed list of
//! `(target, setter-function)` pairs plus at most one post-construct and one
//! pre-destroy hook. The declaration is validated once, when the descriptor
//! is built; resolvers then apply it to every instance they prepare.

use hermes_core::HermesError;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised while declaring or applying an instance lifecycle.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// More than one post-construct hook was declared.
    #[error("more than one post-construct hook declared")]
    DuplicatePostConstruct,

    /// More than one pre-destroy hook was declared.
    #[error("more than one pre-destroy hook declared")]
    DuplicatePreDestroy,

    /// A declared injection target could not be satisfied from the context.
    #[error("no value of type {type_name} available for injection target '{target}'")]
    MissingDependency {
        /// The injection target's declared name.
        target: String,
        /// The requested type.
        type_name: &'static str,
    },

    /// An injector failed while being applied to an instance.
    #[error("injection of target '{target}' failed")]
    Injection {
        /// The injection target's declared name.
        target: String,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },

    /// A lifecycle hook failed.
    #[error("{hook} hook failed")]
    Hook {
        /// Which hook failed (`post-construct` or `pre-destroy`).
        hook: &'static str,
        /// Underlying cause.
        #[source]
        source: anyhow::Error,
    },
}

impl From<LifecycleError> for HermesError {
    fn from(error: LifecycleError) -> Self {
        HermesError::lifecycle_with_source("instance lifecycle failure", error)
    }
}

/// The injection context supplied to a resolver at start time.
///
/// Values are registered by type and handed to injectors when instances are
/// prepared.
///
/// # Example
///
/// ```
/// use hermes_session::EndpointContext;
/// use std::sync::Arc;
///
/// struct Clock;
///
/// let mut context = EndpointContext::new();
/// context.register(Arc::new(Clock));
/// assert!(context.resolve::<Clock>().is_some());
/// ```
#[derive(Default)]
pub struct EndpointContext {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl EndpointContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value, replacing any previous value of the same type.
    pub fn register<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), value);
    }

    /// Resolves a value by type.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }

    /// Resolves a value by type, or fails naming the injection target.
    pub fn resolve_required<T: Send + Sync + 'static>(
        &self,
        target: &str,
    ) -> Result<Arc<T>, LifecycleError> {
        self.resolve::<T>().ok_or_else(|| LifecycleError::MissingDependency {
            target: target.to_string(),
            type_name: std::any::type_name::<T>(),
        })
    }
}

impl std::fmt::Debug for EndpointContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointContext")
            .field("registered", &self.services.len())
            .finish()
    }
}

/// One injection setter: applies a context value to an instance.
pub type Injector<T> =
    Arc<dyn Fn(&T, &EndpointContext) -> Result<(), LifecycleError> + Send + Sync>;

/// A lifecycle hook invoked on an instance.
pub type Hook<T> = Arc<dyn Fn(&T) -> Result<(), LifecycleError> + Send + Sync>;

/// The validated lifecycle declaration for an application type.
pub struct LifecycleDescriptor<T> {
    injectors: Vec<(String, Injector<T>)>,
    post_construct: Option<Hook<T>>,
    pre_destroy: Option<Hook<T>>,
}

impl<T> LifecycleDescriptor<T> {
    /// Starts declaring a lifecycle.
    #[must_use]
    pub fn builder() -> LifecycleDescriptorBuilder<T> {
        LifecycleDescriptorBuilder::new()
    }

    /// A descriptor with no injectors and no hooks.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            injectors: Vec::new(),
            post_construct: None,
            pre_destroy: None,
        }
    }

    /// Prepares an instance: applies every injector in declaration order,
    /// then the post-construct hook.
    pub fn prepare(&self, instance: &T, context: &EndpointContext) -> Result<(), LifecycleError> {
        for (target, injector) in &self.injectors {
            debug!(target, "applying injection");
            injector(instance, context)?;
        }
        if let Some(hook) = &self.post_construct {
            hook(instance).map_err(|error| wrap_hook("post-construct", error))?;
        }
        Ok(())
    }

    /// Tears an instance down by invoking the pre-destroy hook.
    pub fn destroy(&self, instance: &T) -> Result<(), LifecycleError> {
        if let Some(hook) = &self.pre_destroy {
            hook(instance).map_err(|error| wrap_hook("pre-destroy", error))?;
        }
        Ok(())
    }
}

fn wrap_hook(hook: &'static str, error: LifecycleError) -> LifecycleError {
    match error {
        // Already a hook failure with a cause; keep the original shape.
        wrapped @ LifecycleError::Hook { .. } => wrapped,
        other => LifecycleError::Hook {
            hook,
            source: other.into(),
        },
    }
}

/// Builder for [`LifecycleDescriptor`].
///
/// Declaring a second post-construct or pre-destroy hook is a malformed
/// declaration and fails at [`build`](Self::build) time.
pub struct LifecycleDescriptorBuilder<T> {
    injectors: Vec<(String, Injector<T>)>,
    post_construct: Vec<Hook<T>>,
    pre_destroy: Vec<Hook<T>>,
}

impl<T> LifecycleDescriptorBuilder<T> {
    fn new() -> Self {
        Self {
            injectors: Vec::new(),
            post_construct: Vec::new(),
            pre_destroy: Vec::new(),
        }
    }

    /// Declares an injection target with its setter function.
    #[must_use]
    pub fn injector<F>(mut self, target: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&T, &EndpointContext) -> Result<(), LifecycleError> + Send + Sync + 'static,
    {
        self.injectors.push((target.into(), Arc::new(setter)));
        self
    }

    /// Declares the post-construct hook.
    #[must_use]
    pub fn post_construct<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), LifecycleError> + Send + Sync + 'static,
    {
        self.post_construct.push(Arc::new(hook));
        self
    }

    /// Declares the pre-destroy hook.
    #[must_use]
    pub fn pre_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), LifecycleError> + Send + Sync + 'static,
    {
        self.pre_destroy.push(Arc::new(hook));
        self
    }

    /// Validates the declaration and builds the descriptor.
    pub fn build(mut self) -> Result<LifecycleDescriptor<T>, LifecycleError> {
        if self.post_construct.len() > 1 {
            return Err(LifecycleError::DuplicatePostConstruct);
        }
        if self.pre_destroy.len() > 1 {
            return Err(LifecycleError::DuplicatePreDestroy);
        }
        Ok(LifecycleDescriptor {
            injectors: self.injectors,
            post_construct: self.post_construct.pop(),
            pre_destroy: self.pre_destroy.pop(),
        })
    }
}
