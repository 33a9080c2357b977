//! Endpoint configuration.

use hermes_core::AnonymousPolicy;
use std::collections::HashMap;

/// Configuration for one deployed endpoint.
///
/// # Example
///
/// ```
/// use hermes_core::AnonymousPolicy;
/// use hermes_endpoint::EndpointConfig;
///
/// let config = EndpointConfig::builder()
///     .address("http://example.org/orders")
///     .operation("urn:orders:submit", AnonymousPolicy::Required)
///     .operation("urn:orders:track", AnonymousPolicy::Optional)
///     .build();
/// assert_eq!(config.operations().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    address: String,
    operations: HashMap<String, AnonymousPolicy>,
}

impl EndpointConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> EndpointConfigBuilder {
        EndpointConfigBuilder::default()
    }

    /// Returns the endpoint's own address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the operation table: action URI to anonymous-reply policy.
    #[must_use]
    pub fn operations(&self) -> &HashMap<String, AnonymousPolicy> {
        &self.operations
    }
}

/// Builder for [`EndpointConfig`].
#[derive(Debug, Default)]
pub struct EndpointConfigBuilder {
    address: Option<String>,
    operations: HashMap<String, AnonymousPolicy>,
}

impl EndpointConfigBuilder {
    /// Sets the endpoint's address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Declares an operation's anonymous-reply policy, keyed by action URI.
    ///
    /// Requests whose action matches no declared operation skip addressing
    /// validation entirely.
    #[must_use]
    pub fn operation(mut self, action: impl Into<String>, policy: AnonymousPolicy) -> Self {
        self.operations.insert(action.into(), policy);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> EndpointConfig {
        EndpointConfig {
            address: self.address.unwrap_or_else(|| "urn:hermes:anonymous-endpoint".to_string()),
            operations: self.operations,
        }
    }
}
