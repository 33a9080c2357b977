//! Out-of-band message metadata.
//!
//! Every [`Envelope`](crate::Envelope) carries a string-keyed bag of
//! arbitrary values alongside its payload and headers: the transport
//! back-channel handle, the session endpoint reference, and binding-specific
//! flags all travel here rather than in the wire message itself.

use std::any::Any;
use std::collections::HashMap;

/// A string-keyed bag of heterogeneous values.
///
/// Values are stored type-erased and recovered by downcasting, so a lookup
/// with the wrong type behaves like a missing key.
///
/// # Example
///
/// ```
/// use hermes_core::Metadata;
///
/// let mut metadata = Metadata::new();
/// metadata.insert("hermes.binding.one-way", true);
/// assert_eq!(metadata.get::<bool>("hermes.binding.one-way"), Some(&true));
/// assert_eq!(metadata.get::<String>("hermes.binding.one-way"), None);
/// ```
#[derive(Default)]
pub struct Metadata {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Metadata {
    /// Creates an empty metadata bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value under the given key, replacing any previous value.
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// Returns the value stored under `key`, if present with type `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove<T: Send + Sync + 'static>(&mut self, key: &str) -> Option<T> {
        let value = self.entries.remove(key)?;
        match value.downcast::<T>() {
            Ok(boxed) => Some(*boxed),
            Err(original) => {
                // Wrong type requested: put the entry back untouched.
                self.entries.insert(key.to_string(), original);
                None
            }
        }
    }

    /// Returns `true` if a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metadata")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
