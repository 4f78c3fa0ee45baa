//! Storage port: Trait for the durable local key-value store.
//!
//! The file registry keeps its whole state here; the store is canonical.

/// Trait for local key-value persistence.
///
/// Values are opaque strings (the registry writes JSON).
pub trait KeyValueStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read a value.
    ///
    /// # Returns
    /// `None` if the key is absent.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Insert or overwrite a value.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Remove a key.
    ///
    /// # Returns
    /// Whether the key was present.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn remove(&self, key: &str) -> Result<bool, Self::Error>;

    /// Atomically replace the value at `key` if it still equals `expected`.
    ///
    /// `expected = None` means the key must be absent. Returns `false`
    /// without writing when the current value differs.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, Self::Error>;

    /// List keys starting with `prefix`.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, Self::Error>;
}
