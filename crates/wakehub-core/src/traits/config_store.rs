// # Key-Value Store Trait
//
// Flat string storage behind the config repository. Keys are short dotted
// names (`pc.mac`, `ddns.2.domain`); values are strings.
//
// ## Implementations
//
// - `store::MemoryStore`: in-memory, for tests
// - `store::FileStore`: JSON file with atomic writes and a backup copy

use async_trait::async_trait;

/// Trait for persistent key/value storage
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Implementation Guidelines
///
/// - **Async I/O only**: never block the tick thread on file I/O
/// - **Explicit flush**: `flush()` must persist all pending changes
/// - **Thread-safe**: all methods must be safe to call concurrently
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: The stored value
    /// - `Ok(None)`: Nothing stored under `key`
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<(), crate::Error>;

    /// Remove a value (no error if absent)
    async fn remove(&self, key: &str) -> Result<(), crate::Error>;

    /// List all keys in the store
    async fn keys(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
