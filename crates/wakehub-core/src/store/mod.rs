//! Config persistence
//!
//! - [`MemoryStore`]: volatile key/value store
//! - [`FileStore`]: JSON file key/value store with crash recovery
//! - [`ConfigRepository`]: typed load/save of the service configs

pub mod file;
pub mod memory;
pub mod repository;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use repository::ConfigRepository;
