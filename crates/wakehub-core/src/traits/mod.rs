//! Capability traits the services depend on
//!
//! The services never touch sockets, HTTP or storage directly. Everything
//! that performs I/O is one of these interfaces:
//!
//! - [`AddressResolver`]: Find the local or public address of the device
//! - [`DnsRecordClient`]: Read and write one DNS record via a provider API
//! - [`KeyValueStore`]: Flat persistent key/value storage for configuration
//! - [`WakeSender`], [`HostProber`], [`HttpClient`], [`LinkMonitor`]: Network primitives
//! - [`PubSubClient`]: Cloud broker session
//! - [`FirmwareUpdater`]: Download and apply a firmware image

pub mod address_resolver;
pub mod config_store;
pub mod dns_provider;
pub mod firmware;
pub mod network;
pub mod pubsub;

pub use address_resolver::{AddressResolver, AddressScope};
pub use config_store::KeyValueStore;
pub use dns_provider::{DnsProviderFactory, DnsRecordClient, RecordMetadata, UpdateResult};
pub use firmware::{FirmwarePackageInfo, FirmwareUpdater, TransferProgress};
pub use network::{HostProber, HttpClient, HttpResponse, LinkMonitor, WakeSender};
pub use pubsub::{ConnectOptions, InboundMessage, PubSubClient};
