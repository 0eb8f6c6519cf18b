// # wakehub-core
//
// Core library for the wakehub remote power and network appliance.
//
// ## Architecture Overview
//
// Four services are polled from one cooperative tick loop:
// - **PowerSequencer**: Wake-on-LAN + reachability probe state machine
// - **DdnsSynchronizer**: Per-record due timers against a signed DNS provider API
// - **CloudBridge**: Pub/sub session with reconnect backoff and a single-slot command mailbox
// - **OtaOrchestrator**: Single-flight firmware check/upgrade with throttled progress
// - **TickDispatcher**: Ticks the services in a fixed order and routes cloud commands
//
// ## Design Principles
//
// 1. **Capabilities, not libraries**: All I/O goes through the traits in [`traits`]
// 2. **Bounded calls**: Every network call inside a tick has its own timeout
// 3. **Plugin-Based**: DNS providers are registered in a [`ProviderRegistry`]
// 4. **Library-First**: The daemon is a thin wiring layer over this crate
// 5. **Stable codes**: Every failure carries a machine-readable code

pub mod bridge;
pub mod clock;
pub mod config;
pub mod ddns;
pub mod dispatcher;
pub mod error;
pub mod ota;
pub mod power;
pub mod registry;
pub mod store;
pub mod traits;
pub mod wake;

// Re-export core types for convenience
pub use bridge::{BridgeError, BridgeState, CloudBridge};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BemfaConfig, ComputerConfig, DdnsConfig, DdnsRecordConfig, OtaConfig, SystemConfig};
pub use ddns::{DdnsState, DdnsSynchronizer};
pub use dispatcher::{DispatchExit, SystemSnapshot, TickDispatcher};
pub use error::{Error, Result};
pub use ota::{OtaAction, OtaError, OtaOrchestrator, OtaState, OtaTrigger};
pub use power::{PowerAccepted, PowerError, PowerSequencer, PowerState};
pub use registry::ProviderRegistry;
pub use store::{ConfigRepository, FileStore, MemoryStore};
pub use traits::{AddressResolver, DnsRecordClient, KeyValueStore, PubSubClient};
