//! DDNS synchronizer
//!
//! Keeps up to five DNS records pointed at the device's address. Each record
//! gets its own provider client and its own due timer; a record is synced on
//! its first tick with connectivity and then once per configured interval,
//! whatever the outcome of the previous attempt.
//!
//! ## Event Flow (per due record)
//!
//! 1. Resolve the local or public address
//! 2. `DnsRecordClient::sync()` against the provider
//! 3. `Updated`/`Created` → [`DdnsSynchronizer::on_record_updated`]
//! 4. Advance the due timer by the record interval

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, deadline_reached};
use crate::config::{DdnsConfig, DdnsRecordConfig};
use crate::registry::ProviderRegistry;
use crate::traits::{AddressResolver, AddressScope, DnsRecordClient, UpdateResult};

/// Code reported when no client could be built for a record
pub const PROVIDER_UNAVAILABLE: &str = "provider_unavailable";

/// Per-record (and aggregate) synchronizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DdnsState {
    /// Record disabled (aggregate: no enabled record)
    #[default]
    Disabled,
    /// Enabled but missing domain or credentials
    WaitConfig,
    /// Waiting for connectivity
    WaitWifi,
    /// Configured, waiting for the next due time
    Ready,
    /// Sync in progress (aggregate: at least one record active)
    Running,
    /// Last sync changed the record
    Updated,
    /// Last sync failed
    Error,
}

impl DdnsState {
    /// Upper-case state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::WaitConfig => "WAIT_CONFIG",
            Self::WaitWifi => "WAIT_WIFI",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Updated => "UPDATED",
            Self::Error => "ERROR",
        }
    }
}

/// Runtime view of one configured record
struct RuntimeRecord {
    config: DdnsRecordConfig,
    client: Option<Box<dyn DnsRecordClient>>,
    state: DdnsState,
    message: String,
    last_old_ip: String,
    last_new_ip: String,
    update_count: u32,
    last_update: Option<DateTime<Utc>>,
    first_sync_pending: bool,
    next_due: Option<u32>,
}

impl RuntimeRecord {
    fn build(config: DdnsRecordConfig, registry: &ProviderRegistry) -> Self {
        let mut record = Self {
            config,
            client: None,
            state: DdnsState::Disabled,
            message: String::new(),
            last_old_ip: String::new(),
            last_new_ip: String::new(),
            update_count: 0,
            last_update: None,
            first_sync_pending: true,
            next_due: None,
        };

        if !record.config.enabled {
            record.message = "disabled".to_string();
        } else if !record.config.is_configured() {
            record.state = DdnsState::WaitConfig;
            record.message = "domain and credentials required".to_string();
        } else {
            match registry.create_client(&record.config) {
                Ok(client) => {
                    record.client = Some(client);
                    record.state = DdnsState::Ready;
                    record.message = "waiting for first sync".to_string();
                }
                Err(e) => {
                    warn!("No DNS client for {}: {}", record.config.domain, e);
                    record.state = DdnsState::Error;
                    record.message = format!("{}: {}", PROVIDER_UNAVAILABLE, e);
                }
            }
        }
        record
    }

    fn interval_ms(&self) -> u32 {
        self.config.update_interval_seconds.saturating_mul(1000)
    }
}

/// Outcome of one attempt on a due record
enum SyncOutcome {
    Written { old: String, new: IpAddr },
    Unchanged(IpAddr),
    Failed(String),
}

async fn sync_record(resolver: &dyn AddressResolver, record: &mut RuntimeRecord) -> SyncOutcome {
    let scope = AddressScope::from_use_local(record.config.use_local_ip);
    let ip = match resolver.resolve(scope).await {
        Ok(ip) => ip,
        Err(e) => return SyncOutcome::Failed(format!("address lookup failed: {}", e)),
    };

    let Some(client) = record.client.as_mut() else {
        return SyncOutcome::Failed(PROVIDER_UNAVAILABLE.to_string());
    };

    match client.sync(ip).await {
        Ok(UpdateResult::Updated { previous_ip, new_ip }) => SyncOutcome::Written {
            old: previous_ip.map(|ip| ip.to_string()).unwrap_or_default(),
            new: new_ip,
        },
        Ok(UpdateResult::Created { new_ip }) => SyncOutcome::Written {
            old: String::new(),
            new: new_ip,
        },
        Ok(UpdateResult::Unchanged { current_ip }) => SyncOutcome::Unchanged(current_ip),
        Err(e) => SyncOutcome::Failed(e.to_string()),
    }
}

/// Status of one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdnsRecordStatus {
    pub index: usize,
    pub enabled: bool,
    pub provider: String,
    pub domain: String,
    pub use_local_ip: bool,
    pub update_interval_seconds: u32,
    pub state: String,
    pub message: String,
    pub last_old_ip: String,
    pub last_new_ip: String,
    pub update_count: u32,
    /// RFC 3339
    pub last_update: Option<String>,
    pub next_sync_in_secs: Option<u32>,
    pub record_id_cached: bool,
}

/// Aggregate synchronizer status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdnsStatus {
    pub state: String,
    pub message: String,
    pub update_count: u32,
    pub records: Vec<DdnsRecordStatus>,
}

/// DDNS synchronizer
pub struct DdnsSynchronizer {
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn AddressResolver>,
    registry: Arc<ProviderRegistry>,
    config: DdnsConfig,
    records: Vec<RuntimeRecord>,
    state: DdnsState,
    message: String,
    update_count: u32,
}

impl DdnsSynchronizer {
    /// Create a synchronizer with no records
    pub fn new(
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn AddressResolver>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            clock,
            resolver,
            registry,
            config: DdnsConfig::default(),
            records: Vec::new(),
            state: DdnsState::Disabled,
            message: "no records".to_string(),
            update_count: 0,
        }
    }

    /// Current normalized config
    pub fn config(&self) -> &DdnsConfig {
        &self.config
    }

    /// Aggregate state
    pub fn state(&self) -> DdnsState {
        self.state
    }

    /// State of record `index`
    pub fn record_state(&self, index: usize) -> Option<DdnsState> {
        self.records.get(index).map(|r| r.state)
    }

    /// Replace the record list
    ///
    /// Every runtime record is rebuilt, including ones whose config did not
    /// change, so cached provider record ids and due timers start over.
    pub fn update_config(&mut self, config: DdnsConfig) {
        self.config = config.normalized();
        self.records = self
            .config
            .records
            .iter()
            .cloned()
            .map(|record| RuntimeRecord::build(record, &self.registry))
            .collect();

        let (state, message) = self.classify(None);
        self.state = state;
        self.message = message;
        info!(
            "DDNS config applied: {} record(s), state {}",
            self.records.len(),
            self.state.name()
        );
    }

    /// Aggregate classification; `wifi` is `None` before the first tick
    fn classify(&self, wifi: Option<bool>) -> (DdnsState, String) {
        let enabled = self.records.iter().filter(|r| r.config.enabled).count();
        let configured = self.records.iter().filter(|r| r.config.is_configured()).count();

        if enabled == 0 {
            (DdnsState::Disabled, "no enabled record".to_string())
        } else if configured == 0 {
            (DdnsState::WaitConfig, "no record has domain and credentials".to_string())
        } else {
            match wifi {
                Some(false) => (DdnsState::WaitWifi, "waiting for WiFi".to_string()),
                Some(true) => (
                    DdnsState::Running,
                    format!("{} of {} record(s) active", configured, self.records.len()),
                ),
                None => (DdnsState::Ready, format!("{} record(s) ready", configured)),
            }
        }
    }

    /// Sync every due record
    pub async fn tick(&mut self, wifi_connected: bool) {
        let (state, message) = self.classify(Some(wifi_connected));
        if self.state != state {
            debug!("DDNS state {} -> {}", self.state.name(), state.name());
        }
        self.state = state;
        self.message = message;

        for index in 0..self.records.len() {
            self.tick_record(index, wifi_connected).await;
        }
    }

    async fn tick_record(&mut self, index: usize, wifi_connected: bool) {
        let now = self.clock.now_ms();
        let resolver = Arc::clone(&self.resolver);
        let Some(record) = self.records.get_mut(index) else {
            return;
        };

        if !record.config.is_configured() || record.client.is_none() {
            return;
        }

        if !wifi_connected {
            if record.state != DdnsState::WaitWifi {
                record.state = DdnsState::WaitWifi;
                record.message = "waiting for WiFi".to_string();
            }
            return;
        }

        let next_due = *record.next_due.get_or_insert(now);
        let due = record.first_sync_pending || deadline_reached(now, next_due);
        if !due {
            if record.state == DdnsState::WaitWifi {
                record.state = DdnsState::Ready;
                record.message = "waiting for next sync".to_string();
            }
            return;
        }

        record.state = DdnsState::Running;
        record.message = "sync in progress".to_string();
        debug!("Syncing DDNS record {}", record.config.domain);

        let outcome = sync_record(resolver.as_ref(), record).await;

        record.first_sync_pending = false;
        record.next_due = Some(now.wrapping_add(record.interval_ms()));

        match outcome {
            SyncOutcome::Written { old, new } => {
                self.on_record_updated(index, &old, &new.to_string());
            }
            SyncOutcome::Unchanged(ip) => {
                record.state = DdnsState::Ready;
                record.message = format!("no change ({})", ip);
                record.last_new_ip = ip.to_string();
                debug!("DDNS record {} already at {}", record.config.domain, ip);
            }
            SyncOutcome::Failed(message) => {
                warn!("DDNS sync failed for {}: {}", record.config.domain, message);
                record.state = DdnsState::Error;
                record.message = message;
            }
        }
    }

    /// Apply a confirmed provider write to record `index`
    pub fn on_record_updated(&mut self, index: usize, old_ip: &str, new_ip: &str) {
        let Some(record) = self.records.get_mut(index) else {
            return;
        };
        let old_text = if old_ip.is_empty() { "(none)" } else { old_ip };

        record.state = DdnsState::Updated;
        record.message = format!("{} -> {}", old_text, new_ip);
        record.last_old_ip = old_ip.to_string();
        record.last_new_ip = new_ip.to_string();
        record.update_count += 1;
        record.last_update = Some(Utc::now());
        self.update_count += 1;

        info!(
            "DDNS record {} updated: {} -> {}",
            record.config.domain, old_text, new_ip
        );
    }

    /// Status snapshot
    pub fn status(&self) -> DdnsStatus {
        let now = self.clock.now_ms();
        let records = self
            .records
            .iter()
            .enumerate()
            .map(|(index, r)| DdnsRecordStatus {
                index,
                enabled: r.config.enabled,
                provider: r.config.provider.clone(),
                domain: r.config.domain.clone(),
                use_local_ip: r.config.use_local_ip,
                update_interval_seconds: r.config.update_interval_seconds,
                state: r.state.name().to_string(),
                message: r.message.clone(),
                last_old_ip: r.last_old_ip.clone(),
                last_new_ip: r.last_new_ip.clone(),
                update_count: r.update_count,
                last_update: r.last_update.map(|t| t.to_rfc3339()),
                next_sync_in_secs: r.next_due.filter(|_| !r.first_sync_pending).map(|due| {
                    if deadline_reached(now, due) {
                        0
                    } else {
                        due.wrapping_sub(now).div_ceil(1000)
                    }
                }),
                record_id_cached: r
                    .client
                    .as_ref()
                    .is_some_and(|c| c.cached_record_id().is_some()),
            })
            .collect();

        DdnsStatus {
            state: self.state.name().to_string(),
            message: self.message.clone(),
            update_count: self.update_count,
            records,
        }
    }
}

impl std::fmt::Debug for DdnsSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DdnsSynchronizer")
            .field("state", &self.state)
            .field("records", &self.records.len())
            .field("update_count", &self.update_count)
            .finish_non_exhaustive()
    }
}
