//! Configuration types for the wakehub services
//!
//! Every config struct has documented defaults and a `normalized()` function.
//! Services normalize on `update_config` and the config repository normalizes
//! on load, so a save/load round-trip always yields the normalized value.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Probe port used when the computer config leaves it unset (RDP)
pub const DEFAULT_PROBE_PORT: u16 = 3389;

/// Maximum number of DDNS records held by the synchronizer
pub const MAX_DDNS_RECORDS: usize = 5;

/// Only provider currently supported by the DDNS synchronizer
pub const DEFAULT_DDNS_PROVIDER: &str = "aliyun";

/// Lower bound of a DDNS record update interval
pub const MIN_DDNS_INTERVAL_SECS: u32 = 30;

/// Upper bound of a DDNS record update interval
pub const MAX_DDNS_INTERVAL_SECS: u32 = 86_400;

/// Interval used when a configured value is out of bounds
pub const DEFAULT_DDNS_INTERVAL_SECS: u32 = 300;

/// Default cloud broker host
pub const DEFAULT_BEMFA_HOST: &str = "bemfa.com";

/// Default cloud broker port
pub const DEFAULT_BEMFA_PORT: u16 = 9501;

/// Target computer to wake and probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputerConfig {
    /// Target IPv4 address (string as entered on the console)
    pub ip: String,

    /// Target MAC address, colon/dash/space separated or bare hex
    pub mac: String,

    /// TCP port probed to detect that the host is up
    pub port: u16,
}

impl ComputerConfig {
    /// Create a computer config
    pub fn new(ip: impl Into<String>, mac: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            mac: mac.into(),
            port,
        }
        .normalized()
    }

    /// Trim strings and replace an unset port with [`DEFAULT_PROBE_PORT`]
    pub fn normalized(mut self) -> Self {
        self.ip = self.ip.trim().to_string();
        self.mac = self.mac.trim().to_string();
        if self.port == 0 {
            self.port = DEFAULT_PROBE_PORT;
        }
        self
    }

    /// Parsed target address, if the configured string is a valid IPv4
    pub fn parsed_ip(&self) -> Option<Ipv4Addr> {
        self.ip.trim().parse().ok()
    }

    /// Port to probe, falling back to RDP when unset
    pub fn probe_port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_PROBE_PORT
        } else {
            self.port
        }
    }
}

impl Default for ComputerConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            mac: String::new(),
            port: DEFAULT_PROBE_PORT,
        }
    }
}

/// Clamp an update interval to the supported range
///
/// Values outside `[30, 86400]` are replaced by the default (300), not
/// clamped to the nearest bound.
pub fn normalize_interval_secs(secs: u32) -> u32 {
    if (MIN_DDNS_INTERVAL_SECS..=MAX_DDNS_INTERVAL_SECS).contains(&secs) {
        secs
    } else {
        DEFAULT_DDNS_INTERVAL_SECS
    }
}

/// One dynamic DNS record
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdnsRecordConfig {
    /// Whether this record is synchronized
    pub enabled: bool,

    /// Provider id (forced to [`DEFAULT_DDNS_PROVIDER`])
    pub provider: String,

    /// Full domain name, e.g. `home.example.com`
    pub domain: String,

    /// Provider access-key id
    pub username: String,

    /// Provider access-key secret
    /// ⚠️ NEVER log this value
    pub password: String,

    /// Seconds between sync attempts
    pub update_interval_seconds: u32,

    /// Publish the local interface address instead of the public one
    pub use_local_ip: bool,
}

impl DdnsRecordConfig {
    /// Create an enabled record with the default provider and interval
    pub fn new(
        domain: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            enabled: true,
            domain: domain.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
        .normalized()
    }

    /// Set the update interval (normalized)
    pub fn with_interval(mut self, secs: u32) -> Self {
        self.update_interval_seconds = normalize_interval_secs(secs);
        self
    }

    /// Choose between local and public address
    pub fn with_local_ip(mut self, use_local_ip: bool) -> Self {
        self.use_local_ip = use_local_ip;
        self
    }

    /// Enable or disable the record
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Trim strings, normalize the interval and force the provider id
    pub fn normalized(mut self) -> Self {
        self.provider = DEFAULT_DDNS_PROVIDER.to_string();
        self.domain = self.domain.trim().to_string();
        self.username = self.username.trim().to_string();
        self.password = self.password.trim().to_string();
        self.update_interval_seconds = normalize_interval_secs(self.update_interval_seconds);
        self
    }

    /// Enabled and every credential field present
    pub fn is_configured(&self) -> bool {
        self.enabled
            && !self.domain.is_empty()
            && !self.username.is_empty()
            && !self.password.is_empty()
    }
}

impl Default for DdnsRecordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: DEFAULT_DDNS_PROVIDER.to_string(),
            domain: String::new(),
            username: String::new(),
            password: String::new(),
            update_interval_seconds: DEFAULT_DDNS_INTERVAL_SECS,
            use_local_ip: false,
        }
    }
}

// Hides the access-key secret
impl std::fmt::Debug for DdnsRecordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DdnsRecordConfig")
            .field("enabled", &self.enabled)
            .field("provider", &self.provider)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("update_interval_seconds", &self.update_interval_seconds)
            .field("use_local_ip", &self.use_local_ip)
            .finish()
    }
}

/// Ordered list of DDNS records (display order only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdnsConfig {
    /// Records, at most [`MAX_DDNS_RECORDS`]
    pub records: Vec<DdnsRecordConfig>,
}

impl DdnsConfig {
    /// Create a config from records (normalized)
    pub fn new(records: Vec<DdnsRecordConfig>) -> Self {
        Self { records }.normalized()
    }

    /// Normalize every record and drop records beyond the slot limit
    pub fn normalized(mut self) -> Self {
        self.records.truncate(MAX_DDNS_RECORDS);
        self.records = self
            .records
            .into_iter()
            .map(DdnsRecordConfig::normalized)
            .collect();
        self
    }
}

/// Cloud command bridge (pub/sub broker) configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BemfaConfig {
    /// Whether the bridge should connect at all
    pub enabled: bool,

    /// Broker host
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Account uid, used as the primary client identity
    pub uid: String,

    /// Optional key, used as the password for the fallback login
    /// ⚠️ NEVER log this value
    pub key: String,

    /// Base topic (trailing slashes stripped)
    pub topic: String,
}

impl BemfaConfig {
    /// Create an enabled bridge config with the default broker
    pub fn new(uid: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            enabled: true,
            uid: uid.into(),
            topic: topic.into(),
            ..Self::default()
        }
        .normalized()
    }

    /// Set the fallback key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into().trim().to_string();
        self
    }

    /// Trim fields, strip trailing slashes from the topic and default host/port
    pub fn normalized(mut self) -> Self {
        self.host = self.host.trim().to_string();
        if self.host.is_empty() {
            self.host = DEFAULT_BEMFA_HOST.to_string();
        }
        if self.port == 0 {
            self.port = DEFAULT_BEMFA_PORT;
        }
        self.uid = self.uid.trim().to_string();
        self.key = self.key.trim().to_string();
        self.topic = self.topic.trim().trim_end_matches('/').to_string();
        self
    }

    /// uid and topic are both present
    pub fn is_configured(&self) -> bool {
        !self.uid.is_empty() && !self.topic.is_empty()
    }

    /// Canonical command topic (`<topic>/set`)
    pub fn subscribe_topic(&self) -> String {
        format!("{}/set", self.topic)
    }

    /// Legacy command topic (bare `<topic>`)
    pub fn legacy_topic(&self) -> String {
        self.topic.clone()
    }

    /// Status topic (`<topic>/up`)
    pub fn publish_topic(&self) -> String {
        format!("{}/up", self.topic)
    }
}

impl Default for BemfaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: DEFAULT_BEMFA_HOST.to_string(),
            port: DEFAULT_BEMFA_PORT,
            uid: String::new(),
            key: String::new(),
            topic: String::new(),
        }
    }
}

// Hides the broker key
impl std::fmt::Debug for BemfaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BemfaConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("uid", &self.uid)
            .field("key", &if self.key.is_empty() { "" } else { "<REDACTED>" })
            .field("topic", &self.topic)
            .finish()
    }
}

/// Device-wide persisted settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Installed firmware version code, `-1` when unknown
    pub ota_installed_version_code: i32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            ota_installed_version_code: -1,
        }
    }
}

/// Firmware upgrade orchestrator settings (supplied at startup, not persisted)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaConfig {
    /// Remote metadata endpoint; empty means "not configured"
    pub metadata_url: String,

    /// Minutes between automatic checks, 0 disables auto-check
    pub auto_check_interval_minutes: u32,
}

impl OtaConfig {
    /// Create an OTA config
    pub fn new(metadata_url: impl Into<String>, auto_check_interval_minutes: u32) -> Self {
        Self {
            metadata_url: metadata_url.into(),
            auto_check_interval_minutes,
        }
        .normalized()
    }

    /// Trim the metadata URL
    pub fn normalized(mut self) -> Self {
        self.metadata_url = self.metadata_url.trim().to_string();
        self
    }

    /// A metadata endpoint is configured
    pub fn is_configured(&self) -> bool {
        !self.metadata_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_outside_bounds_falls_back_to_default() {
        for secs in [0, 1, 29, 86_401, u32::MAX] {
            assert_eq!(normalize_interval_secs(secs), DEFAULT_DDNS_INTERVAL_SECS, "{secs}");
        }
        for secs in [30, 300, 3_600, 86_400] {
            assert_eq!(normalize_interval_secs(secs), secs);
        }
    }

    #[test]
    fn ddns_record_normalization_forces_provider_and_trims() {
        let record = DdnsRecordConfig {
            enabled: true,
            provider: "cloudflare".to_string(),
            domain: "  home.example.com ".to_string(),
            username: " id ".to_string(),
            password: " secret\n".to_string(),
            update_interval_seconds: 5,
            use_local_ip: true,
        }
        .normalized();

        assert_eq!(record.provider, "aliyun");
        assert_eq!(record.domain, "home.example.com");
        assert_eq!(record.username, "id");
        assert_eq!(record.password, "secret");
        assert_eq!(record.update_interval_seconds, 300);
        assert!(record.is_configured());
    }

    #[test]
    fn ddns_config_keeps_at_most_five_records() {
        let records = (0..7)
            .map(|i| DdnsRecordConfig::new(format!("r{i}.example.com"), "id", "secret"))
            .collect();
        let config = DdnsConfig::new(records);
        assert_eq!(config.records.len(), MAX_DDNS_RECORDS);
        assert_eq!(config.records[4].domain, "r4.example.com");
    }

    #[test]
    fn bemfa_topics_strip_trailing_slash() {
        let config = BemfaConfig::new("uid123", "esp32_topic/");
        assert_eq!(config.subscribe_topic(), "esp32_topic/set");
        assert_eq!(config.legacy_topic(), "esp32_topic");
        assert_eq!(config.publish_topic(), "esp32_topic/up");
    }

    #[test]
    fn bemfa_blank_host_and_zero_port_get_defaults() {
        let config = BemfaConfig {
            host: "   ".to_string(),
            port: 0,
            ..BemfaConfig::default()
        }
        .normalized();
        assert_eq!(config.host, "bemfa.com");
        assert_eq!(config.port, 9501);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let record = DdnsRecordConfig::new("a.example.com", "id", "top-secret");
        assert!(!format!("{record:?}").contains("top-secret"));

        let bridge = BemfaConfig::new("uid", "topic").with_key("hidden-key");
        assert!(!format!("{bridge:?}").contains("hidden-key"));
    }

    #[test]
    fn computer_config_defaults_probe_port() {
        let config = ComputerConfig::new(" 192.168.1.20 ", "AA:BB:CC:DD:EE:FF", 0);
        assert_eq!(config.port, DEFAULT_PROBE_PORT);
        assert_eq!(config.parsed_ip(), Some(Ipv4Addr::new(192, 168, 1, 20)));
    }
}
