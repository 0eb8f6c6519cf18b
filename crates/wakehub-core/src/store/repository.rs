//! Typed config persistence on top of a [`KeyValueStore`]
//!
//! Every `load_*` returns the documented defaults for keys that were never
//! written and normalizes the result, so `save` followed by `load` yields the
//! normalized value field for field.
//!
//! ## Key layout
//!
//! | Config | Keys |
//! |---|---|
//! | Computer | `pc.ip`, `pc.mac`, `pc.port` |
//! | DDNS | `ddns.count`, `ddns.<i>.{enabled,provider,domain,user,pass,interval,local}` for `i < 5` |
//! | Bridge | `bemfa.{enabled,host,port,uid,key,topic}` |
//! | System | `sys.ota_version_code` |
//!
//! Booleans are stored as `"1"`/`"0"`.

use std::str::FromStr;
use std::sync::Arc;

use crate::Result;
use crate::config::{
    BemfaConfig, ComputerConfig, DdnsConfig, DdnsRecordConfig, MAX_DDNS_RECORDS, SystemConfig,
};
use crate::traits::KeyValueStore;

const KEY_PC_IP: &str = "pc.ip";
const KEY_PC_MAC: &str = "pc.mac";
const KEY_PC_PORT: &str = "pc.port";

const KEY_DDNS_COUNT: &str = "ddns.count";
const DDNS_SLOT_FIELDS: [&str; 7] = [
    "enabled", "provider", "domain", "user", "pass", "interval", "local",
];

const KEY_BEMFA_ENABLED: &str = "bemfa.enabled";
const KEY_BEMFA_HOST: &str = "bemfa.host";
const KEY_BEMFA_PORT: &str = "bemfa.port";
const KEY_BEMFA_UID: &str = "bemfa.uid";
const KEY_BEMFA_KEY: &str = "bemfa.key";
const KEY_BEMFA_TOPIC: &str = "bemfa.topic";

const KEY_SYS_OTA_VERSION_CODE: &str = "sys.ota_version_code";

fn slot_key(index: usize, field: &str) -> String {
    format!("ddns.{index}.{field}")
}

fn encode_bool(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Loads and saves the service configs
#[derive(Clone)]
pub struct ConfigRepository {
    store: Arc<dyn KeyValueStore>,
}

impl ConfigRepository {
    /// Create a repository over a store
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    async fn get_string(&self, key: &str) -> Result<String> {
        Ok(self.store.get(key).await?.unwrap_or_default())
    }

    async fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(match self.store.get(key).await?.as_deref().map(str::trim) {
            Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            _ => default,
        })
    }

    async fn get_number<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        let value = self.store.get(key).await?;
        Ok(match value {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Ignoring malformed value for {}: {:?}", key, raw);
                default
            }),
            None => default,
        })
    }

    /// Load the target computer config
    pub async fn load_computer_config(&self) -> Result<ComputerConfig> {
        let defaults = ComputerConfig::default();
        Ok(ComputerConfig {
            ip: self.get_string(KEY_PC_IP).await?,
            mac: self.get_string(KEY_PC_MAC).await?,
            port: self.get_number(KEY_PC_PORT, defaults.port).await?,
        }
        .normalized())
    }

    /// Save the target computer config
    pub async fn save_computer_config(&self, config: &ComputerConfig) -> Result<()> {
        let config = config.clone().normalized();
        self.store.set(KEY_PC_IP, &config.ip).await?;
        self.store.set(KEY_PC_MAC, &config.mac).await?;
        self.store.set(KEY_PC_PORT, &config.port.to_string()).await?;
        self.store.flush().await
    }

    /// Load the DDNS record list
    pub async fn load_ddns_config(&self) -> Result<DdnsConfig> {
        let count = self
            .get_number::<usize>(KEY_DDNS_COUNT, 0)
            .await?
            .min(MAX_DDNS_RECORDS);
        let defaults = DdnsRecordConfig::default();

        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            records.push(DdnsRecordConfig {
                enabled: self.get_bool(&slot_key(i, "enabled"), defaults.enabled).await?,
                provider: self.get_string(&slot_key(i, "provider")).await?,
                domain: self.get_string(&slot_key(i, "domain")).await?,
                username: self.get_string(&slot_key(i, "user")).await?,
                password: self.get_string(&slot_key(i, "pass")).await?,
                update_interval_seconds: self
                    .get_number(&slot_key(i, "interval"), defaults.update_interval_seconds)
                    .await?,
                use_local_ip: self.get_bool(&slot_key(i, "local"), defaults.use_local_ip).await?,
            });
        }

        Ok(DdnsConfig { records }.normalized())
    }

    /// Save the DDNS record list
    ///
    /// Slots at or beyond the new count are removed.
    pub async fn save_ddns_config(&self, config: &DdnsConfig) -> Result<()> {
        let config = config.clone().normalized();
        let count = config.records.len();

        self.store.set(KEY_DDNS_COUNT, &count.to_string()).await?;
        for (i, record) in config.records.iter().enumerate() {
            self.store.set(&slot_key(i, "enabled"), encode_bool(record.enabled)).await?;
            self.store.set(&slot_key(i, "provider"), &record.provider).await?;
            self.store.set(&slot_key(i, "domain"), &record.domain).await?;
            self.store.set(&slot_key(i, "user"), &record.username).await?;
            self.store.set(&slot_key(i, "pass"), &record.password).await?;
            self.store
                .set(&slot_key(i, "interval"), &record.update_interval_seconds.to_string())
                .await?;
            self.store.set(&slot_key(i, "local"), encode_bool(record.use_local_ip)).await?;
        }

        for i in count..MAX_DDNS_RECORDS {
            for field in DDNS_SLOT_FIELDS {
                self.store.remove(&slot_key(i, field)).await?;
            }
        }

        self.store.flush().await
    }

    /// Load the cloud bridge config
    pub async fn load_bemfa_config(&self) -> Result<BemfaConfig> {
        let defaults = BemfaConfig::default();
        Ok(BemfaConfig {
            enabled: self.get_bool(KEY_BEMFA_ENABLED, defaults.enabled).await?,
            host: self.get_string(KEY_BEMFA_HOST).await?,
            port: self.get_number(KEY_BEMFA_PORT, defaults.port).await?,
            uid: self.get_string(KEY_BEMFA_UID).await?,
            key: self.get_string(KEY_BEMFA_KEY).await?,
            topic: self.get_string(KEY_BEMFA_TOPIC).await?,
        }
        .normalized())
    }

    /// Save the cloud bridge config
    pub async fn save_bemfa_config(&self, config: &BemfaConfig) -> Result<()> {
        let config = config.clone().normalized();
        self.store.set(KEY_BEMFA_ENABLED, encode_bool(config.enabled)).await?;
        self.store.set(KEY_BEMFA_HOST, &config.host).await?;
        self.store.set(KEY_BEMFA_PORT, &config.port.to_string()).await?;
        self.store.set(KEY_BEMFA_UID, &config.uid).await?;
        self.store.set(KEY_BEMFA_KEY, &config.key).await?;
        self.store.set(KEY_BEMFA_TOPIC, &config.topic).await?;
        self.store.flush().await
    }

    /// Load device-wide settings
    pub async fn load_system_config(&self) -> Result<SystemConfig> {
        let defaults = SystemConfig::default();
        Ok(SystemConfig {
            ota_installed_version_code: self
                .get_number(KEY_SYS_OTA_VERSION_CODE, defaults.ota_installed_version_code)
                .await?,
        })
    }

    /// Save device-wide settings
    pub async fn save_system_config(&self, config: &SystemConfig) -> Result<()> {
        self.store
            .set(
                KEY_SYS_OTA_VERSION_CODE,
                &config.ota_installed_version_code.to_string(),
            )
            .await?;
        self.store.flush().await
    }
}

impl std::fmt::Debug for ConfigRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRepository").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn repo() -> (ConfigRepository, MemoryStore) {
        let store = MemoryStore::new();
        (ConfigRepository::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn empty_store_yields_defaults() {
        let (repo, _) = repo();
        assert_eq!(repo.load_computer_config().await.unwrap(), ComputerConfig::default());
        assert_eq!(repo.load_ddns_config().await.unwrap(), DdnsConfig::default());
        assert_eq!(repo.load_bemfa_config().await.unwrap(), BemfaConfig::default());
        assert_eq!(repo.load_system_config().await.unwrap().ota_installed_version_code, -1);
    }

    #[tokio::test]
    async fn shrinking_ddns_list_clears_stale_slots() {
        let (repo, store) = repo();
        let three = DdnsConfig::new(vec![
            DdnsRecordConfig::new("a.example.com", "id", "secret"),
            DdnsRecordConfig::new("b.example.com", "id", "secret"),
            DdnsRecordConfig::new("c.example.com", "id", "secret"),
        ]);
        repo.save_ddns_config(&three).await.unwrap();
        assert!(store.get("ddns.2.domain").await.unwrap().is_some());

        let one = DdnsConfig::new(vec![DdnsRecordConfig::new("a.example.com", "id", "secret")]);
        repo.save_ddns_config(&one).await.unwrap();

        let keys = store.keys().await.unwrap();
        assert!(keys.iter().all(|k| !k.starts_with("ddns.1.") && !k.starts_with("ddns.2.")));
        assert_eq!(repo.load_ddns_config().await.unwrap(), one);
    }

    #[tokio::test]
    async fn malformed_numbers_fall_back_to_defaults() {
        let (repo, store) = repo();
        store.set("pc.port", "not-a-port").await.unwrap();
        store.set("bemfa.port", "99999").await.unwrap();
        store.set("ddns.count", "many").await.unwrap();

        assert_eq!(repo.load_computer_config().await.unwrap().port, 3389);
        assert_eq!(repo.load_bemfa_config().await.unwrap().port, 9501);
        assert!(repo.load_ddns_config().await.unwrap().records.is_empty());
    }
}
