// # Alibaba Cloud DNS Provider
//
// Signing client for one DNS record on Alibaba Cloud DNS (alidns).
//
// ## Request flow
//
// - First `describe`: `DescribeSubDomainRecords` discovers the record and
//   caches its `RecordId`
// - Later `describe`: `DescribeDomainRecordInfo` by cached id, value only
// - `sync`: describe, then `UpdateDomainRecord` if the value differs, or
//   `AddDomainRecord` if there is no record yet
//
// Every request is a GET signed with RPC signature v1.0 (see [`sign`]).
//
// ## Trust Level: Untrusted (DNS Provider)
//
// - ✅ HTTPS calls to the alidns endpoint, one bounded call at a time
// - ✅ Caches the record id of its own record
// - ❌ No retries, backoff or background tasks (the synchronizer schedules)
//
// ## Security Requirements
//
// - The access key secret NEVER appears in logs or `Debug` output
// - Creation fails fast if either credential is empty
//
// ## API Reference
//
// - https://help.aliyun.com/document_detail/29745.html (signature)
// - DescribeSubDomainRecords / DescribeDomainRecordInfo / UpdateDomainRecord / AddDomainRecord

pub mod sign;
pub mod types;

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use wakehub_core::config::DdnsRecordConfig;
use wakehub_core::traits::{DnsProviderFactory, DnsRecordClient, HttpClient, RecordMetadata, UpdateResult};
use wakehub_core::{Error, ProviderRegistry, Result};

use types::{DescribeSubDomainRecordsResponse, DomainRecord, ErrorBody, RecordIdResponse};

/// Provider id used in record configs
pub const PROVIDER_NAME: &str = "aliyun";

/// Alibaba Cloud DNS API endpoint
pub const ALIDNS_ENDPOINT: &str = "https://alidns.aliyuncs.com/";

/// API version all actions are issued against
const API_VERSION: &str = "2015-01-09";

/// Timeout of each signed request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Split `domain` into `(rr, root)`
///
/// `example.com` → `("@", "example.com")`,
/// `home.example.com` → `("home", "example.com")`.
pub fn split_domain(domain: &str) -> Result<(String, String)> {
    let domain = domain.trim().trim_end_matches('.');
    match domain.split_once('.') {
        None => Err(Error::invalid_input(format!("Domain has no dot: {:?}", domain))),
        Some((first, rest)) if first.is_empty() || rest.is_empty() => {
            Err(Error::invalid_input(format!("Malformed domain: {:?}", domain)))
        }
        Some((first, rest)) => {
            if rest.contains('.') {
                Ok((first.to_string(), rest.to_string()))
            } else {
                Ok(("@".to_string(), domain.to_string()))
            }
        }
    }
}

fn record_type(ip: IpAddr) -> &'static str {
    match ip {
        IpAddr::V4(_) => "A",
        IpAddr::V6(_) => "AAAA",
    }
}

/// Client for one Alibaba Cloud DNS record
pub struct AliyunRecordClient {
    http: Arc<dyn HttpClient>,
    /// ⚠️ NEVER log this value
    access_key_secret: String,
    access_key_id: String,
    domain: String,
    rr: String,
    root: String,
    endpoint: String,
    record_id: Option<String>,
}

// Custom Debug implementation that hides the secret
impl std::fmt::Debug for AliyunRecordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliyunRecordClient")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("rr", &self.rr)
            .field("root", &self.root)
            .field("record_id", &self.record_id)
            .finish()
    }
}

impl AliyunRecordClient {
    /// Create a client for `domain`
    ///
    /// Fails if a credential is empty or the domain cannot be split.
    pub fn new(
        http: Arc<dyn HttpClient>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        domain: impl Into<String>,
    ) -> Result<Self> {
        let access_key_id = access_key_id.into();
        let access_key_secret = access_key_secret.into();
        if access_key_id.is_empty() || access_key_secret.is_empty() {
            return Err(Error::config("Aliyun access key id and secret are required"));
        }
        let domain = domain.into();
        let (rr, root) = split_domain(&domain)?;

        Ok(Self {
            http,
            access_key_secret,
            access_key_id,
            domain,
            rr,
            root,
            endpoint: ALIDNS_ENDPOINT.to_string(),
            record_id: None,
        })
    }

    /// Point the client at another endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Resource record part of the domain (`@` for the apex)
    pub fn rr(&self) -> &str {
        &self.rr
    }

    /// Root domain the record lives in
    pub fn root(&self) -> &str {
        &self.root
    }

    fn common_params(&self, action: &str) -> Vec<(String, String)> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        vec![
            ("AccessKeyId".to_string(), self.access_key_id.clone()),
            ("Action".to_string(), action.to_string()),
            ("Format".to_string(), "JSON".to_string()),
            ("SignatureMethod".to_string(), "HMAC-SHA1".to_string()),
            ("SignatureNonce".to_string(), uuid::Uuid::new_v4().to_string()),
            ("SignatureVersion".to_string(), "1.0".to_string()),
            ("Timestamp".to_string(), timestamp),
            ("Version".to_string(), API_VERSION.to_string()),
        ]
    }

    /// Issue one signed GET and return the body on HTTP 200
    async fn call(&self, action: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut all = self.common_params(action);
        all.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let query = sign::signed_query("GET", &all, &self.access_key_secret);
        let url = format!("{}?{}", self.endpoint, query);

        debug!("Aliyun {} for {}", action, self.domain);
        let response = self.http.get(&url, REQUEST_TIMEOUT).await?;
        if response.is_ok() {
            return Ok(response.body);
        }
        Err(map_error_response(action, response.status, &response.body))
    }

    async fn discover(&mut self, ip_hint: IpAddr) -> Result<DomainRecord> {
        let record_type = record_type(ip_hint);
        let body = self
            .call(
                "DescribeSubDomainRecords",
                &[("SubDomain", self.domain.as_str()), ("Type", record_type)],
            )
            .await?;
        let parsed: DescribeSubDomainRecordsResponse = serde_json::from_str(&body)?;

        let record = parsed
            .domain_records
            .record
            .into_iter()
            .find(|r| r.rr == self.rr && r.record_type == record_type)
            .ok_or_else(|| Error::not_found(format!("{} record {}", record_type, self.domain)))?;

        info!("Discovered Aliyun record {} for {}", record.record_id, self.domain);
        self.record_id = Some(record.record_id.clone());
        Ok(record)
    }

    async fn describe_cached(&mut self, record_id: String) -> Result<DomainRecord> {
        let result = self
            .call("DescribeDomainRecordInfo", &[("RecordId", record_id.as_str())])
            .await
            .and_then(|body| serde_json::from_str::<DomainRecord>(&body).map_err(Error::from));
        if result.is_err() {
            // The record may have been deleted; rediscover next time
            self.record_id = None;
        }
        result
    }

    fn to_metadata(&self, record: DomainRecord) -> Result<RecordMetadata> {
        let ip: IpAddr = record.value.parse().map_err(|_| {
            Error::provider(
                PROVIDER_NAME,
                format!("Record {} holds a non-address value: {}", record.record_id, record.value),
            )
        })?;
        Ok(RecordMetadata {
            id: record.record_id,
            name: self.domain.clone(),
            ip,
            ttl: record.ttl,
        })
    }

    async fn update(&self, record_id: &str, ip: IpAddr) -> Result<()> {
        let value = ip.to_string();
        let body = self
            .call(
                "UpdateDomainRecord",
                &[
                    ("RecordId", record_id),
                    ("RR", self.rr.as_str()),
                    ("Type", record_type(ip)),
                    ("Value", value.as_str()),
                ],
            )
            .await?;
        let _: RecordIdResponse = serde_json::from_str(&body)?;
        Ok(())
    }

    async fn create(&mut self, ip: IpAddr) -> Result<()> {
        let value = ip.to_string();
        let body = self
            .call(
                "AddDomainRecord",
                &[
                    ("DomainName", self.root.as_str()),
                    ("RR", self.rr.as_str()),
                    ("Type", record_type(ip)),
                    ("Value", value.as_str()),
                ],
            )
            .await?;
        let created: RecordIdResponse = serde_json::from_str(&body)?;
        self.record_id = Some(created.record_id);
        Ok(())
    }
}

/// Map a non-200 response to an error
///
/// Alibaba Cloud returns `{"Code": ..., "Message": ...}` for API errors; the
/// status decides the wording when the body is not an error document.
fn map_error_response(action: &str, status: u16, body: &str) -> Error {
    if let Ok(err) = serde_json::from_str::<ErrorBody>(body) {
        return Error::provider(PROVIDER_NAME, format!("{}: {}", err.code, err.message));
    }
    let message = match status {
        401 | 403 => format!("Authentication failed: {} rejected with status {}", action, status),
        404 => format!("{} not found: status {}", action, status),
        429 => format!("Rate limit exceeded: status {}", status),
        500..=599 => format!("Aliyun server error (transient): {} - {}", status, body),
        _ => format!("{} failed: {} - {}", action, status, body),
    };
    Error::provider(PROVIDER_NAME, message)
}

#[async_trait]
impl DnsRecordClient for AliyunRecordClient {
    async fn sync(&mut self, ip: IpAddr) -> Result<UpdateResult> {
        match self.describe(ip).await {
            Ok(current) if current.ip == ip => {
                debug!("{} already points at {}", self.domain, ip);
                Ok(UpdateResult::Unchanged { current_ip: ip })
            }
            Ok(current) => {
                self.update(&current.id, ip).await?;
                info!("Updated {} from {} to {}", self.domain, current.ip, ip);
                Ok(UpdateResult::Updated {
                    previous_ip: Some(current.ip),
                    new_ip: ip,
                })
            }
            Err(Error::NotFound(_)) => {
                self.create(ip).await?;
                info!("Created {} record {} -> {}", record_type(ip), self.domain, ip);
                Ok(UpdateResult::Created { new_ip: ip })
            }
            Err(e) => Err(e),
        }
    }

    async fn describe(&mut self, ip_hint: IpAddr) -> Result<RecordMetadata> {
        let record = match self.record_id.clone() {
            Some(id) => self.describe_cached(id).await?,
            None => self.discover(ip_hint).await?,
        };
        self.to_metadata(record)
    }

    fn cached_record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for Alibaba Cloud record clients
///
/// The record's `username` is the AccessKey id and `password` the secret.
pub struct AliyunFactory {
    http: Arc<dyn HttpClient>,
}

impl AliyunFactory {
    /// Factory sharing one HTTP client across records
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

impl DnsProviderFactory for AliyunFactory {
    fn create(&self, record: &DdnsRecordConfig) -> Result<Box<dyn DnsRecordClient>> {
        let client = AliyunRecordClient::new(
            Arc::clone(&self.http),
            record.username.clone(),
            record.password.clone(),
            record.domain.clone(),
        )?;
        Ok(Box::new(client))
    }
}

/// Register the Alibaba Cloud provider with a registry
pub fn register(registry: &mut ProviderRegistry, http: Arc<dyn HttpClient>) {
    registry.register_provider(PROVIDER_NAME, Box::new(AliyunFactory::new(http)));
}
