//! Test doubles and common utilities for the service contract tests
//!
//! Every double keeps its observable state behind an `Arc`, so a test can
//! hand one clone to the service and keep another to script and inspect it.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wakehub_core::clock::{Clock, ManualClock};
use wakehub_core::config::DdnsRecordConfig;
use wakehub_core::error::{Error, Result};
use wakehub_core::traits::{
    AddressResolver, AddressScope, ConnectOptions, DnsProviderFactory, DnsRecordClient,
    FirmwarePackageInfo, FirmwareUpdater, HostProber, HttpClient, HttpResponse, InboundMessage,
    LinkMonitor, PubSubClient, RecordMetadata, TransferProgress, UpdateResult, WakeSender,
};
use wakehub_core::wake::{WakeError, parse_mac};

/// A manual clock plus the trait-object view services take
pub fn manual_clock(start_ms: u32) -> (Arc<ManualClock>, Arc<dyn Clock>) {
    let clock = Arc::new(ManualClock::new(start_ms));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    (clock, dyn_clock)
}

// ===== Wake sender =====

/// Counts packets; validates the MAC like the real sender
#[derive(Default)]
pub struct CountingWakeSender {
    sent: AtomicUsize,
    fail_send: AtomicBool,
    macs: Mutex<Vec<String>>,
}

impl CountingWakeSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub fn macs(&self) -> Vec<String> {
        self.macs.lock().unwrap().clone()
    }
}

#[async_trait]
impl WakeSender for CountingWakeSender {
    async fn send_magic_packet(&self, mac: &str) -> std::result::Result<(), WakeError> {
        parse_mac(mac)?;
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(WakeError::SendFailed("scripted failure".to_string()));
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.macs.lock().unwrap().push(mac.to_string());
        Ok(())
    }
}

// ===== Host prober =====

/// Answers with a settable flag
#[derive(Default)]
pub struct SwitchProber {
    up: AtomicBool,
    probes: AtomicUsize,
    targets: Mutex<Vec<(Ipv4Addr, u16)>>,
}

impl SwitchProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn targets(&self) -> Vec<(Ipv4Addr, u16)> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostProber for SwitchProber {
    async fn probe(&self, ip: Ipv4Addr, port: u16) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push((ip, port));
        self.up.load(Ordering::SeqCst)
    }
}

// ===== Address resolver =====

/// Returns fixed local/public addresses, or fails on demand
pub struct FixedResolver {
    local: Mutex<IpAddr>,
    public: Mutex<IpAddr>,
    fail: AtomicBool,
    calls: Mutex<Vec<AddressScope>>,
}

impl FixedResolver {
    pub fn new(local: IpAddr, public: IpAddr) -> Arc<Self> {
        Arc::new(Self {
            local: Mutex::new(local),
            public: Mutex::new(public),
            fail: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_public(&self, ip: IpAddr) {
        *self.public.lock().unwrap() = ip;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<AddressScope> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AddressResolver for FixedResolver {
    async fn resolve(&self, scope: AddressScope) -> Result<IpAddr> {
        self.calls.lock().unwrap().push(scope);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::address_lookup("scripted failure"));
        }
        Ok(match scope {
            AddressScope::Local => *self.local.lock().unwrap(),
            AddressScope::Public => *self.public.lock().unwrap(),
        })
    }
}

// ===== DNS provider =====

/// Provider-side view shared by every client a [`MockDnsFactory`] builds
#[derive(Default)]
pub struct MockDnsBackend {
    /// Current record value per domain
    pub records: Mutex<HashMap<String, IpAddr>>,
    pub sync_calls: AtomicUsize,
    pub fail: AtomicBool,
    pub created: AtomicUsize,
}

impl MockDnsBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_record(&self, domain: &str, ip: IpAddr) {
        self.records.lock().unwrap().insert(domain.to_string(), ip);
    }

    pub fn record(&self, domain: &str) -> Option<IpAddr> {
        self.records.lock().unwrap().get(domain).copied()
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

pub struct MockDnsClient {
    backend: Arc<MockDnsBackend>,
    domain: String,
    record_id: Option<String>,
}

#[async_trait]
impl DnsRecordClient for MockDnsClient {
    async fn sync(&mut self, ip: IpAddr) -> Result<UpdateResult> {
        self.backend.sync_calls.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail.load(Ordering::SeqCst) {
            return Err(Error::provider("mock", "InternalError: scripted failure"));
        }
        self.record_id = Some(format!("id-{}", self.domain));
        let previous = self
            .backend
            .records
            .lock()
            .unwrap()
            .insert(self.domain.clone(), ip);
        Ok(match previous {
            Some(old) if old == ip => UpdateResult::Unchanged { current_ip: ip },
            Some(old) => UpdateResult::Updated {
                previous_ip: Some(old),
                new_ip: ip,
            },
            None => {
                self.backend.created.fetch_add(1, Ordering::SeqCst);
                UpdateResult::Created { new_ip: ip }
            }
        })
    }

    async fn describe(&mut self, _ip_hint: IpAddr) -> Result<RecordMetadata> {
        let ip = self
            .backend
            .record(&self.domain)
            .ok_or_else(|| Error::not_found(self.domain.clone()))?;
        Ok(RecordMetadata {
            id: format!("id-{}", self.domain),
            name: self.domain.clone(),
            ip,
            ttl: Some(600),
        })
    }

    fn cached_record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Builds [`MockDnsClient`]s over one backend
pub struct MockDnsFactory {
    backend: Arc<MockDnsBackend>,
    created: Arc<AtomicUsize>,
}

impl MockDnsFactory {
    pub fn new(backend: Arc<MockDnsBackend>) -> (Self, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        (
            Self {
                backend,
                created: Arc::clone(&created),
            },
            created,
        )
    }
}

impl DnsProviderFactory for MockDnsFactory {
    fn create(&self, record: &DdnsRecordConfig) -> Result<Box<dyn DnsRecordClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDnsClient {
            backend: Arc::clone(&self.backend),
            domain: record.domain.clone(),
            record_id: None,
        }))
    }
}

// ===== Pub/sub =====

/// Broker-side script and observations for [`MockPubSub`]
#[derive(Default)]
pub struct BrokerScript {
    pub connected: AtomicBool,
    /// Fail this many upcoming connect calls
    pub failing_connects: AtomicUsize,
    /// Topics whose subscribe fails
    pub rejected_topics: Mutex<Vec<String>>,
    /// Next poll reports a dropped session
    pub drop_on_poll: AtomicBool,
    /// Next poll fails
    pub fail_poll: AtomicBool,
    pub inbox: Mutex<VecDeque<InboundMessage>>,
    pub connects: Mutex<Vec<ConnectOptions>>,
    pub subscriptions: Mutex<Vec<String>>,
    pub published: Mutex<Vec<(String, String)>>,
    pub disconnects: AtomicUsize,
}

impl BrokerScript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        self.inbox
            .lock()
            .unwrap()
            .push_back(InboundMessage::new(topic.to_string(), payload.to_vec()));
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn reject_topic(&self, topic: &str) {
        self.rejected_topics.lock().unwrap().push(topic.to_string());
    }

    pub fn connects(&self) -> Vec<ConnectOptions> {
        self.connects.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub struct MockPubSub {
    script: Arc<BrokerScript>,
}

impl MockPubSub {
    pub fn new(script: &Arc<BrokerScript>) -> Box<Self> {
        Box::new(Self {
            script: Arc::clone(script),
        })
    }
}

#[async_trait]
impl PubSubClient for MockPubSub {
    async fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        self.script.connects.lock().unwrap().push(options.clone());
        let failing = self.script.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.script.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(Error::pubsub("connection refused"));
        }
        self.script.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        if self.script.rejected_topics.lock().unwrap().iter().any(|t| t == topic) {
            return Err(Error::pubsub(format!("subscribe {} rejected", topic)));
        }
        self.script.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        if !self.script.is_connected() {
            return Err(Error::pubsub("not connected"));
        }
        self.script
            .published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }

    async fn poll(&mut self) -> Result<Vec<InboundMessage>> {
        if self.script.fail_poll.swap(false, Ordering::SeqCst) {
            return Err(Error::pubsub("socket error"));
        }
        if self.script.drop_on_poll.swap(false, Ordering::SeqCst) {
            self.script.connected.store(false, Ordering::SeqCst);
            return Ok(Vec::new());
        }
        Ok(self.script.inbox.lock().unwrap().drain(..).collect())
    }

    async fn disconnect(&mut self) {
        if self.script.connected.swap(false, Ordering::SeqCst) {
            self.script.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_connected(&self) -> bool {
        self.script.is_connected()
    }
}

// ===== HTTP =====

/// Serves fixed responses per URL
#[derive(Default)]
pub struct ScriptedHttp {
    responses: Mutex<HashMap<String, HttpResponse>>,
    calls: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl ScriptedHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), HttpResponse::new(status, body));
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::timeout(url.to_string()));
        }
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::http(format!("no route for {}", url)))
    }
}

/// Metadata body advertising one package
pub fn metadata_body(version: &str, version_code: i32, size: u64) -> String {
    format!(
        r#"{{"code":0,"msg":"ok","data":{{"url":"https://fw.example.com/{version}.bin","version":"{version}","versionCode":{version_code},"tag":"stable","size":{size},"releasedAt":"2026-01-02 10:00:00"}}}}"#
    )
}

// ===== Firmware =====

/// Reports progress in fixed steps, then succeeds or fails
#[derive(Default)]
pub struct ScriptedUpdater {
    installs: AtomicUsize,
    fail: AtomicBool,
    chunks: Mutex<u64>,
    installed: Mutex<Vec<FirmwarePackageInfo>>,
}

impl ScriptedUpdater {
    pub fn new(chunks: u64) -> Arc<Self> {
        let updater = Self::default();
        *updater.chunks.lock().unwrap() = chunks;
        Arc::new(updater)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn installed(&self) -> Vec<FirmwarePackageInfo> {
        self.installed.lock().unwrap().clone()
    }
}

#[async_trait]
impl FirmwareUpdater for ScriptedUpdater {
    async fn install(
        &self,
        package: &FirmwarePackageInfo,
        progress: &mut (dyn FnMut(TransferProgress) + Send),
    ) -> Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        let chunks = (*self.chunks.lock().unwrap()).max(1);
        let total = package.size;
        progress(TransferProgress::new(0, total));
        for i in 1..=chunks {
            if self.fail.load(Ordering::SeqCst) && i * 2 > chunks {
                return Err(Error::firmware("connection reset"));
            }
            progress(TransferProgress::new(total * i / chunks, total));
        }
        self.installed.lock().unwrap().push(package.clone());
        Ok(())
    }
}

// ===== Link =====

#[derive(Default)]
pub struct SwitchLink {
    up: AtomicBool,
}

impl SwitchLink {
    pub fn new(up: bool) -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(up),
        })
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

impl LinkMonitor for SwitchLink {
    fn is_connected(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}
