//! Firmware upgrade orchestrator
//!
//! Single-flight check/upgrade workflow. Requests are queued by the console,
//! the cloud bridge or the auto-check timer and drained one per tick.
//!
//! ## Request flight
//!
//! ```text
//!  Idle ──request──▶ Queued ──tick──▶ Busy ──done──▶ Idle
//! ```
//!
//! A request arriving while the flight is not `Idle` is rejected with
//! `ota_busy`; it is never merged or queued behind the current one.
//!
//! ## Execution (inside one tick)
//!
//! 1. Re-validate connectivity and config
//! 2. Upgrade with a cached newer package → skip the lookup
//! 3. Otherwise query the metadata endpoint → `UPDATE_AVAILABLE`/`NO_UPDATE`
//! 4. Upgrade only: download and apply with throttled progress → `UPDATED`
//! 5. Persist the installed version code and request a restart

pub mod lookup;
pub mod progress;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, elapsed_ms};
use crate::config::{OtaConfig, SystemConfig};
use crate::store::ConfigRepository;
use crate::traits::{FirmwarePackageInfo, FirmwareUpdater, HttpClient, TransferProgress};

pub use lookup::is_newer_than_installed;
pub use progress::{OtaNotifier, ProgressThrottle, StatusReporter};

/// Minimum spacing of accepted requests per manual trigger
pub const REQUEST_COOLDOWN_MS: u32 = 10_000;

/// OTA failures and outcomes with stable codes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtaError {
    #[error("another OTA request is in progress")]
    Busy,

    #[error("requests are limited to one every {}s", REQUEST_COOLDOWN_MS / 1000)]
    TooFrequent,

    #[error("WiFi is not connected")]
    WifiNotConnected,

    #[error("firmware metadata URL is not configured")]
    ConfigMissing,

    #[error("metadata request failed: {0}")]
    LookupHttpFailed(String),

    #[error("metadata endpoint returned HTTP {0}")]
    LookupHttpStatus(u16),

    #[error("metadata response is not understood: {0}")]
    LookupParseFailed(String),

    #[error("metadata endpoint rejected the request ({code}): {message}")]
    LookupRejected { code: i64, message: String },

    #[error("no firmware package is published")]
    NoUpdate,

    #[error("firmware package has no download URL")]
    UrlMissing,

    #[error("firmware package has no version")]
    VersionInvalid,

    #[error("firmware update failed: {0}")]
    UpdateFailed(String),
}

impl OtaError {
    /// Stable machine code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Busy => "ota_busy",
            Self::TooFrequent => "ota_too_frequent",
            Self::WifiNotConnected => "wifi_not_connected",
            Self::ConfigMissing => "ota_config_missing",
            Self::LookupHttpFailed(_) => "ota_lookup_http_failed",
            Self::LookupHttpStatus(_) => "ota_lookup_http_status",
            Self::LookupParseFailed(_) => "ota_lookup_parse_failed",
            Self::LookupRejected { .. } => "ota_lookup_rejected",
            Self::NoUpdate => "ota_no_update",
            Self::UrlMissing => "ota_url_missing",
            Self::VersionInvalid => "ota_version_invalid",
            Self::UpdateFailed(_) => "ota_update_failed",
        }
    }
}

/// What a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtaAction {
    /// Look up only
    Check,
    /// Look up (or reuse) and install
    Upgrade,
}

/// Who asked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtaTrigger {
    Console,
    Cloud,
    /// Auto-check timer, exempt from the cooldown
    Auto,
}

/// A queued or executing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaRequest {
    pub action: OtaAction,
    pub trigger: OtaTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flight {
    Idle,
    Queued(OtaRequest),
    Busy(OtaRequest),
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OtaState {
    #[default]
    Idle,
    WaitConfig,
    Ready,
    Queued,
    Checking,
    Downloading,
    UpdateAvailable,
    NoUpdate,
    Updated,
    Failed,
}

impl OtaState {
    /// Upper-case state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::WaitConfig => "WAIT_CONFIG",
            Self::Ready => "READY",
            Self::Queued => "QUEUED",
            Self::Checking => "CHECKING",
            Self::Downloading => "DOWNLOADING",
            Self::UpdateAvailable => "UPDATE_AVAILABLE",
            Self::NoUpdate => "NO_UPDATE",
            Self::Updated => "UPDATED",
            Self::Failed => "FAILED",
        }
    }
}

/// Status snapshot passed to the notifier and the console
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OtaStatus {
    pub state: String,
    pub message: String,
    pub code: Option<String>,
    pub action: Option<OtaAction>,
    pub trigger: Option<OtaTrigger>,
    pub pending: bool,
    pub busy: bool,
    pub installed_version_code: i32,
    pub available: Option<FirmwarePackageInfo>,
    pub progress_percent: u8,
    pub progress_bytes: u64,
    pub progress_total_bytes: u64,
    pub metadata_url_configured: bool,
    pub auto_check_interval_minutes: u32,
    pub restart_requested: bool,
}

/// Firmware upgrade orchestrator
pub struct OtaOrchestrator {
    clock: Arc<dyn Clock>,
    http: Arc<dyn HttpClient>,
    updater: Arc<dyn FirmwareUpdater>,
    repository: Option<ConfigRepository>,
    config: OtaConfig,
    installed_version_code: i32,
    state: OtaState,
    message: String,
    last_code: Option<&'static str>,
    flight: Flight,
    last_request: Option<OtaRequest>,
    cached_package: Option<FirmwarePackageInfo>,
    last_accepted_at: HashMap<OtaTrigger, u32>,
    /// Reference point of the auto-check timer
    last_check_at: u32,
    progress: TransferProgress,
    reporter: StatusReporter,
    restart_requested: bool,
}

impl OtaOrchestrator {
    /// Create an orchestrator without config
    pub fn new(
        clock: Arc<dyn Clock>,
        http: Arc<dyn HttpClient>,
        updater: Arc<dyn FirmwareUpdater>,
    ) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            http,
            updater,
            repository: None,
            config: OtaConfig::default(),
            installed_version_code: SystemConfig::default().ota_installed_version_code,
            state: OtaState::WaitConfig,
            message: "metadata URL not configured".to_string(),
            last_code: None,
            flight: Flight::Idle,
            last_request: None,
            cached_package: None,
            last_accepted_at: HashMap::new(),
            last_check_at: now,
            progress: TransferProgress::default(),
            reporter: StatusReporter::new(),
            restart_requested: false,
        }
    }

    /// Persist the installed version through `repository` after upgrades
    pub fn with_repository(mut self, repository: ConfigRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Install the status notifier
    pub fn set_notifier(&mut self, notifier: OtaNotifier) {
        self.reporter.set_notifier(notifier);
    }

    /// Set the installed version code (from `SystemConfig`)
    pub fn set_installed_version_code(&mut self, version_code: i32) {
        self.installed_version_code = version_code;
    }

    /// Installed version code
    pub fn installed_version_code(&self) -> i32 {
        self.installed_version_code
    }

    /// Current state
    pub fn state(&self) -> OtaState {
        self.state
    }

    /// A successful upgrade asked for a restart
    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    /// Apply a new config
    pub fn update_config(&mut self, config: OtaConfig) {
        self.config = config.normalized();
        self.last_check_at = self.clock.now_ms();
        if self.flight != Flight::Idle {
            return;
        }
        if self.config.is_configured() {
            self.set_state(OtaState::Ready, "ready");
        } else {
            self.set_state(OtaState::WaitConfig, "metadata URL not configured");
        }
        self.notify(true);
    }

    fn set_state(&mut self, state: OtaState, message: impl Into<String>) {
        if self.state != state {
            info!("OTA state {} -> {}", self.state.name(), state.name());
        }
        self.state = state;
        self.message = message.into();
    }

    fn notify(&mut self, forced: bool) {
        let status = self.status();
        let now = self.clock.now_ms();
        self.reporter.emit(&status, now, forced);
    }

    /// Queue a check
    pub fn request_check(&mut self, trigger: OtaTrigger, wifi_connected: bool) -> Result<(), OtaError> {
        self.request(OtaAction::Check, trigger, wifi_connected)
    }

    /// Queue an upgrade
    pub fn request_upgrade(&mut self, trigger: OtaTrigger, wifi_connected: bool) -> Result<(), OtaError> {
        self.request(OtaAction::Upgrade, trigger, wifi_connected)
    }

    /// Queue a request
    ///
    /// Rejections are checked in order: busy, cooldown, connectivity, config.
    pub fn request(
        &mut self,
        action: OtaAction,
        trigger: OtaTrigger,
        wifi_connected: bool,
    ) -> Result<(), OtaError> {
        let now = self.clock.now_ms();

        let rejection = if self.flight != Flight::Idle {
            Some(OtaError::Busy)
        } else if trigger != OtaTrigger::Auto
            && self
                .last_accepted_at
                .get(&trigger)
                .is_some_and(|at| elapsed_ms(now, *at) < REQUEST_COOLDOWN_MS)
        {
            Some(OtaError::TooFrequent)
        } else if !wifi_connected {
            Some(OtaError::WifiNotConnected)
        } else if !self.config.is_configured() {
            Some(OtaError::ConfigMissing)
        } else {
            None
        };

        if let Some(e) = rejection {
            debug!("OTA {:?} request from {:?} rejected: {}", action, trigger, e);
            self.last_code = Some(e.code());
            self.message = e.to_string();
            self.notify(true);
            return Err(e);
        }

        if trigger != OtaTrigger::Auto {
            self.last_accepted_at.insert(trigger, now);
        }
        let request = OtaRequest { action, trigger };
        self.flight = Flight::Queued(request);
        self.last_request = Some(request);
        self.last_code = None;
        self.set_state(OtaState::Queued, format!("{:?} queued", action).to_lowercase());
        self.notify(true);
        Ok(())
    }

    /// Auto-check timer and drain of one queued request
    pub async fn tick(&mut self, wifi_connected: bool) {
        self.maybe_queue_auto_check(wifi_connected);

        let Flight::Queued(request) = self.flight else {
            return;
        };
        self.flight = Flight::Busy(request);
        self.progress = TransferProgress::default();
        self.notify(true);

        let result = self.execute(request, wifi_connected).await;
        self.flight = Flight::Idle;

        if let Err(e) = result {
            warn!("OTA {:?} failed: {}", request.action, e);
            self.last_code = Some(e.code());
            self.set_state(OtaState::Failed, e.to_string());
        }
        self.notify(true);
    }

    fn maybe_queue_auto_check(&mut self, wifi_connected: bool) {
        let interval_minutes = self.config.auto_check_interval_minutes;
        if interval_minutes == 0
            || self.flight != Flight::Idle
            || !wifi_connected
            || !self.config.is_configured()
        {
            return;
        }

        let interval_ms = interval_minutes.saturating_mul(60_000);
        if elapsed_ms(self.clock.now_ms(), self.last_check_at) < interval_ms {
            return;
        }

        debug!("Auto-check interval of {} min elapsed", interval_minutes);
        if let Err(e) = self.request(OtaAction::Check, OtaTrigger::Auto, wifi_connected) {
            debug!("Auto-check not queued: {}", e);
        }
    }

    async fn execute(&mut self, request: OtaRequest, wifi_connected: bool) -> Result<(), OtaError> {
        if !wifi_connected {
            return Err(OtaError::WifiNotConnected);
        }
        if !self.config.is_configured() {
            return Err(OtaError::ConfigMissing);
        }

        let cached = self
            .cached_package
            .clone()
            .filter(|pkg| is_newer_than_installed(self.installed_version_code, pkg.version_code));

        let package = match (request.action, cached) {
            (OtaAction::Upgrade, Some(pkg)) => {
                debug!("Reusing cached package {}", pkg.version);
                pkg
            }
            _ => match self.check().await? {
                Some(pkg) => pkg,
                None => return Ok(()),
            },
        };

        if request.action == OtaAction::Check {
            return Ok(());
        }

        self.install(package).await
    }

    /// Lookup; `None` when nothing newer is available
    async fn check(&mut self) -> Result<Option<FirmwarePackageInfo>, OtaError> {
        self.set_state(OtaState::Checking, "checking for firmware");
        self.notify(true);
        self.last_check_at = self.clock.now_ms();

        let url = self.config.metadata_url.clone();
        let package = match lookup::lookup(self.http.as_ref(), &url).await {
            Ok(pkg) => pkg,
            Err(OtaError::NoUpdate) => {
                self.cached_package = None;
                self.last_code = Some(OtaError::NoUpdate.code());
                self.set_state(OtaState::NoUpdate, OtaError::NoUpdate.to_string());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !is_newer_than_installed(self.installed_version_code, package.version_code) {
            self.cached_package = None;
            self.last_code = Some(OtaError::NoUpdate.code());
            self.set_state(
                OtaState::NoUpdate,
                format!("already at {} ({})", package.version, self.installed_version_code),
            );
            return Ok(None);
        }

        info!(
            "Firmware {} (code {}) available, installed code {}",
            package.version, package.version_code, self.installed_version_code
        );
        self.cached_package = Some(package.clone());
        self.set_state(
            OtaState::UpdateAvailable,
            format!("firmware {} available", package.version),
        );
        self.notify(true);
        Ok(Some(package))
    }

    async fn install(&mut self, package: FirmwarePackageInfo) -> Result<(), OtaError> {
        self.progress = TransferProgress::new(0, package.size);
        self.set_state(OtaState::Downloading, format!("downloading {}", package.version));
        self.notify(true);

        let updater = Arc::clone(&self.updater);
        let clock = Arc::clone(&self.clock);
        let mut snapshot = self.status();
        let mut throttle = ProgressThrottle::new();
        throttle.observe(0, clock.now_ms());
        let mut latest = self.progress;
        let reporter = &mut self.reporter;

        let mut on_progress = |progress: TransferProgress| {
            latest = progress;
            let now = clock.now_ms();
            let percent = progress.percent();
            if let Some(forced) = throttle.observe(percent, now) {
                snapshot.progress_percent = percent;
                snapshot.progress_bytes = progress.bytes;
                snapshot.progress_total_bytes = progress.total_bytes;
                reporter.emit(&snapshot, now, forced);
            }
        };

        let result = updater.install(&package, &mut on_progress).await;
        self.progress = latest;
        result.map_err(|e| OtaError::UpdateFailed(e.to_string()))?;

        self.installed_version_code = package.version_code;
        self.cached_package = None;
        self.restart_requested = true;

        let mut message = format!("updated to {}, restart pending", package.version);
        if let Some(repository) = &self.repository {
            let system = SystemConfig {
                ota_installed_version_code: package.version_code,
            };
            if let Err(e) = repository.save_system_config(&system).await {
                error!("Failed to persist installed firmware version: {}", e);
                message.push_str(" (version not saved)");
            }
        }

        info!("Firmware {} installed", package.version);
        self.last_code = None;
        self.set_state(OtaState::Updated, message);
        Ok(())
    }

    /// Status snapshot
    pub fn status(&self) -> OtaStatus {
        let (pending, busy, current) = match self.flight {
            Flight::Idle => (false, false, self.last_request),
            Flight::Queued(r) => (true, false, Some(r)),
            Flight::Busy(r) => (false, true, Some(r)),
        };

        OtaStatus {
            state: self.state.name().to_string(),
            message: self.message.clone(),
            code: self.last_code.map(str::to_string),
            action: current.map(|r| r.action),
            trigger: current.map(|r| r.trigger),
            pending,
            busy,
            installed_version_code: self.installed_version_code,
            available: self.cached_package.clone(),
            progress_percent: self.progress.percent(),
            progress_bytes: self.progress.bytes,
            progress_total_bytes: self.progress.total_bytes,
            metadata_url_configured: self.config.is_configured(),
            auto_check_interval_minutes: self.config.auto_check_interval_minutes,
            restart_requested: self.restart_requested,
        }
    }
}

impl std::fmt::Debug for OtaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtaOrchestrator")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("flight", &self.flight)
            .field("installed_version_code", &self.installed_version_code)
            .finish_non_exhaustive()
    }
}
