// # wakehubd - wakehub appliance daemon
//
// Thin wiring layer: all power, DDNS, bridge and OTA logic lives in
// wakehub-core. The daemon:
// 1. Reads settings from environment variables
// 2. Opens the config store and loads the persisted service configs
// 3. Builds the concrete capabilities and registers DNS providers
// 4. Runs the tick dispatcher until a signal or a completed upgrade
//
// ## Configuration
//
// - `WAKEHUB_CONFIG_PATH`: config store file (default `/var/lib/wakehub/config.json`)
// - `WAKEHUB_STATUS_PATH`: optional JSON status snapshot, rewritten every 5 s
// - `WAKEHUB_FIRMWARE_PATH`: staging file for downloaded images
// - `WAKEHUB_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `WAKEHUB_TICK_MS`: tick spacing, 50-1000 (default 100)
// - `WAKEHUB_OTA_URL`: firmware metadata endpoint (empty disables OTA)
// - `WAKEHUB_OTA_CHECK_MINUTES`: auto-check interval, 0 disables
//
// ## Exit codes
//
// - 0: clean shutdown
// - 1: configuration or startup error
// - 2: runtime error
// - 3: firmware staged, restart requested

mod config;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;
use wakehub_core::clock::{Clock, SystemClock};
use wakehub_core::dispatcher::SystemSnapshot;
use wakehub_core::ota::OtaStatus;
use wakehub_core::traits::{HttpClient, KeyValueStore};
use wakehub_core::{
    CloudBridge, ConfigRepository, DdnsSynchronizer, DispatchExit, FileStore, OtaOrchestrator,
    PowerSequencer, ProviderRegistry, TickDispatcher,
};
use wakehub_ip::SystemAddressResolver;
use wakehub_mqtt::RumqttPubSub;
use wakehub_net::{FileFirmwareUpdater, InterfaceLinkMonitor, ReqwestHttpClient, TcpHostProber, UdpWakeSender};

use config::{STATUS_INTERVAL, Settings};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy)]
enum WakehubExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected)
    RuntimeError = 2,
    /// A firmware image is staged; the supervisor should restart us
    RestartRequested = 3,
}

impl From<WakehubExitCode> for ExitCode {
    fn from(code: WakehubExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return WakehubExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return WakehubExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level().unwrap_or(tracing::Level::INFO))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WakehubExitCode::ConfigError.into();
    }

    info!("Starting wakehubd {}", env!("CARGO_PKG_VERSION"));

    // One thread: services are ticked cooperatively
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WakehubExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        let mut daemon = match Daemon::build(&settings).await {
            Ok(d) => d,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return WakehubExitCode::ConfigError;
            }
        };

        match daemon.run().await {
            Ok(DispatchExit::Shutdown) => WakehubExitCode::CleanShutdown,
            Ok(DispatchExit::RestartRequested) => WakehubExitCode::RestartRequested,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                WakehubExitCode::RuntimeError
            }
        }
    })
    .into()
}

struct Daemon {
    dispatcher: TickDispatcher,
    store: Arc<dyn KeyValueStore>,
}

impl Daemon {
    async fn build(settings: &Settings) -> Result<Self> {
        let file_store = FileStore::new(&settings.config_path)
            .await
            .with_context(|| format!("Failed to open config store {}", settings.config_path.display()))?;
        info!("Config store: {}", file_store.path().display());
        let store: Arc<dyn KeyValueStore> = Arc::new(file_store);
        let repository = ConfigRepository::new(Arc::clone(&store));

        let computer = repository.load_computer_config().await?;
        let ddns = repository.load_ddns_config().await?;
        let bemfa = repository.load_bemfa_config().await?;
        let system = repository.load_system_config().await?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let reqwest_client = ReqwestHttpClient::new()?;
        let http: Arc<dyn HttpClient> = Arc::new(reqwest_client.clone());

        let registry = build_registry(&http);
        info!("DNS providers: {:?}", registry.list_providers());

        let power = PowerSequencer::new(
            Arc::clone(&clock),
            Arc::new(UdpWakeSender::new()),
            Arc::new(TcpHostProber::default()),
        );
        let synchronizer = DdnsSynchronizer::new(
            Arc::clone(&clock),
            Arc::new(SystemAddressResolver::new(Arc::clone(&http))),
            Arc::new(registry),
        );
        let bridge = CloudBridge::new(Arc::clone(&clock), Box::new(RumqttPubSub::new()));
        let mut ota = OtaOrchestrator::new(
            Arc::clone(&clock),
            Arc::clone(&http),
            Arc::new(FileFirmwareUpdater::new(reqwest_client, settings.firmware_path.clone())),
        )
        .with_repository(repository);
        ota.set_installed_version_code(system.ota_installed_version_code);
        ota.set_notifier(Box::new(log_ota_status));

        let mut dispatcher = TickDispatcher::new(
            Arc::new(InterfaceLinkMonitor::new()),
            power,
            synchronizer,
            bridge,
            ota,
        )
        .with_tick_interval(settings.tick_interval());

        dispatcher.update_computer_config(computer);
        dispatcher.update_ddns_config(ddns);
        dispatcher.update_bemfa_config(bemfa).await;
        dispatcher.update_ota_config(settings.ota_config());

        if let Some(path) = settings.status_path.clone() {
            info!("Status snapshots: {}", path.display());
            dispatcher.set_snapshot_sink(
                STATUS_INTERVAL,
                Box::new(move |snapshot| write_snapshot(&path, snapshot)),
            );
        }

        Ok(Self { dispatcher, store })
    }

    async fn run(&mut self) -> Result<DispatchExit> {
        let exit = self.dispatcher.run_with_shutdown(wait_for_shutdown()).await;

        info!("Flushing config store");
        self.store
            .flush()
            .await
            .context("Failed to flush config store")?;

        match exit {
            DispatchExit::Shutdown => info!("Shutting down"),
            DispatchExit::RestartRequested => info!("Exiting for restart"),
        }
        Ok(exit)
    }
}

#[allow(unused_variables)]
fn build_registry(http: &Arc<dyn HttpClient>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    #[cfg(feature = "aliyun")]
    {
        info!("Registering Aliyun DNS provider");
        wakehub_provider_aliyun::register(&mut registry, Arc::clone(http));
    }

    registry
}

fn log_ota_status(status: &OtaStatus) {
    if status.busy && status.progress_total_bytes > 0 {
        info!(
            "OTA {}: {}% ({}/{} bytes)",
            status.state, status.progress_percent, status.progress_bytes, status.progress_total_bytes
        );
    } else {
        info!("OTA {}: {}", status.state, status.message);
    }
}

/// Write `snapshot` next to `path` and rename it into place
fn write_snapshot(path: &Path, snapshot: &SystemSnapshot) {
    let json = match serde_json::to_string_pretty(snapshot) {
        Ok(j) => j,
        Err(e) => {
            warn!("Status snapshot not serialized: {}", e);
            return;
        }
    };

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    if let Err(e) = std::fs::write(&tmp, json).and_then(|_| std::fs::rename(&tmp, path)) {
        warn!("Status snapshot not written to {}: {}", path.display(), e);
    }
}

/// Resolve on SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() {
    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Signal handlers unavailable ({}), falling back to Ctrl-C", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to wait for Ctrl-C: {}", e);
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

/// Resolve on Ctrl-C
#[cfg(not(unix))]
async fn wait_for_shutdown() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT"),
        Err(e) => error!("Failed to wait for Ctrl-C: {}", e),
    }
}
