//! Architectural Contract Test: Tick Dispatch & Command Routing
//!
//! Verifies that the dispatcher wires the services together correctly.
//!
//! Constraints verified:
//! - Cloud commands reach the power sequencer and the OTA orchestrator
//! - Every power state transition (except back to idle) is published once
//! - `status` replies with the current power state
//! - The run loop exits on shutdown, or on its own after a completed upgrade
//! - Snapshot sinks see the final state before the loop returns
//!
//! If this test fails, remote commands are lost or the daemon never restarts.

mod common;

use common::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wakehub_core::config::{BemfaConfig, ComputerConfig, OtaConfig};
use wakehub_core::{
    CloudBridge, DdnsSynchronizer, DispatchExit, ManualClock, OtaAction, OtaOrchestrator,
    OtaState, OtaTrigger, PowerSequencer, PowerState, ProviderRegistry, SystemSnapshot,
    TickDispatcher,
};

const MAC: &str = "AA:BB:CC:01:02:03";
const URL: &str = "https://fw.example.com/meta";
const SET: &str = "pc001/set";
const UP: &str = "pc001/up";

struct Rig {
    clock: Arc<ManualClock>,
    link: Arc<SwitchLink>,
    sender: Arc<CountingWakeSender>,
    prober: Arc<SwitchProber>,
    broker: Arc<BrokerScript>,
    http: Arc<ScriptedHttp>,
    dispatcher: TickDispatcher,
}

async fn rig() -> Rig {
    let (clock, dyn_clock) = manual_clock(0);
    let link = SwitchLink::new(true);
    let sender = CountingWakeSender::new();
    let prober = SwitchProber::new();
    let broker = BrokerScript::new();
    let http = ScriptedHttp::new();
    let resolver = FixedResolver::new("192.168.1.2".parse().unwrap(), "203.0.113.7".parse().unwrap());

    let power = PowerSequencer::new(Arc::clone(&dyn_clock), sender.clone(), prober.clone());
    let ddns = DdnsSynchronizer::new(
        Arc::clone(&dyn_clock),
        resolver,
        Arc::new(ProviderRegistry::new()),
    );
    let bridge = CloudBridge::new(Arc::clone(&dyn_clock), MockPubSub::new(&broker));
    let ota = OtaOrchestrator::new(Arc::clone(&dyn_clock), http.clone(), ScriptedUpdater::new(2));

    let mut dispatcher = TickDispatcher::new(link.clone(), power, ddns, bridge, ota)
        .with_tick_interval(Duration::from_millis(5));
    dispatcher.update_computer_config(ComputerConfig::new("192.168.1.20", MAC, 0));
    dispatcher
        .update_bemfa_config(BemfaConfig::new("0123456789abcdef", "pc001"))
        .await;
    dispatcher.update_ota_config(OtaConfig::new(URL, 0));

    Rig {
        clock,
        link,
        sender,
        prober,
        broker,
        http,
        dispatcher,
    }
}

/// Rig whose bridge already announced itself
async fn online_rig() -> Rig {
    let mut r = rig().await;
    r.dispatcher.tick_once().await;
    assert!(r.broker.is_connected());
    r
}

fn published_on_up(broker: &BrokerScript) -> Vec<String> {
    broker
        .published()
        .into_iter()
        .filter(|(topic, _)| topic == UP)
        .map(|(_, payload)| payload)
        .collect()
}

#[tokio::test]
async fn cloud_power_on_starts_sequence_and_reports_transitions() {
    let mut r = online_rig().await;

    r.broker.deliver(SET, b"on");
    r.dispatcher.tick_once().await;

    assert_eq!(r.dispatcher.power().state(), &PowerState::Booting);
    assert_eq!(published_on_up(&r.broker), vec!["online", "booting"]);

    r.dispatcher.tick_once().await;
    assert_eq!(r.sender.sent(), 1);
    assert_eq!(published_on_up(&r.broker).len(), 2, "no repeat while booting");

    r.prober.set_up(true);
    r.clock.advance(2_000);
    r.dispatcher.tick_once().await;
    assert_eq!(r.dispatcher.power().state(), &PowerState::On);
    assert_eq!(published_on_up(&r.broker), vec!["online", "booting", "on"]);
}

#[tokio::test]
async fn rejected_request_publishes_failure_code() {
    let mut r = online_rig().await;
    r.dispatcher
        .update_computer_config(ComputerConfig::new("192.168.1.20", "", 0));

    assert_err!(r.dispatcher.request_power_on());
    r.dispatcher.tick_once().await;

    assert_eq!(
        published_on_up(&r.broker).last().map(String::as_str),
        Some("failed:config_mac_required")
    );
}

#[tokio::test]
async fn status_command_replies_with_power_state() {
    let mut r = online_rig().await;

    r.broker.deliver("pc001", b"STATUS\n");
    r.dispatcher.tick_once().await;

    assert_eq!(published_on_up(&r.broker), vec!["online", "idle"]);
}

#[tokio::test]
async fn unknown_command_is_ignored() {
    let mut r = online_rig().await;

    r.broker.deliver(SET, b"off");
    r.dispatcher.tick_once().await;

    assert_eq!(r.dispatcher.power().state(), &PowerState::Idle);
    assert_eq!(published_on_up(&r.broker), vec!["online"]);
    assert_eq!(r.dispatcher.bridge().status().last_command, "off");
}

#[tokio::test]
async fn cloud_check_is_queued_as_cloud_trigger() {
    let mut r = online_rig().await;
    r.http.respond(URL, 200, &metadata_body("1.0.0", 1, 100));
    r.dispatcher.ota_mut().set_installed_version_code(1);

    r.broker.deliver(SET, b"check");
    r.dispatcher.tick_once().await;
    assert_eq!(r.dispatcher.ota().state(), OtaState::Queued);
    assert_eq!(r.dispatcher.ota().status().trigger, Some(OtaTrigger::Cloud));

    r.dispatcher.tick_once().await;
    assert_eq!(r.dispatcher.ota().state(), OtaState::NoUpdate);
    assert_eq!(r.http.calls(), 1);
}

#[tokio::test]
async fn console_requests_use_live_link_state() {
    let mut r = rig().await;
    r.link.set_up(false);

    assert_err!(r.dispatcher.request_power_on());
    assert_eq!(
        r.dispatcher
            .request_ota(OtaAction::Check, OtaTrigger::Console)
            .map_err(|e| e.code()),
        Err("wifi_not_connected")
    );

    r.dispatcher.tick_once().await;
    let snapshot = r.dispatcher.snapshot();
    assert!(!snapshot.wifi_connected);
    assert_eq!(snapshot.power.error_code.as_deref(), Some("wifi_not_connected"));
    assert_eq!(snapshot.bridge.state, "WAIT_WIFI");
}

#[tokio::test]
async fn shutdown_ends_run_and_flushes_snapshot() {
    let mut r = rig().await;
    let seen: Arc<Mutex<Vec<SystemSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    r.dispatcher.set_snapshot_sink(
        Duration::from_secs(60),
        Box::new(move |snapshot| sink.lock().unwrap().push(snapshot.clone())),
    );

    let exit = tokio::time::timeout(
        Duration::from_secs(5),
        r.dispatcher
            .run_with_shutdown(tokio::time::sleep(Duration::from_millis(50))),
    )
    .await
    .expect("dispatcher ignored shutdown");

    assert_eq!(exit, DispatchExit::Shutdown);
    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    // The last snapshot reflects the ticks that ran
    let last = seen.last().unwrap();
    assert!(last.wifi_connected);
    assert_eq!(last.bridge.state, "ONLINE");
}

#[tokio::test]
async fn completed_upgrade_requests_restart() {
    let mut r = rig().await;
    r.http.respond(URL, 200, &metadata_body("1.1.0", 11, 100));
    assert_ok!(
        r.dispatcher
            .request_ota(OtaAction::Upgrade, OtaTrigger::Console)
    );

    let exit = tokio::time::timeout(
        Duration::from_secs(5),
        r.dispatcher.run_with_shutdown(std::future::pending::<()>()),
    )
    .await
    .expect("dispatcher did not stop after upgrade");

    assert_eq!(exit, DispatchExit::RestartRequested);
    assert!(r.dispatcher.ota().restart_requested());
    assert_eq!(r.dispatcher.ota().installed_version_code(), 11);
}
