//! Architectural Contract Test: Power-On Sequencing
//!
//! Verifies the wake/probe state machine against a manual clock.
//!
//! Constraints verified:
//! - Requests are validated in order (connectivity, MAC, IP) and every
//!   rejection leaves the sequencer in `failed` with a stable code
//! - At most three wake packets are sent, 400 ms apart
//! - Reachability is probed on the first tick and then every 2 s
//! - The sequence ends after 60 s or when the link drops
//! - Packet spacing and the timeout hold across a millisecond counter wrap
//! - Duplicate requests while booting or on have no side effects
//!
//! If this test fails, the wake sequence can flood the LAN or never settle.

mod common;

use common::*;
use std::net::Ipv4Addr;
use std::sync::Arc;
use wakehub_core::config::{ComputerConfig, DEFAULT_PROBE_PORT};
use wakehub_core::power::{BOOT_TIMEOUT_MS, MAX_WAKE_PACKETS};
use wakehub_core::wake::WakeError;
use wakehub_core::{Clock, PowerAccepted, PowerError, PowerSequencer, PowerState};
use tokio_test::assert_ok;

const MAC: &str = "AA:BB:CC:01:02:03";

fn target() -> ComputerConfig {
    ComputerConfig::new("192.168.1.20", MAC, 0)
}

struct Rig {
    clock: Arc<wakehub_core::ManualClock>,
    sender: Arc<CountingWakeSender>,
    prober: Arc<SwitchProber>,
    power: PowerSequencer,
}

fn rig() -> Rig {
    let (clock, dyn_clock) = manual_clock(1_000);
    let sender = CountingWakeSender::new();
    let prober = SwitchProber::new();
    let power = PowerSequencer::new(dyn_clock, sender.clone(), prober.clone());
    Rig {
        clock,
        sender,
        prober,
        power,
    }
}

#[tokio::test]
async fn host_answering_ends_sequence_in_on() {
    let mut r = rig();

    assert_eq!(
        r.power.request_power_on(&target(), true),
        Ok(PowerAccepted::Started)
    );
    assert_eq!(r.power.state(), &PowerState::Booting);

    // First tick sends a packet and probes immediately
    r.power.tick(true).await;
    assert_eq!(r.sender.sent(), 1);
    assert_eq!(r.prober.probes(), 1);
    assert_eq!(
        r.prober.targets(),
        vec![(Ipv4Addr::new(192, 168, 1, 20), DEFAULT_PROBE_PORT)]
    );

    r.prober.set_up(true);
    r.clock.advance(2_000);
    r.power.tick(true).await;

    assert_eq!(r.power.state(), &PowerState::On);
    let status = r.power.status();
    assert_eq!(status.state, "on");
    assert_eq!(status.error_code, None);
    assert_eq!(status.probe_attempts, 2);
    assert_eq!(status.elapsed_ms, 2_000);

    // Elapsed time is frozen once the sequence ends
    r.clock.advance(10_000);
    assert_eq!(r.power.status().elapsed_ms, 2_000);
}

#[tokio::test]
async fn wake_packets_are_capped_and_spaced() {
    let mut r = rig();
    assert_ok!(r.power.request_power_on(&target(), true));

    for _ in 0..40 {
        r.power.tick(true).await;
        r.clock.advance(100);
    }

    assert_eq!(r.sender.sent(), MAX_WAKE_PACKETS as usize);
    assert!(r.sender.macs().iter().all(|m| m == MAC));
    // 4 s of ticks: probes at 0, 2000 ms
    assert_eq!(r.prober.probes(), 2);
    assert_eq!(r.power.state(), &PowerState::Booting);
}

#[tokio::test]
async fn packets_are_not_resent_within_retry_interval() {
    let mut r = rig();
    assert_ok!(r.power.request_power_on(&target(), true));

    r.power.tick(true).await;
    r.clock.advance(399);
    r.power.tick(true).await;
    assert_eq!(r.sender.sent(), 1, "second packet before 400 ms");

    r.clock.advance(1);
    r.power.tick(true).await;
    assert_eq!(r.sender.sent(), 2);
}

#[tokio::test]
async fn silent_host_times_out() {
    let mut r = rig();
    assert_ok!(r.power.request_power_on(&target(), true));
    r.power.tick(true).await;

    r.clock.advance(BOOT_TIMEOUT_MS - 1);
    r.power.tick(true).await;
    assert_eq!(r.power.state(), &PowerState::Booting);

    r.clock.advance(1);
    r.power.tick(true).await;

    assert_eq!(r.power.state(), &PowerState::Failed(PowerError::BootTimeout));
    let status = r.power.status();
    assert_eq!(status.error_code.as_deref(), Some("boot_timeout"));
    assert_eq!(status.elapsed_ms, BOOT_TIMEOUT_MS);
}

#[tokio::test]
async fn timers_survive_counter_wrap() {
    let mut r = rig();
    let start = u32::MAX - 500;
    r.clock.set(start);
    assert_ok!(r.power.request_power_on(&target(), true));

    r.power.tick(true).await;
    r.clock.advance(399);
    r.power.tick(true).await;
    assert_eq!(r.sender.sent(), 1);

    r.clock.advance(1);
    r.power.tick(true).await;
    assert_eq!(r.sender.sent(), 2);

    // Third packet goes out after the counter wrapped to a small value
    r.clock.advance(400);
    assert!(r.clock.now_ms() < start);
    r.power.tick(true).await;
    assert_eq!(r.sender.sent(), 3);
    assert_eq!(r.prober.probes(), 1);

    r.clock.advance(BOOT_TIMEOUT_MS - 800 - 1);
    r.power.tick(true).await;
    assert_eq!(r.power.state(), &PowerState::Booting);

    r.clock.advance(1);
    r.power.tick(true).await;
    assert_eq!(r.power.state(), &PowerState::Failed(PowerError::BootTimeout));
    assert_eq!(r.power.status().elapsed_ms, BOOT_TIMEOUT_MS);
    assert_eq!(r.sender.sent(), MAX_WAKE_PACKETS as usize);
}

#[tokio::test]
async fn link_loss_aborts_sequence() {
    let mut r = rig();
    assert_ok!(r.power.request_power_on(&target(), true));
    r.power.tick(true).await;

    r.clock.advance(100);
    r.power.tick(false).await;

    assert_eq!(
        r.power.state(),
        &PowerState::Failed(PowerError::WifiNotConnected)
    );
    assert_eq!(r.sender.sent(), 1);
}

#[tokio::test]
async fn rejections_are_checked_in_order() {
    let mut r = rig();

    // No link beats every config problem
    let bad = ComputerConfig::new("not-an-ip", "", 0);
    assert_eq!(
        r.power.request_power_on(&bad, false),
        Err(PowerError::WifiNotConnected)
    );
    assert_eq!(
        r.power.request_power_on(&bad, true),
        Err(PowerError::MacRequired)
    );

    let bad_ip = ComputerConfig::new("300.1.1.1", MAC, 0);
    let err = r.power.request_power_on(&bad_ip, true).unwrap_err();
    assert_eq!(err.code(), "config_ip_invalid");
    assert_eq!(r.power.status().error_code.as_deref(), Some("config_ip_invalid"));

    // A failed sequencer accepts a fresh, valid request
    assert_eq!(
        r.power.request_power_on(&target(), true),
        Ok(PowerAccepted::Started)
    );
    assert_eq!(r.sender.sent(), 0, "validation never sends a packet");
}

#[tokio::test]
async fn malformed_mac_fails_on_first_send() {
    let mut r = rig();
    let config = ComputerConfig::new("192.168.1.20", "AA:BB:CC", 0);

    assert_eq!(
        r.power.request_power_on(&config, true),
        Ok(PowerAccepted::Started)
    );
    r.power.tick(true).await;

    assert_eq!(
        r.power.state(),
        &PowerState::Failed(PowerError::Wake(WakeError::InvalidMac("AA:BB:CC".to_string())))
    );
    assert_eq!(r.power.status().error_code.as_deref(), Some("invalid_mac"));
    assert_eq!(r.prober.probes(), 0);
}

#[tokio::test]
async fn duplicate_requests_have_no_side_effects() {
    let mut r = rig();
    assert_ok!(r.power.request_power_on(&target(), true));
    r.power.tick(true).await;

    assert_eq!(
        r.power.request_power_on(&target(), true),
        Ok(PowerAccepted::AlreadyBooting)
    );
    // Even without link: the running sequence is reported, not rejected
    assert_eq!(
        r.power.request_power_on(&target(), false),
        Ok(PowerAccepted::AlreadyBooting)
    );
    assert_eq!(r.power.status().packets_sent, 1);

    r.prober.set_up(true);
    r.clock.advance(2_000);
    r.power.tick(true).await;
    assert_eq!(
        r.power.request_power_on(&target(), true),
        Ok(PowerAccepted::AlreadyOn)
    );
    assert_eq!(r.power.state(), &PowerState::On);
}

#[tokio::test]
async fn custom_probe_port_is_used() {
    let mut r = rig();
    let config = ComputerConfig::new("10.0.0.5", MAC, 22);
    assert_ok!(r.power.request_power_on(&config, true));
    r.power.tick(true).await;

    assert_eq!(r.prober.targets(), vec![(Ipv4Addr::new(10, 0, 0, 5), 22)]);
    assert_eq!(r.power.status().target_port, 22);
}
