//! Update lifecycle: progress throttling, restart on success, reporting on
//! failure, and an end-to-end download through the ThingsBoard session.

use hmac_sha256::Hash;
use pt100_gateway::adapters::network::GatewayNetwork;
use pt100_gateway::adapters::thingsboard::transport::LoopbackTransport;
use pt100_gateway::adapters::thingsboard::{ATTRIBUTES_TOPIC, TELEMETRY_TOPIC, ThingsBoardSession};
use pt100_gateway::adapters::wifi::WifiLink;
use pt100_gateway::app::events::{ConnectionState, GatewayEvent};
use pt100_gateway::app::service::{GatewayService, PROGRESS_ATTRIBUTE};
use pt100_gateway::app::update::{UPDATE_EVENTS_PER_POLL, UpdateEvent};
use pt100_gateway::config::{CONNECTION_CHECK_MS, DeviceIdentity, GatewayConfig, OtaParams};
use pt100_gateway::ota::OtaState;

use super::mock_ports::{ManualClock, MockSensor, MockSystem, RecordingSink, Rig, provisioned_store};

fn connected_rig() -> Rig {
    let mut rig = Rig::boot();
    rig.tick(0);
    assert!(rig.service.update_armed());
    rig
}

#[test]
fn success_restarts_the_device() {
    let mut rig = connected_rig();
    rig.net.queue_update(UpdateEvent::Completed { success: true });
    rig.tick(1);
    assert_eq!(rig.system.restarts, 1);
    assert!(rig.sink.events.contains(&GatewayEvent::UpdateSucceeded));
}

#[test]
fn failure_reports_and_keeps_running() {
    let mut rig = connected_rig();
    rig.net.queue_update(UpdateEvent::Completed { success: false });
    rig.tick(1);
    assert_eq!(rig.system.restarts, 0);
    assert!(rig.sink.events.contains(&GatewayEvent::UpdateFailed));

    // Still armed, still publishing on schedule.
    assert!(rig.service.update_armed());
    assert_eq!(rig.state(), ConnectionState::Connected);
    rig.tick(CONNECTION_CHECK_MS);
    assert_eq!(rig.net.subscriptions.len(), 1, "no automatic re-arm");
}

#[test]
fn progress_is_reported_every_tenth_callback() {
    let mut rig = connected_rig();
    for i in 1..=25 {
        rig.net.queue_update(UpdateEvent::Progress {
            current: i * 40,
            total: 1000,
        });
    }
    rig.tick(1);
    assert_eq!(rig.net.progress_attributes(), vec![40.0, 80.0]);
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, GatewayEvent::UpdateProgress { .. })),
        2
    );
}

#[test]
fn rearming_starts_a_fresh_progress_counter() {
    let mut rig = connected_rig();
    for i in 1..=7 {
        rig.net.queue_update(UpdateEvent::Progress { current: i, total: 10 });
    }
    rig.tick(1);

    rig.net.session_up = false;
    rig.tick(CONNECTION_CHECK_MS);
    assert_eq!(rig.net.subscriptions.len(), 2);

    for i in 1..=7 {
        rig.net.queue_update(UpdateEvent::Progress { current: i, total: 10 });
    }
    rig.tick(CONNECTION_CHECK_MS + 1);
    assert!(rig.net.progress_attributes().is_empty());
}

#[test]
fn restart_stops_dispatching_remaining_events() {
    let mut rig = connected_rig();
    rig.net.queue_update(UpdateEvent::Completed { success: true });
    rig.net.queue_update(UpdateEvent::Completed { success: false });
    rig.tick(1);
    assert_eq!(rig.system.restarts, 1);
    assert!(!rig.sink.events.contains(&GatewayEvent::UpdateFailed));
}

#[test]
fn events_before_arming_are_ignored() {
    let mut net = super::mock_ports::MockNet::new();
    net.fail_next_connects(1);
    net.queue_update(UpdateEvent::Completed { success: true });
    let mut rig = Rig::boot_with(net);
    rig.tick(0);
    assert!(!rig.service.update_armed());
    assert_eq!(rig.system.restarts, 0);
}

// ── End to end over the ThingsBoard MQTT session ─────────────

fn hex(bytes: &[u8; 32]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[test]
fn firmware_download_over_thingsboard_ends_in_restart() {
    let identity = DeviceIdentity::current();
    let config = GatewayConfig {
        ota: OtaParams {
            chunk_size: 16,
            ..OtaParams::default()
        },
        ..GatewayConfig::default()
    };
    let clock = ManualClock::default();
    let session = ThingsBoardSession::new(LoopbackTransport::new(), clock.clone(), "PT-100C7E");
    let mut net = GatewayNetwork::new(WifiLink::new(), session);
    let mut sensor = MockSensor::new(3.5);
    let mut system = MockSystem::default();
    let mut sink = RecordingSink::new();

    let mut service = GatewayService::boot(
        config,
        identity,
        &provisioned_store(),
        &mut net,
        &mut sensor,
        &mut system,
        &mut sink,
    );
    service.tick(0, &mut net, &mut sensor, &mut system, &mut sink);
    assert_eq!(service.connection_state(), ConnectionState::Connected);

    let tx = net.session.transport();
    let telemetry = tx.published_on(TELEMETRY_TOPIC);
    assert!(telemetry.iter().any(|p| p.contains("current_fw_version")));
    assert!(telemetry.iter().any(|p| p.contains(r#""current_fw_state":"UPDATED""#)));
    assert!(telemetry.iter().any(|p| p.contains("temperature_celsius")));

    // 200-byte image in 16-byte chunks: 13 progress callbacks.
    let image: Vec<u8> = (0..200u32).map(|i| (i * 7) as u8).collect();
    let descriptor = format!(
        r#"{{"shared":{{"fw_title":"{}","fw_version":"9.0.0","fw_size":{},"fw_checksum":"{}","fw_checksum_algorithm":"SHA256"}}}}"#,
        identity.title,
        image.len(),
        hex(&Hash::hash(&image))
    );
    net.session
        .transport()
        .inject("v1/devices/me/attributes/response/1", descriptor.as_bytes());
    service.tick(10, &mut net, &mut sensor, &mut system, &mut sink);
    assert!(net.session.updater().is_downloading());

    for (n, chunk) in image.chunks(16).enumerate() {
        clock.set(20 + n as u64);
        let topic = format!("v2/fw/response/2/chunk/{}", n);
        net.session.transport().inject(&topic, chunk);
        service.tick(20 + n as u64, &mut net, &mut sensor, &mut system, &mut sink);
    }

    assert_eq!(net.session.updater().ota().state(), OtaState::ReadyToReboot);
    assert_eq!(system.restarts, 1);

    let progress: Vec<String> = net.session.transport().published_on(ATTRIBUTES_TOPIC);
    assert_eq!(progress.len(), 1, "13 callbacks, one report");
    assert!(progress[0].starts_with(&format!(r#"{{"{}":"#, PROGRESS_ATTRIBUTE)));

    let states = net.session.transport().published_on(TELEMETRY_TOPIC);
    assert!(states.iter().any(|p| p.contains("DOWNLOADING")));
    assert!(states.iter().any(|p| p.contains("UPDATING")));
    assert!(!states.iter().any(|p| p.contains("FAILED")));
}

#[test]
fn one_poll_dispatches_at_most_the_per_poll_bound() {
    let mut rig = connected_rig();
    for i in 1..=UPDATE_EVENTS_PER_POLL as u32 + 8 {
        rig.net.queue_update(UpdateEvent::Progress { current: i, total: 100 });
    }
    rig.tick(1);
    assert_eq!(rig.net.progress_attributes().len(), UPDATE_EVENTS_PER_POLL / 10);
    assert_eq!(rig.net.polls, 2);
}
