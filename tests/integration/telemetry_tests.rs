//! Telemetry publisher: boot seed, period pacing, best-effort dropping and
//! raw forwarding of sensor faults.

use pt100_gateway::app::events::GatewayEvent;
use pt100_gateway::config::{CONNECTION_CHECK_MS, TELEMETRY_INTERVAL_MS};

use super::mock_ports::{MockNet, Rig};

const MINUTE: u64 = 60_000;

fn published(rig: &Rig) -> usize {
    rig.sink
        .count(|e| matches!(e, GatewayEvent::TelemetryPublished(_)))
}

#[test]
fn boot_seed_publishes_once_on_first_tick() {
    let mut rig = Rig::boot();
    rig.tick(0);
    assert_eq!(rig.net.telemetry, vec![r#"{"temperature_celsius":-18.25}"#]);

    let mut t = CONNECTION_CHECK_MS;
    while t < TELEMETRY_INTERVAL_MS {
        rig.tick(t);
        t += CONNECTION_CHECK_MS;
    }
    assert_eq!(rig.net.telemetry.len(), 1, "nothing before a full period");
    assert_eq!(rig.sensor.reads, 1);
}

#[test]
fn one_publish_at_first_tick_past_the_interval() {
    let mut rig = Rig::boot();
    rig.tick(0);
    assert_eq!(published(&rig), 1);

    // One tick per minute for 16 minutes.
    let mut published_at = Vec::new();
    for m in 1..=16 {
        let before = rig.net.telemetry.len();
        rig.tick(m * MINUTE);
        if rig.net.telemetry.len() > before {
            published_at.push(m);
        }
    }
    assert_eq!(published_at, vec![15]);
}

#[test]
fn late_tick_publishes_once_and_restarts_period_from_then() {
    let mut rig = Rig::boot();
    rig.tick(0);

    rig.tick(16 * MINUTE);
    assert_eq!(rig.net.telemetry.len(), 2);
    rig.tick(30 * MINUTE);
    assert_eq!(rig.net.telemetry.len(), 2);
    rig.tick(31 * MINUTE);
    assert_eq!(rig.net.telemetry.len(), 3);
}

#[test]
fn samples_read_while_disconnected_are_dropped_not_replayed() {
    let mut net = MockNet::new();
    net.fail_next_connects(1);
    let mut rig = Rig::boot_with(net);

    rig.tick(0);
    assert!(rig.net.telemetry.is_empty());
    assert_eq!(rig.sensor.reads, 1);
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, GatewayEvent::TelemetryDropped(_))),
        1
    );

    // Reconnects on the next check; the dropped sample never shows up.
    rig.tick(CONNECTION_CHECK_MS);
    assert!(rig.service.session_connected());
    assert!(rig.net.telemetry.is_empty());

    rig.tick(TELEMETRY_INTERVAL_MS);
    assert_eq!(rig.net.telemetry.len(), 1);
}

#[test]
fn never_published_while_session_flag_is_false() {
    let mut net = MockNet::new();
    net.fail_next_connects(100);
    let mut rig = Rig::boot_with(net);

    for m in 0..=45 {
        rig.tick(m * MINUTE);
    }
    assert!(rig.net.telemetry.is_empty());
    assert_eq!(published(&rig), 0);
    // Seed, then minutes 15, 30 and 45.
    assert_eq!(rig.sensor.reads, 4);
}

#[test]
fn sensor_faults_are_forwarded_raw() {
    let mut rig = Rig::boot();
    rig.sensor.set(-242.02, true);
    rig.tick(0);
    assert_eq!(rig.net.telemetry, vec![r#"{"temperature_celsius":-242.02}"#]);
    assert!(matches!(
        rig.sink.events.iter().find(|e| matches!(e, GatewayEvent::TelemetryPublished(_))),
        Some(GatewayEvent::TelemetryPublished(s)) if s.fault
    ));
}

#[test]
fn unreadable_sensor_publishes_null() {
    let mut rig = Rig::boot();
    rig.sensor.set(f32::NAN, true);
    rig.tick(0);
    assert_eq!(rig.net.telemetry, vec![r#"{"temperature_celsius":null}"#]);
}
