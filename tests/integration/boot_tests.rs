//! Boot sequence: credentials, blocking initial connect, sensor init and
//! the first-iteration seeds.

use pt100_gateway::adapters::nvs::NvsCredentialStore;
use pt100_gateway::app::credentials::{KEY_CHANNEL, KEY_MAC};
use pt100_gateway::app::events::{ConnectionState, GatewayEvent};
use pt100_gateway::app::service::GatewayService;
use pt100_gateway::config::{DeviceIdentity, GatewayConfig, LINK_REBEGIN_POLLS};
use pt100_gateway::error::LinkError;

use super::mock_ports::{
    MockNet, MockSensor, MockSystem, RecordingSink, Rig, TOKEN, provisioned_store,
};

#[test]
fn boot_loads_credentials_and_brings_link_up() {
    let rig = Rig::boot_with(MockNet::link_up_after(3));

    assert_eq!(rig.net.begins.len(), 1);
    assert_eq!(rig.net.begins[0].ssid.as_str(), "ColdRoom-AP");
    assert_eq!(rig.service.credentials().password.as_str(), "freezer-pass");
    assert_eq!(rig.state(), ConnectionState::LinkUp);

    // Two unsuccessful polls, each followed by the retry delay.
    assert_eq!(rig.system.delay_calls, 2);
    assert!(rig.sink.events.contains(&GatewayEvent::LinkRestored { polls: 2 }));
}

#[test]
fn boot_initialises_sensor_once_and_announces_identity_last() {
    let rig = Rig::boot();
    assert_eq!(rig.sensor.begins, 1);
    assert_eq!(rig.sensor.reads, 0);
    assert_eq!(
        rig.sink.events.last(),
        Some(&GatewayEvent::Booted(DeviceIdentity::current()))
    );
    assert_eq!(rig.net.connects, 0, "session is left to the supervisor");
}

#[test]
fn sensor_init_failure_is_not_fatal() {
    let mut net = MockNet::new();
    let mut sensor = MockSensor::new(0.0);
    sensor.fail_begin = true;
    let mut system = MockSystem::default();
    let mut sink = RecordingSink::new();

    let mut service = GatewayService::boot(
        GatewayConfig::default(),
        DeviceIdentity::current(),
        &provisioned_store(),
        &mut net,
        &mut sensor,
        &mut system,
        &mut sink,
    );
    service.tick(0, &mut net, &mut sensor, &mut system, &mut sink);
    assert_eq!(net.telemetry.len(), 1);
}

/// An unprovisioned store yields empty credentials.  The link layer
/// rejects them and the boot spin keeps re-issuing the request; on real
/// hardware it never returns.  Here the mock link eventually comes up so
/// the spin can be observed.
#[test]
fn empty_credentials_attempt_link_with_empty_strings() {
    let store = NvsCredentialStore::new().unwrap();
    let mut net = MockNet::link_up_after(45);
    let mut sensor = MockSensor::new(0.0);
    let mut system = MockSystem::default();
    let mut sink = RecordingSink::new();

    let service = GatewayService::boot(
        GatewayConfig::default(),
        DeviceIdentity::current(),
        &store,
        &mut net,
        &mut sensor,
        &mut system,
        &mut sink,
    );

    assert!(service.credentials().ssid.is_empty());
    assert!(service.credentials().password.is_empty());
    assert!(net.begins.iter().all(|c| c.ssid.is_empty() && c.password.is_empty()));

    // 44 failed polls: the initial request plus one every LINK_REBEGIN_POLLS.
    assert_eq!(system.delay_calls, 44);
    assert_eq!(net.begins.len(), 1 + (44 / LINK_REBEGIN_POLLS) as usize);
    assert_eq!(
        sink.count(|e| matches!(e, GatewayEvent::LinkBeginFailed(LinkError::InvalidConfig))),
        net.begins.len()
    );
}

#[test]
fn missing_token_connects_with_empty_token() {
    let mut store = NvsCredentialStore::new().unwrap();
    store.seed_str("ssid", "ColdRoom-AP");
    let mut net = MockNet::new();
    let mut sensor = MockSensor::new(0.0);
    let mut system = MockSystem::default();
    let mut sink = RecordingSink::new();

    let mut service = GatewayService::boot(
        GatewayConfig::default(),
        DeviceIdentity::current(),
        &store,
        &mut net,
        &mut sensor,
        &mut system,
        &mut sink,
    );
    service.tick(0, &mut net, &mut sensor, &mut system, &mut sink);
    assert_eq!(net.connects, 1);
    assert_eq!(net.last_token, "");
}

#[test]
fn pinned_bssid_and_channel_reach_the_link() {
    let mut store = provisioned_store();
    store.seed_bytes(KEY_MAC, &[0x24, 0x6F, 0x28, 0x01, 0x02, 0x03]);
    store.seed_i32(KEY_CHANNEL, 6);
    let mut net = MockNet::new();
    let mut sensor = MockSensor::new(0.0);
    let mut system = MockSystem::default();
    let mut sink = RecordingSink::new();

    let _service = GatewayService::boot(
        GatewayConfig::default(),
        DeviceIdentity::current(),
        &store,
        &mut net,
        &mut sensor,
        &mut system,
        &mut sink,
    );
    assert_eq!(net.begins[0].bssid, Some([0x24, 0x6F, 0x28, 0x01, 0x02, 0x03]));
    assert_eq!(net.begins[0].channel, Some(6));
}

#[test]
fn first_tick_connects_and_publishes() {
    let mut rig = Rig::boot();
    rig.tick(0);
    assert_eq!(rig.net.connects, 1);
    assert_eq!(rig.net.last_token, TOKEN);
    assert_eq!(rig.state(), ConnectionState::Connected);
    assert_eq!(rig.net.telemetry.len(), 1);
}
