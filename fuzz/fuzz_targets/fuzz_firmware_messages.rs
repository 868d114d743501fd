//! Fuzz target: `FirmwareUpdater::on_message`
//!
//! Splits the input into (topic, payload) pairs and routes them through an
//! armed updater.  Malformed JSON, bogus chunk topics and oversized chunks
//! must never panic, and the OTA writer must never exceed the declared
//! image size.
//!
//! cargo fuzz run fuzz_firmware_messages

#![no_main]

use libfuzzer_sys::fuzz_target;
use pt100_gateway::adapters::thingsboard::firmware::FirmwareUpdater;
use pt100_gateway::adapters::thingsboard::transport::{LoopbackTransport, MqttTransport};
use pt100_gateway::app::update::{UpdateEvent, UpdateRequest};
use pt100_gateway::config::{DeviceIdentity, OtaParams};
use pt100_gateway::ota::OtaState;

const TOPICS: [&str; 4] = [
    "v1/devices/me/attributes",
    "v1/devices/me/attributes/response/1",
    "v2/fw/response/2/chunk/",
    "",
];

fuzz_target!(|data: &[u8]| {
    let mut tx = LoopbackTransport::new();
    if tx.open("fuzz", 1883, "PT-FUZZ", "token").is_err() {
        return;
    }
    let request = UpdateRequest {
        chunk_size: 64,
        ..UpdateRequest::new(&DeviceIdentity::current(), &OtaParams::default())
    };
    let mut updater = FirmwareUpdater::new();
    if updater.arm(request, &mut tx).is_err() {
        return;
    }

    let mut now = 0u64;
    for frame in data.split(|b| *b == 0xFF) {
        let Some((&selector, rest)) = frame.split_first() else {
            continue;
        };
        let topic = match TOPICS[usize::from(selector) % TOPICS.len()] {
            "" => String::from_utf8_lossy(rest.get(..8).unwrap_or(rest)).into_owned(),
            base if base.ends_with('/') => format!("{}{}", base, selector / 4),
            base => base.to_string(),
        };

        now += 1_000;
        let mut completed = 0;
        updater.on_message(&topic, rest, now, &mut tx, &mut |ev| {
            if let UpdateEvent::Progress { current, total } = ev {
                assert!(current <= total, "progress past declared size");
            } else {
                completed += 1;
            }
        });
        updater.on_tick(now, &mut tx, &mut |_| {});
        assert!(completed <= 1);

        if let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = updater.ota().state()
        {
            assert!(bytes_written <= expected_size);
        }
    }
});
