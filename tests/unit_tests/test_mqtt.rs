// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use winet_bridge_rs::{
    models::{
        device::Device,
        mqtt::{DiscoveryMessage, StatePayload},
        property::PropertyRecord,
    },
    publisher::mqtt::{discovery_topic, state_topic},
};

fn device() -> Device {
    Device {
        id: "1".to_string(),
        model: "SH10.0RT".to_string(),
        serial_number: "A123".to_string(),
    }
}

fn record(slug: &str, unit: &str, value: &str) -> PropertyRecord {
    PropertyRecord {
        timestamp: Utc::now(),
        unit: unit.to_string(),
        value: value.to_string(),
        identifier: device().identifier(),
        slug: slug.to_string(),
    }
}

#[test]
fn test_discovery_message_shape() -> Result<()> {
    let json: Value = serde_json::to_value(DiscoveryMessage::for_device(&device()))?;
    assert_eq!(json["~"], "homeassistant/sensor/SH100RT_A123");
    assert_eq!(json["name"], "SH10.0RT A123");
    assert_eq!(json["unique_id"], "sh100rt_a123");
    assert_eq!(json["state_topic"], "~/state");
    assert_eq!(json["device"]["name"], "SH10.0RT A123");
    assert_eq!(json["device"]["identifiers"][0], "SH100RT_A123");
    assert_eq!(json["device"]["model"], "SH10.0RT");
    assert_eq!(json["device"]["manufacturer"], "Sungrow");
    Ok(())
}

#[test]
fn test_topic_layout() {
    assert_eq!(
        discovery_topic(&device()),
        "homeassistant/sensor/SH100RT_A123/config"
    );
    assert_eq!(
        state_topic(&record("pv_voltage", "V", "350.5000")),
        "homeassistant/sensor/SH100RT_A123/pv_voltage/state"
    );
}

#[test]
fn test_state_payload_carries_a_unit_for_numeric_sensors() -> Result<()> {
    let json: Value =
        serde_json::to_value(StatePayload::from_record(&record("pv_voltage", "V", "350.5000")))?;
    assert_eq!(json["value"], "350.5000");
    assert_eq!(json["unit_of_measurement"], "V");
    Ok(())
}

#[test]
fn test_state_payload_omits_the_unit_for_text_sensors() -> Result<()> {
    let json: Value = serde_json::to_value(StatePayload::from_record(&record(
        "running_status",
        "",
        "Running",
    )))?;
    assert_eq!(json["value"], "Running");
    assert!(json.get("unit_of_measurement").is_none());
    Ok(())
}
