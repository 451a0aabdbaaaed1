// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::Serialize;

use crate::models::{device::Device, property::PropertyRecord, telemetry::is_text_sensor};

/// Home Assistant MQTT discovery config, published retained once per
/// device. The `~` key is the discovery base-topic shorthand.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryMessage {
    #[serde(rename = "~")]
    pub base_topic: String,
    pub name: String,
    #[serde(rename = "unique_id")]
    pub unique_id: String,
    pub state_topic: String,
    pub device: DiscoveryDevice,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryDevice {
    pub name: String,
    pub identifiers: Vec<String>,
    pub model: String,
    pub manufacturer: String,
}

impl DiscoveryMessage {
    pub fn for_device(device: &Device) -> Self {
        let identifier = device.identifier();
        let name = format!("{} {}", device.model, device.serial_number);
        Self {
            base_topic: format!("homeassistant/sensor/{identifier}"),
            name: name.clone(),
            unique_id: identifier.to_lowercase(),
            state_topic: "~/state".to_string(),
            device: DiscoveryDevice {
                name,
                identifiers: vec![identifier],
                model: device.model.clone(),
                manufacturer: "Sungrow".to_string(),
            },
        }
    }
}

/// State update for one sensor. Text sensors carry no unit.
#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
}

impl StatePayload {
    pub fn from_record(record: &PropertyRecord) -> Self {
        Self {
            value: record.value.clone(),
            unit_of_measurement: (!is_text_sensor(&record.slug))
                .then(|| record.unit.clone()),
        }
    }
}
