// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Value the gateway sends when a sensor has no reading.
pub const MISSING_VALUE: &str = "--";

/// Units whose readings are numeric. Everything else is either an `I18N_`
/// token to localize or free text. The gateway emits both `℃` and `°C`.
pub const NUMERIC_UNITS: [&str; 13] = [
    "A", "%", "kW", "W", "kWh", "°C", "℃", "V", "kvar", "var", "Hz", "kVA", "kΩ",
];

pub fn is_numeric_unit(unit: &str) -> bool {
    NUMERIC_UNITS.contains(&unit)
}

/// Slugs whose values are text, not numbers; they bypass numeric
/// canonicalization entirely.
pub const TEXT_SENSOR_SLUGS: [&str; 2] = ["battery_operation_status", "running_status"];

pub fn is_text_sensor(slug: &str) -> bool {
    TEXT_SENSOR_SLUGS.contains(&slug)
}

/// One entry of a real / real_battery reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeasurementEntry {
    #[serde(default)]
    pub data_name: String,
    #[serde(default)]
    pub data_value: String,
    #[serde(default)]
    pub data_unit: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeasurementList {
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub list: Vec<MeasurementEntry>,
}

/// One MPPT string entry of a direct reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub voltage: String,
    #[serde(default)]
    pub voltage_unit: String,
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub current_unit: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectList {
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub list: Vec<DirectEntry>,
}

/// One normalized sensor reading, produced by the decoder and consumed by
/// the publisher. `value` is `None` when the gateway reported `--`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub name: String,
    pub slug: String,
    pub unit: String,
    pub value: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Deterministic slug of a display name: lowercase, every run of
/// non-alphanumerics collapsed to one underscore, no leading or trailing
/// underscore.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}
