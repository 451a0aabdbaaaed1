// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, str::FromStr};

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::warn;

use crate::models::{
    envelope::ParsedEnvelope,
    telemetry::{
        DeviceStatus, DirectList, MISSING_VALUE, MeasurementEntry, MeasurementList,
        is_numeric_unit, slugify,
    },
};

/// Prefix marking values that must be localized through the i18n map.
const I18N_PREFIX: &str = "I18N_";

/// Decodes a `real` / `real_battery` reply into readings. Display names are
/// localized through the properties map when a translation exists; slugs
/// derive from the resolved name.
pub fn decode_real(
    raw: &[u8],
    properties: &HashMap<String, String>,
) -> Result<Vec<DeviceStatus>> {
    let reply: ParsedEnvelope<MeasurementList> =
        serde_json::from_slice(raw).context("real reply did not match its schema")?;
    let now = Utc::now();

    Ok(reply
        .result_data
        .list
        .into_iter()
        .map(|entry| {
            let name = properties
                .get(&entry.data_name)
                .cloned()
                .unwrap_or_else(|| entry.data_name.clone());
            let slug = slugify(&name);
            let value = resolve_value(&entry, properties);
            DeviceStatus {
                name,
                slug,
                unit: entry.data_unit,
                value,
                timestamp: now,
            }
        })
        .collect())
}

/// Numeric units pass through raw (absent when the gateway sends `--`);
/// `I18N_` tokens localize; anything else passes through as-is.
fn resolve_value(
    entry: &MeasurementEntry,
    properties: &HashMap<String, String>,
) -> Option<String> {
    if is_numeric_unit(&entry.data_unit) {
        if entry.data_value == MISSING_VALUE {
            return None;
        }
        return Some(entry.data_value.clone());
    }
    if entry.data_value.starts_with(I18N_PREFIX) {
        return Some(
            properties
                .get(&entry.data_value)
                .cloned()
                .unwrap_or_else(|| entry.data_value.clone()),
        );
    }
    Some(entry.data_value.clone())
}

/// Decodes a `direct` (MPPT string) reply. Every entry yields three
/// readings: voltage, current, and their product as power in watts. Power
/// is absent when either factor is missing.
pub fn decode_direct(raw: &[u8]) -> Result<Vec<DeviceStatus>> {
    let reply: ParsedEnvelope<DirectList> =
        serde_json::from_slice(raw).context("direct reply did not match its schema")?;
    let now = Utc::now();

    let mut readings = Vec::with_capacity(reply.result_data.list.len() * 3);
    for entry in reply.result_data.list {
        let voltage = present(&entry.voltage);
        let current = present(&entry.current);

        let power = match (voltage, current) {
            (Some(v), Some(c)) => match (Decimal::from_str(v), Decimal::from_str(c)) {
                (Ok(volts), Ok(amps)) => Some(format!("{:.2}", volts * amps)),
                _ => {
                    warn!(name = %entry.name, voltage = %entry.voltage, current = %entry.current, "unparseable direct reading; omitting power");
                    None
                },
            },
            _ => None,
        };

        let name_v = format!("{} Voltage", entry.name);
        let name_a = format!("{} Current", entry.name);
        let name_w = format!("{} Power", entry.name);
        readings.push(DeviceStatus {
            slug: slugify(&name_v),
            name: name_v,
            unit: entry.voltage_unit.clone(),
            value: voltage.map(str::to_string),
            timestamp: now,
        });
        readings.push(DeviceStatus {
            slug: slugify(&name_a),
            name: name_a,
            unit: entry.current_unit.clone(),
            value: current.map(str::to_string),
            timestamp: now,
        });
        readings.push(DeviceStatus {
            slug: slugify(&name_w),
            name: name_w,
            unit: "W".to_string(),
            value: power,
            timestamp: now,
        });
    }
    Ok(readings)
}

fn present(value: &str) -> Option<&str> {
    (value != MISSING_VALUE && !value.is_empty()).then_some(value)
}
