// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod mqtt;
pub mod postgres;

use std::{collections::HashMap, str::FromStr, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use crate::models::{
    device::Device,
    property::PropertyRecord,
    telemetry::{DeviceStatus, MISSING_VALUE, is_text_sensor},
};

/// A downstream consumer of readings. Sinks are registered once at startup
/// and never change afterwards.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;
    /// Idempotent: called at least once before the device's first reading.
    async fn register_device(&self, device: &Device) -> Result<()>;
    async fn write(&self, records: &[PropertyRecord]) -> Result<()>;
}

/// High-churn sensors that are filtered out before deduplication to cut
/// write volume.
pub const IGNORED_SLUGS: [&str; 24] = [
    "grid_frequency",
    "phase_a_voltage",
    "phase_a_current",
    "phase_a_backup_current",
    "phase_b_backup_current",
    "phase_c_backup_current",
    "phase_a_backup_voltage",
    "phase_b_backup_voltage",
    "phase_c_backup_voltage",
    "backup_frequency",
    "phase_a_backup_power",
    "phase_b_backup_power",
    "phase_c_backup_power",
    "total_backup_power",
    "meter_grid_freq",
    "reactive_power_uploaded_by_meter",
    "meter_phase_a_voltage",
    "meter_phase_b_voltage",
    "meter_phase_c_voltage",
    "meter_phase_a_current",
    "meter_phase_b_current",
    "meter_phase_c_current",
    "bus_voltate",
    "array_insulation_resistance",
];

/// Fan-out of readings to every registered sink.
///
/// An explicit value created at startup and passed into the session, not
/// process-global state. Canonicalizes units, defaults missing values,
/// drops ignored slugs, and suppresses readings whose canonical value
/// matches the last published one for the same `(device, slug)`.
pub struct PublisherRegistry {
    sinks: Vec<Arc<dyn Sink>>,
    last_values: DashMap<String, String>,
    registered: DashSet<String>,
}

impl PublisherRegistry {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self {
            sinks,
            last_values: DashMap::new(),
            registered: DashSet::new(),
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Announces a device to every sink. Repeat announcements for the same
    /// identifier are absorbed here; a failing sink is logged and skipped.
    pub async fn register_device(&self, device: &Device) -> Result<()> {
        if !self.registered.insert(device.identifier()) {
            return Ok(());
        }
        for sink in &self.sinks {
            if let Err(e) = sink.register_device(device).await {
                error!(sink = sink.name(), error = %e, device = %device.serial_number, "failed to register device");
                continue;
            }
            debug!(sink = sink.name(), device = %device.serial_number, "registered device");
        }
        Ok(())
    }

    /// Canonicalizes and deduplicates a batch, then hands the changed
    /// readings to each sink. A sink returning an error is logged and
    /// skipped; the others still run.
    pub async fn publish(
        &self,
        batch: &HashMap<Device, Vec<DeviceStatus>>,
    ) -> Result<()> {
        let mut records = Vec::new();
        for (device, statuses) in batch {
            let identifier = device.identifier();
            for status in statuses {
                if let Some(record) = self.normalize(&identifier, status) {
                    records.push(record);
                }
            }
        }
        if records.is_empty() {
            return Ok(());
        }

        for sink in &self.sinks {
            if let Err(e) = sink.write(&records).await {
                error!(sink = sink.name(), error = %e, "failed to publish batch");
                continue;
            }
            debug!(sink = sink.name(), count = records.len(), "updated sensors");
        }
        Ok(())
    }

    /// Filters, canonicalizes, and deduplicates one reading.
    fn normalize(&self, identifier: &str, status: &DeviceStatus) -> Option<PropertyRecord> {
        if IGNORED_SLUGS.contains(&status.slug.as_str()) {
            return None;
        }

        let (value, unit) = canonicalize(status);
        let key = format!("{identifier}_{}", status.slug);
        match self.last_values.insert(key, value.clone()) {
            Some(previous) if previous.eq_ignore_ascii_case(&value) => return None,
            Some(_) => {
                debug!(device = identifier, sensor = %status.slug, value = %value, "sensor changed");
            },
            None => {
                info!(device = identifier, sensor = %status.slug, value = %value, "configured sensor");
            },
        }

        Some(PropertyRecord {
            timestamp: status.timestamp,
            unit,
            value,
            identifier: identifier.to_string(),
            slug: status.slug.clone(),
        })
    }
}

/// Canonical value and unit of a reading. Text sensors pass through
/// untouched. Numeric readings default to `0.00` when absent, and units
/// collapse onto the canonical set: kWp to kW, ℃ to °C, kvar to var and
/// kVA to VA with the value scaled accordingly. Applying this twice changes
/// nothing.
pub fn canonicalize(status: &DeviceStatus) -> (String, String) {
    if is_text_sensor(&status.slug) {
        return (
            status.value.clone().unwrap_or_default(),
            status.unit.clone(),
        );
    }

    let raw = match &status.value {
        Some(v) if v != MISSING_VALUE => v.clone(),
        _ => "0.00".to_string(),
    };
    let mut value = Decimal::from_str(&raw).unwrap_or_default();

    let unit = match status.unit.as_str() {
        "kWp" => "kW".to_string(),
        "℃" => "°C".to_string(),
        "kvar" => {
            value *= Decimal::from(1000);
            "var".to_string()
        },
        "kVA" => {
            value *= Decimal::from(1000);
            "VA".to_string()
        },
        other => other.to_string(),
    };

    (format!("{value:.4}"), unit)
}
