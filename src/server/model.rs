// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    SelfConsumption,
    Charge,
    Discharge,
    Stop,
}

impl fmt::Display for BatteryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatteryState::SelfConsumption => "self_consumption",
            BatteryState::Charge => "charge",
            BatteryState::Discharge => "discharge",
            BatteryState::Stop => "stop",
        })
    }
}

/// Body of `POST /battery/{state}`. The path names the target state; the
/// body carries the optional power in kilowatts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatteryStatePayload {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub power: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InverterState {
    On,
    Off,
}

impl fmt::Display for InverterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InverterState::On => "on",
            InverterState::Off => "off",
        })
    }
}

/// Body of `POST /inverter/feedin`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedInPayload {
    pub disable: bool,
}

/// Query range of `GET /property/{identifier}/{slug}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}
