// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Named phase of the gateway protocol; every envelope carries one in
/// `result_data.service`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Connect,
    Login,
    Devicelist,
    Direct,
    Local,
    Notice,
    Statistics,
    Param,
    Real,
    RealBattery,
    /// Any service name this build does not know. Routed to a log line and
    /// otherwise ignored; never a reason to disconnect.
    #[serde(other)]
    #[default]
    Unknown,
}

impl QueryStage {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStage::Connect => "connect",
            QueryStage::Login => "login",
            QueryStage::Devicelist => "devicelist",
            QueryStage::Direct => "direct",
            QueryStage::Local => "local",
            QueryStage::Notice => "notice",
            QueryStage::Statistics => "statistics",
            QueryStage::Param => "param",
            QueryStage::Real => "real",
            QueryStage::RealBattery => "real_battery",
            QueryStage::Unknown => "unknown",
        }
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway device-type codes.
pub const DEV_TYPE_INVERTER: u16 = 35;
pub const DEV_TYPE_BATTERY: u16 = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Inverter,
    Battery,
    Other(u16),
}

impl DeviceType {
    pub fn from_code(code: u16) -> Self {
        match code {
            DEV_TYPE_INVERTER => DeviceType::Inverter,
            DEV_TYPE_BATTERY => DeviceType::Battery,
            other => DeviceType::Other(other),
        }
    }
}

/// Which telemetry stages are polled for a device type. Devices with an
/// empty stage list are skipped by the poller entirely.
pub fn stages_for(device_type: DeviceType) -> &'static [QueryStage] {
    match device_type {
        DeviceType::Battery => &[QueryStage::Real],
        DeviceType::Inverter => &[
            QueryStage::Real,
            QueryStage::RealBattery,
            QueryStage::Direct,
        ],
        DeviceType::Other(_) => &[],
    }
}
