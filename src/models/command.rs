// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

use crate::models::envelope::RequestHeader;

/// `dev_code` every control request carries.
pub const PARAM_DEV_CODE: u16 = 3344;

/// Holding registers driven by the command issuer.
pub const PARAM_ADDR_ENERGY_MODE: u32 = 33146;
pub const PARAM_ADDR_CHARGE_COMMAND: u32 = 33147;
pub const PARAM_ADDR_CHARGE_POWER: u32 = 33148;
pub const PARAM_ADDR_FEED_IN_LIMIT: u32 = 31221;

/// Command codes written to the charge/discharge register.
pub const CHARGE_COMMAND_CODE: &str = "170";
pub const DISCHARGE_COMMAND_CODE: &str = "187";
pub const STOP_COMMAND_CODE: &str = "204";

/// Feed-in limitation register values.
pub const FEED_IN_LIMITED: &str = "170";
pub const FEED_IN_UNLIMITED: &str = "85";

/// Parameter-write control envelope (`service = "param"`, type 9).
#[derive(Debug, Clone, Serialize)]
pub struct InverterUpdateRequest {
    #[serde(flatten)]
    pub header: RequestHeader,
    #[serde(rename = "time123456")]
    pub time: String,
    pub park_serial: String,
    pub dev_code: u16,
    pub dev_type: u16,
    #[serde(rename = "devid_array")]
    pub dev_id_array: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub count: String,
    pub current_pack_num: u32,
    pub pack_num_total: u32,
    pub list: Vec<ParamWrite>,
}

/// One register write within an [`InverterUpdateRequest`].
#[derive(Debug, Clone, Serialize)]
pub struct ParamWrite {
    pub accuracy: u8,
    pub param_addr: u32,
    pub param_id: u32,
    pub param_type: u8,
    pub param_value: String,
    pub param_name: String,
}

/// Power-switch control envelope (`service = "param"`, type 3).
#[derive(Debug, Clone, Serialize)]
pub struct PowerSwitchRequest {
    #[serde(flatten)]
    pub header: RequestHeader,
    pub dev_code: u16,
    pub dev_type: u16,
    #[serde(rename = "devid_array")]
    pub dev_id_array: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub count: String,
    pub list: Vec<PowerSwitch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PowerSwitch {
    pub power_switch: String,
}

/// One entry of a param reply's `list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParamWriteResult {
    #[serde(default)]
    pub result: i32,
    #[serde(default)]
    pub param_pid: i64,
    #[serde(default)]
    pub param_id: i64,
    #[serde(default)]
    pub param_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParamReplyList {
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub list: Vec<ParamWriteResult>,
}
