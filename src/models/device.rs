// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

use crate::models::{envelope::RequestHeader, stage::QueryStage};

#[derive(Debug, Clone, Serialize)]
pub struct DeviceListRequest {
    #[serde(flatten)]
    pub header: RequestHeader,
    pub is_check_token: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl DeviceListRequest {
    pub fn new(token: String) -> Self {
        Self {
            header: RequestHeader::new(QueryStage::Devicelist, token),
            is_check_token: "0".to_string(),
            kind: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceListResult {
    #[serde(default)]
    pub count: i32,
    #[serde(default)]
    pub list: Vec<DeviceListItem>,
}

/// One entry of a devicelist reply, verbatim from the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceListItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub dev_id: i64,
    #[serde(default)]
    pub dev_code: i64,
    #[serde(default)]
    pub dev_type: u16,
    #[serde(default)]
    pub dev_protocol: i32,
    #[serde(default, rename = "inv_type")]
    pub inverter_type: i32,
    #[serde(default)]
    pub dev_sn: String,
    #[serde(default)]
    pub dev_name: String,
    #[serde(default)]
    pub dev_model: String,
    #[serde(default)]
    pub port_name: String,
    #[serde(default)]
    pub phys_addr: String,
    #[serde(default)]
    pub logc_addr: String,
    #[serde(default)]
    pub link_status: i32,
    #[serde(default)]
    pub init_status: i32,
    #[serde(default)]
    pub dev_special: String,
}

/// Stable identity of a gateway device. Created the first time a device
/// shows up in a devicelist reply; the id survives reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Device {
    pub id: String,
    pub model: String,
    pub serial_number: String,
}

impl Device {
    pub fn from_list_item(item: &DeviceListItem) -> Self {
        Self {
            id: item.dev_id.to_string(),
            model: item.dev_model.clone(),
            serial_number: item.dev_sn.clone(),
        }
    }

    /// Identifier readings are filed under: model with dots stripped, then
    /// the serial number.
    pub fn identifier(&self) -> String {
        format!("{}_{}", self.model.replace('.', ""), self.serial_number)
    }
}

/// Telemetry request for one stage of one device. The gateway insists on the
/// `time123456` field name for the epoch-millisecond stamp.
#[derive(Debug, Clone, Serialize)]
pub struct RealRequest {
    #[serde(flatten)]
    pub header: RequestHeader,
    pub dev_id: String,
    #[serde(rename = "time123456")]
    pub time: String,
}

impl RealRequest {
    pub fn new(stage: QueryStage, dev_id: String, token: String, time: String) -> Self {
        Self {
            header: RequestHeader::new(stage, token),
            dev_id,
            time,
        }
    }
}
