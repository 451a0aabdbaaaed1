// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Channel names as the price API reports them.
pub const CHANNEL_GENERAL: &str = "general";
pub const CHANNEL_FEED_IN: &str = "feedin";

/// One normalized price interval, persisted per channel.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PricePoint {
    pub per_kwh: Decimal,
    pub spot_per_kwh: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub forecast: bool,
    pub channel_type: String,
}
