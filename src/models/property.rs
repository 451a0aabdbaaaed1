// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One persisted reading, as served back over the HTTP surface.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Property {
    pub id: i64,
    #[sqlx(rename = "time_stamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "unit_of_measurement")]
    #[sqlx(rename = "unit_of_measurement")]
    pub unit: String,
    pub value: String,
    pub identifier: String,
    pub slug: String,
}

/// One canonicalized reading on its way to the sinks.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    pub timestamp: DateTime<Utc>,
    pub unit: String,
    pub value: String,
    pub identifier: String,
    pub slug: String,
}
