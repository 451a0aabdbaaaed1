// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::Utc;

/// Current wall-clock time as the epoch-millisecond string the gateway
/// expects in `time123456` and `park_serial` request fields.
pub fn epoch_millis_string() -> String {
    Utc::now().timestamp_millis().to_string()
}
