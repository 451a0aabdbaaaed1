// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

use crate::models::stage::QueryStage;

/// The lang the gateway is always asked to answer in.
pub const ENGLISH_LANG: &str = "en_us";

/// Reply messages the session reacts to by name.
pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_LOGIN_TIMEOUT: &str = "login timeout";
pub const RESULT_USER_LIMIT: &str = "normal user limit";

/// Envelope header shared by every gateway message. Parsed first to learn
/// which service a reply belongs to; the full payload is then re-parsed as
/// [`ParsedEnvelope`] of the stage-specific body.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub result_code: i32,
    #[serde(default)]
    pub result_msg: String,
    #[serde(default)]
    pub result_data: EnvelopeData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvelopeData {
    #[serde(default)]
    pub service: QueryStage,
}

/// Envelope with the stage-specific body decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedEnvelope<T> {
    #[serde(default)]
    pub result_code: i32,
    #[serde(default)]
    pub result_msg: String,
    pub result_data: T,
}

/// Fields present on every request the client sends.
#[derive(Debug, Clone, Serialize)]
pub struct RequestHeader {
    pub lang: &'static str,
    pub service: &'static str,
    pub token: String,
}

impl RequestHeader {
    pub fn new(stage: QueryStage, token: String) -> Self {
        Self {
            lang: ENGLISH_LANG,
            service: stage.as_str(),
            token,
        }
    }
}
