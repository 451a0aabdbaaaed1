// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

use crate::models::{envelope::RequestHeader, stage::QueryStage};

/// First request on a fresh socket; the token is always empty here.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectRequest {
    #[serde(flatten)]
    pub header: RequestHeader,
}

impl ConnectRequest {
    pub fn new() -> Self {
        Self {
            header: RequestHeader::new(QueryStage::Connect, String::new()),
        }
    }
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    #[serde(flatten)]
    pub header: RequestHeader,
    #[serde(rename = "passwd")]
    pub password: String,
    pub username: String,
}

impl LoginRequest {
    pub fn new(username: &str, password: &str, token: String) -> Self {
        Self {
            header: RequestHeader::new(QueryStage::Login, token),
            password: password.to_string(),
            username: username.to_string(),
        }
    }
}

/// Body of both the connect and the login reply; each carries the token the
/// session must use from that point on.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
    #[serde(default)]
    pub service: String,
    pub token: String,
    #[serde(default)]
    pub uid: i32,
    #[serde(default)]
    pub tips_disable: i32,
    #[serde(default)]
    pub virgin_flag: i32,
    #[serde(default, rename = "isFirstLogin")]
    pub is_first_login: i32,
    #[serde(default, rename = "forceModifyPasswd")]
    pub force_modify_passwd: i32,
}

pub type ConnectResult = LoginResult;
