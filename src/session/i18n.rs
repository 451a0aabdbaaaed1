// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result};
use tracing::debug;

use crate::cfg::config::WinetConfig;

/// Fetches `en_US.properties` from the gateway. Called once per session;
/// the map localizes both display names and `I18N_` values. The gateway
/// serves this over its self-signed certificate, so verification is
/// disabled for this request only.
pub async fn fetch_properties(cfg: &WinetConfig) -> Result<HashMap<String, String>> {
    let url = cfg.properties_url();
    debug!(%url, "fetching i18n properties");

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(15))
        .build()
        .context("failed to build the properties HTTP client")?;

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("GET {url} failed"))?
        .error_for_status()
        .with_context(|| format!("GET {url} returned an error status"))?;
    let body = response
        .text()
        .await
        .context("failed to read the properties body")?;

    Ok(parse_properties(&body))
}

/// `key=value` per line; blank lines and comments are skipped, anything
/// without a separator is ignored.
pub fn parse_properties(body: &str) -> HashMap<String, String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                return None;
            }
            line.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}
