// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{db::Database, models::price::PricePoint};

/// Interval type discriminators as the API reports them.
const FORECAST_INTERVAL: &str = "ForecastInterval";

/// One electricity site tied to the account.
#[derive(Debug, Clone, Deserialize)]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub nmi: String,
    #[serde(default)]
    pub status: String,
}

/// Raw price interval from the API; actuals, currents, and forecasts share
/// this shape and differ in `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceInterval {
    #[serde(rename = "type")]
    kind: String,
    per_kwh: Decimal,
    #[serde(default)]
    spot_per_kwh: Decimal,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration: i32,
    #[serde(default)]
    channel_type: String,
}

/// Client for the Amber-style pricing API. Certificate verification stays
/// on here; only gateway endpoints may be self-signed.
pub struct AmberClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    sites: Vec<Site>,
}

impl AmberClient {
    /// Builds the client and discovers the account's sites.
    pub async fn new(base_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build the pricing HTTP client")?;
        let mut client = Self {
            http,
            base_url: base_url.to_string(),
            token: token.to_string(),
            sites: Vec::new(),
        };
        client.sites = client.fetch_sites().await?;
        for site in &client.sites {
            info!(site = %site.id, nmi = %site.nmi, "discovered pricing site");
        }
        Ok(client)
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    async fn fetch_sites(&self) -> Result<Vec<Site>> {
        let url = format!("{}/sites", self.base_url);
        let sites = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?
            .json::<Vec<Site>>()
            .await
            .context("sites reply did not match its schema")?;
        Ok(sites)
    }

    /// Current prices around now: ten intervals ahead, five behind, per
    /// channel, sorted by start time.
    pub async fn current_prices(&self, site_id: &str) -> Result<Vec<PricePoint>> {
        let url = format!("{}/sites/{site_id}/prices/current", self.base_url);
        let intervals = self
            .http
            .get(&url)
            .query(&[("next", "10"), ("previous", "5")])
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {url} returned an error status"))?
            .json::<Vec<PriceInterval>>()
            .await
            .context("prices reply did not match its schema")?;

        let mut prices: Vec<PricePoint> = intervals
            .into_iter()
            .map(|interval| PricePoint {
                per_kwh: interval.per_kwh,
                spot_per_kwh: interval.spot_per_kwh,
                start_time: interval.start_time,
                end_time: interval.end_time,
                duration_minutes: interval.duration,
                forecast: interval.kind == FORECAST_INTERVAL,
                channel_type: normalize_channel(&interval.channel_type),
            })
            .collect();
        prices.sort_by_key(|p| p.start_time);
        Ok(prices)
    }
}

/// The API spells the export channel `feedIn`; everything downstream keys
/// on lowercase names.
fn normalize_channel(channel: &str) -> String {
    channel.to_ascii_lowercase()
}

/// Fetches current prices for every site and persists them.
pub async fn refresh_prices(client: &AmberClient, db: &Database) -> Result<()> {
    for site in client.sites() {
        let prices = client.current_prices(&site.id).await?;
        debug!(site = %site.id, count = prices.len(), "persisting price intervals");
        db.upsert_prices(&prices).await?;
    }
    Ok(())
}
