// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{
    db::Database,
    models::price::{CHANNEL_FEED_IN, CHANNEL_GENERAL, PricePoint},
    session::commands::InverterCommander,
};

/// Power used for a price-driven full charge, in kilowatts.
pub const FULL_CHARGE_POWER_KW: &str = "6.6";

/// Price-driven battery and feed-in control, run after every price refresh.
pub struct EnergyLogic {
    commander: Arc<InverterCommander>,
    db: Arc<Database>,
}

impl EnergyLogic {
    pub fn new(commander: Arc<InverterCommander>, db: Arc<Database>) -> Self {
        Self { commander, db }
    }

    /// Negative import price: charge hard while being paid to consume.
    /// Otherwise self-consume. Negative export price: cap feed-in.
    pub async fn next_best_action(&self) -> Result<()> {
        let now = Utc::now();
        let prices = self
            .db
            .prices_between(now - Duration::hours(1), now + Duration::hours(1))
            .await?;

        let Some(general) = current_price(&prices, CHANNEL_GENERAL, now) else {
            warn!("no current general price; leaving battery mode unchanged");
            return Ok(());
        };
        if general.per_kwh < Decimal::ZERO {
            info!(per_kwh = %general.per_kwh, "import price negative; forcing charge");
            if !self.commander.charge(FULL_CHARGE_POWER_KW).await? {
                warn!("charge command rejected");
                return Ok(());
            }
        } else if !self.commander.set_self_consumption().await? {
            warn!("self-consumption command rejected");
            return Ok(());
        }

        let Some(feed_in) = current_price(&prices, CHANNEL_FEED_IN, now) else {
            warn!("no current feed-in price; leaving feed-in limit unchanged");
            return Ok(());
        };
        let limited = feed_in.per_kwh < Decimal::ZERO;
        if !self.commander.set_feed_in_limit(limited).await? {
            warn!(limited, "feed-in limit command rejected");
        }
        Ok(())
    }
}

/// The non-forecast price whose interval covers `now` on the given channel.
pub fn current_price<'a>(
    prices: &'a [PricePoint],
    channel: &str,
    now: DateTime<Utc>,
) -> Option<&'a PricePoint> {
    prices.iter().find(|p| {
        p.channel_type == channel && !p.forecast && p.start_time < now && p.end_time > now
    })
}
