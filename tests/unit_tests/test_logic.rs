// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use winet_bridge_rs::{logic::current_price, models::price::PricePoint};

fn point(
    channel: &str,
    forecast: bool,
    start_offset_min: i64,
    end_offset_min: i64,
    per_kwh: Decimal,
) -> PricePoint {
    let now = Utc::now();
    PricePoint {
        per_kwh,
        spot_per_kwh: per_kwh,
        start_time: now + Duration::minutes(start_offset_min),
        end_time: now + Duration::minutes(end_offset_min),
        duration_minutes: (end_offset_min - start_offset_min) as i32,
        forecast,
        channel_type: channel.to_string(),
    }
}

#[test]
fn test_current_price_picks_the_live_interval() {
    let now = Utc::now();
    let prices = vec![
        point("general", false, -60, -30, Decimal::new(40, 2)),
        point("general", false, -15, 15, Decimal::new(-5, 2)),
        point("general", false, 30, 60, Decimal::new(25, 2)),
    ];
    let current = current_price(&prices, "general", now).expect("live interval");
    assert_eq!(current.per_kwh, Decimal::new(-5, 2));
}

#[test]
fn test_current_price_skips_forecasts() {
    let now = Utc::now();
    let prices = vec![point("general", true, -15, 15, Decimal::new(10, 2))];
    assert!(current_price(&prices, "general", now).is_none());
}

#[test]
fn test_current_price_respects_the_channel() {
    let now = Utc::now();
    let prices = vec![
        point("feedin", false, -15, 15, Decimal::new(-3, 2)),
        point("general", false, -15, 15, Decimal::new(22, 2)),
    ];
    let feed_in = current_price(&prices, "feedin", now).expect("feed-in interval");
    assert_eq!(feed_in.per_kwh, Decimal::new(-3, 2));
}

#[test]
fn test_no_price_outside_the_window() {
    let now = Utc::now();
    let prices = vec![point("general", false, 10, 40, Decimal::new(22, 2))];
    assert!(current_price(&prices, "general", now).is_none());
}
