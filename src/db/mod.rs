// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

use crate::models::{
    device::Device,
    price::PricePoint,
    property::{Property, PropertyRecord},
};

/// Default look-back window for property history queries.
const DEFAULT_HISTORY_DAYS: i64 = 2;

/// Readings older than this are removed by the nightly cleanup.
const RETENTION_DAYS: i64 = 8;

const CREATE_PROPERTY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS Property (
    id                  BIGSERIAL PRIMARY KEY,
    time_stamp          TIMESTAMP WITH TIME ZONE NOT NULL,
    unit_of_measurement TEXT NOT NULL,
    value               TEXT NOT NULL,
    identifier          TEXT NOT NULL,
    slug                TEXT NOT NULL
)";

const CREATE_DEVICE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS Device (
    id            TEXT PRIMARY KEY,
    model         TEXT,
    serial_number TEXT,
    created_at    TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
)";

const CREATE_PRICE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS AmberPrice (
    id           BIGSERIAL PRIMARY KEY,
    per_kwh      NUMERIC(10, 5) NOT NULL,
    spot_per_kwh NUMERIC(10, 5) NOT NULL,
    start_time   TIMESTAMP WITH TIME ZONE NOT NULL,
    end_time     TIMESTAMP WITH TIME ZONE NOT NULL,
    duration     INT NOT NULL,
    forecast     BOOL NOT NULL DEFAULT FALSE,
    channel_type TEXT NOT NULL,
    created_at   TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP,
    updated_at   TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
)";

const CREATE_INDEXES: [&str; 5] = [
    "CREATE INDEX IF NOT EXISTS idx_properties_identifier ON Property (identifier)",
    "CREATE INDEX IF NOT EXISTS idx_properties_timestamp ON Property (time_stamp)",
    "CREATE INDEX IF NOT EXISTS idx_amber_price_start_time ON AmberPrice (start_time)",
    "CREATE INDEX IF NOT EXISTS idx_amber_price_end_time ON AmberPrice (end_time)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_amber_price_unique_start_time_channel_type \
     ON AmberPrice (start_time, channel_type)",
];

/// Postgres persistence for readings, devices, and price intervals.
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connects and bootstraps the schema idempotently.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("failed to connect to postgres")?;
        let db = Self { pool };
        db.initialise().await?;
        Ok(db)
    }

    async fn initialise(&self) -> Result<()> {
        for ddl in [CREATE_PROPERTY_TABLE, CREATE_DEVICE_TABLE, CREATE_PRICE_TABLE] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .context("failed to create table")?;
        }
        for ddl in CREATE_INDEXES {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .context("failed to create index")?;
        }
        Ok(())
    }

    /// Batch insert of one publish cycle, all-or-nothing.
    pub async fn write_properties(&self, records: &[PropertyRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO Property (time_stamp, unit_of_measurement, value, identifier, slug) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(record.timestamp)
            .bind(&record.unit)
            .bind(&record.value)
            .bind(&record.identifier)
            .bind(&record.slug)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn register_device(&self, device: &Device) -> Result<()> {
        sqlx::query(
            "INSERT INTO Device (id, model, serial_number) VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING",
        )
        .bind(&device.id)
        .bind(&device.model)
        .bind(&device.serial_number)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// History for one sensor, newest first. Without an explicit range the
    /// last two days are returned.
    pub async fn properties_between(
        &self,
        identifier: &str,
        slug: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Property>> {
        let to = to.unwrap_or_else(Utc::now);
        let from = from.unwrap_or_else(|| to - Duration::days(DEFAULT_HISTORY_DAYS));
        let properties = sqlx::query_as::<_, Property>(
            "SELECT id, time_stamp, unit_of_measurement, value, identifier, slug \
             FROM Property \
             WHERE identifier = $1 AND slug = $2 AND time_stamp BETWEEN $3 AND $4 \
             ORDER BY time_stamp DESC",
        )
        .bind(identifier)
        .bind(slug)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(properties)
    }

    /// Latest reading of every sensor.
    pub async fn latest_properties(&self) -> Result<Vec<Property>> {
        let properties = sqlx::query_as::<_, Property>(
            "SELECT DISTINCT ON (slug) id, time_stamp, unit_of_measurement, value, identifier, slug \
             FROM Property \
             ORDER BY slug, time_stamp DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(properties)
    }

    pub async fn prices_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        let prices = sqlx::query_as::<_, PricePoint>(
            "SELECT per_kwh, spot_per_kwh, start_time, end_time, \
                    duration AS duration_minutes, forecast, channel_type \
             FROM AmberPrice \
             WHERE start_time BETWEEN $1 AND $2 \
             ORDER BY start_time DESC",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(prices)
    }

    /// Upserts price intervals on `(start_time, channel_type)`; forecasts
    /// are overwritten as actuals land.
    pub async fn upsert_prices(&self, prices: &[PricePoint]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for price in prices {
            sqlx::query(
                "INSERT INTO AmberPrice \
                 (per_kwh, spot_per_kwh, start_time, end_time, duration, forecast, channel_type) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (start_time, channel_type) DO UPDATE SET \
                 per_kwh = EXCLUDED.per_kwh, \
                 spot_per_kwh = EXCLUDED.spot_per_kwh, \
                 end_time = EXCLUDED.end_time, \
                 duration = EXCLUDED.duration, \
                 forecast = EXCLUDED.forecast, \
                 updated_at = CURRENT_TIMESTAMP",
            )
            .bind(price.per_kwh)
            .bind(price.spot_per_kwh)
            .bind(price.start_time)
            .bind(price.end_time)
            .bind(price.duration_minutes)
            .bind(price.forecast)
            .bind(&price.channel_type)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Removes readings past the retention window.
    pub async fn cleanup(&self) -> Result<()> {
        let cutoff = Utc::now() - Duration::days(RETENTION_DAYS);
        let result = sqlx::query("DELETE FROM Property WHERE time_stamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        debug!(removed = result.rows_affected(), "property cleanup done");
        Ok(())
    }
}
