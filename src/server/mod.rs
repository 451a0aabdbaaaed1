// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod model;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    db::Database,
    models::property::Property,
    server::model::{
        BatteryState, BatteryStatePayload, FeedInPayload, HistoryQuery, InverterState,
    },
    session::commands::InverterCommander,
};

/// How long draining connections may take after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub commander: Arc<InverterCommander>,
    pub db: Option<Arc<Database>>,
}

/// Command and query failures surface as 500 with a diagnostic body.
struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/battery/{state}", post(post_battery_state))
        .route("/inverter/feedin", post(post_inverter_feedin))
        .route("/inverter/{state}", post(post_inverter_state))
        .route("/properties", get(get_properties))
        .route("/property/{identifier}/{slug}", get(get_property_history))
        .with_state(state)
}

/// Binds the listen address and serves until cancelled, then drains within
/// the shutdown grace.
pub async fn serve(
    listen_addr: String,
    state: AppState,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!(addr = %listen_addr, "http server listening");

    let shutdown = cancel.clone();
    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    tokio::select! {
        res = server => res.context("http server failed"),
        _ = async { cancel.cancelled().await; sleep(SHUTDOWN_GRACE).await } => {
            warn!("http server did not drain within the shutdown grace");
            Ok(())
        },
    }
}

async fn post_battery_state(
    State(state): State<AppState>,
    Path(target): Path<BatteryState>,
    Json(payload): Json<BatteryStatePayload>,
) -> Result<&'static str, ApiError> {
    info!(state = %target, power = ?payload.power, "switching battery");
    let success = match target {
        BatteryState::SelfConsumption => state.commander.set_self_consumption().await?,
        BatteryState::Charge => {
            let power = payload.power.context("power param cannot be empty")?;
            state.commander.charge(&power).await?
        },
        BatteryState::Discharge => {
            let power = payload.power.context("power param cannot be empty")?;
            state.commander.discharge(&power).await?
        },
        BatteryState::Stop => state.commander.battery_stop().await?,
    };
    if !success {
        return Err(anyhow!("failed to switch battery to {target}").into());
    }
    Ok("success")
}

async fn post_inverter_state(
    State(state): State<AppState>,
    Path(target): Path<InverterState>,
) -> Result<&'static str, ApiError> {
    info!(state = %target, "switching inverter");
    let success = state
        .commander
        .set_inverter_power(target == InverterState::Off)
        .await?;
    if !success {
        return Err(anyhow!("failed to switch inverter {target}").into());
    }
    Ok("success")
}

async fn post_inverter_feedin(
    State(state): State<AppState>,
    Json(payload): Json<FeedInPayload>,
) -> Result<&'static str, ApiError> {
    info!(disable_feedin = payload.disable, "switching feed-in limit");
    let success = state.commander.set_feed_in_limit(payload.disable).await?;
    if !success {
        return Err(anyhow!("failed to set feed-in limitation").into());
    }
    Ok("success")
}

async fn get_properties(
    State(state): State<AppState>,
) -> Result<Json<Vec<Property>>, ApiError> {
    let db = state.db.as_ref().context("no database configured")?;
    Ok(Json(db.latest_properties().await?))
}

async fn get_property_history(
    State(state): State<AppState>,
    Path((identifier, slug)): Path<(String, String)>,
    Query(range): Query<HistoryQuery>,
) -> Result<Json<Vec<Property>>, ApiError> {
    let db = state.db.as_ref().context("no database configured")?;
    let properties = db
        .properties_between(&identifier, &slug, range.from, range.to)
        .await?;
    Ok(Json(properties))
}
