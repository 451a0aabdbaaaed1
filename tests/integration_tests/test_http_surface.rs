// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tokio::net::TcpListener;
use winet_bridge_rs::{
    server::{AppState, router},
    session::commands::InverterCommander,
};

/// Serves the real router on an ephemeral port, no gateway session behind
/// it.
async fn spawn_server() -> Result<String> {
    let state = AppState {
        commander: Arc::new(InverterCommander::new()),
        db: None,
    };
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });
    Ok(base)
}

#[tokio::test]
async fn test_battery_command_without_session_is_a_500() -> Result<()> {
    let base = spawn_server().await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/battery/charge"))
        .json(&json!({"state": "charge", "power": "6.6"}))
        .send()
        .await?;
    assert_eq!(response.status(), 500);
    let body = response.text().await?;
    assert!(
        body.contains("no live gateway session"),
        "diagnostic body expected, got: {body}"
    );
    Ok(())
}

#[tokio::test]
async fn test_charge_without_power_is_rejected() -> Result<()> {
    let base = spawn_server().await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/battery/charge"))
        .json(&json!({"state": "charge"}))
        .send()
        .await?;
    assert_eq!(response.status(), 500);
    let body = response.text().await?;
    assert!(body.contains("power param cannot be empty"), "got: {body}");
    Ok(())
}

#[tokio::test]
async fn test_unknown_battery_state_is_a_client_error() -> Result<()> {
    let base = spawn_server().await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/battery/warp_drive"))
        .json(&json!({}))
        .send()
        .await?;
    assert!(
        response.status().is_client_error(),
        "unexpected status {}",
        response.status()
    );
    Ok(())
}

#[tokio::test]
async fn test_properties_without_database_is_a_500() -> Result<()> {
    let base = spawn_server().await?;
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/properties")).send().await?;
    assert_eq!(response.status(), 500);
    assert!(response.text().await?.contains("no database configured"));
    Ok(())
}

#[tokio::test]
async fn test_feedin_without_session_is_a_500() -> Result<()> {
    let base = spawn_server().await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/inverter/feedin"))
        .json(&json!({"disable": true}))
        .send()
        .await?;
    assert_eq!(response.status(), 500);
    Ok(())
}
