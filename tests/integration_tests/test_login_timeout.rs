// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use winet_bridge_rs::{
    publisher::PublisherRegistry,
    session::{SessionExit, WinetSession},
};

use crate::integration_tests::common;

#[tokio::test]
async fn test_login_timeout_tears_the_session_down() -> Result<()> {
    let props_port = common::spawn_properties_server().await;
    let ws_port = common::spawn_gateway(|mut ws| async move {
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "connect");
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "connect", "token": "T1"}
            }),
        )
        .await;

        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "login");
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "login", "token": "T2"}
            }),
        )
        .await;

        // Mid-protocol the gateway declares the token dead.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "devicelist");
        common::send_json(
            &mut ws,
            json!({
                "result_code": 100,
                "result_msg": "login timeout",
                "result_data": {"service": "real"}
            }),
        )
        .await;

        common::drain_politely(&mut ws).await;
    })
    .await;

    let publisher = Arc::new(PublisherRegistry::new(Vec::new()));
    let cancel = CancellationToken::new();
    let session = WinetSession::connect(
        common::winet_config(ws_port, props_port),
        Arc::clone(&publisher),
        cancel.clone(),
    )
    .await
    .expect("session must connect");

    let exit = tokio::time::timeout(Duration::from_secs(10), session.run())
        .await
        .expect("session must end on a login timeout");
    assert_eq!(exit, SessionExit::LoginTimeout);

    // The next session starts from scratch: fresh dial, empty token.
    let props_port = common::spawn_properties_server().await;
    let ws_port = common::spawn_gateway(|mut ws| async move {
        common::drain_politely(&mut ws).await;
    })
    .await;
    let session = WinetSession::connect(
        common::winet_config(ws_port, props_port),
        publisher,
        cancel,
    )
    .await
    .expect("reconnect must succeed");
    assert_eq!(session.handle().state.token.lock().await.as_str(), "");
    Ok(())
}
