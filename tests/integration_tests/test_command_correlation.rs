// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use serde_json::json;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use winet_bridge_rs::{
    publisher::{PublisherRegistry, Sink},
    session::{WinetSession, commands::InverterCommander},
};

use crate::integration_tests::common;

/// A feed-in command issued while a real reply is in flight: the telemetry
/// is decoded and published, and the following param reply resolves the
/// command future, not the poll cycle.
#[tokio::test]
async fn test_command_reply_correlates_while_polling() -> Result<()> {
    let props_port = common::spawn_properties_server().await;
    let (real_seen_tx, real_seen_rx) = tokio::sync::oneshot::channel::<()>();
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

        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "devicelist");
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "devicelist", "count": 1, "list": [{
                    "dev_id": 1,
                    "dev_type": 35,
                    "dev_model": "SH10.0RT",
                    "dev_sn": "A123"
                }]}
            }),
        )
        .await;

        // Hold the real reply: the test issues its command now.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "real");
        let _ = real_seen_tx.send(());

        // The command arrives on the same socket while real is in flight.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "param");
        assert_eq!(request["dev_code"], 3344);
        assert_eq!(request["type"], "9");
        assert_eq!(request["list"][0]["param_addr"], 31221);
        assert_eq!(request["list"][0]["param_value"], "170");

        // Telemetry first, then the param reply.
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "real", "count": 1, "list": [{
                    "data_name": "I18N_COMMON_PV_VOLT",
                    "data_value": "350.5",
                    "data_unit": "V"
                }]}
            }),
        )
        .await;
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "param", "count": 1, "list": [{
                    "param_id": 13,
                    "param_pid": 31221,
                    "result": 0
                }]}
            }),
        )
        .await;

        common::drain_politely(&mut ws).await;
    })
    .await;

    let sink = Arc::new(common::RecordingSink::default());
    let publisher = Arc::new(PublisherRegistry::new(vec![
        Arc::clone(&sink) as Arc<dyn Sink>
    ]));
    let cancel = CancellationToken::new();
    let session = WinetSession::connect(
        common::winet_config(ws_port, props_port),
        publisher,
        cancel.clone(),
    )
    .await
    .expect("session must connect");

    let commander = Arc::new(InverterCommander::new());
    commander.attach(session.handle()).await;
    let run = tokio::spawn(session.run());

    tokio::time::timeout(Duration::from_secs(10), real_seen_rx)
        .await
        .expect("timed out waiting for the real request")
        .expect("gateway script ended early");

    let success = commander.set_feed_in_limit(true).await?;
    assert!(success, "the param reply must resolve the command");

    // The real reply issued alongside still landed as telemetry.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        {
            let records = sink.records.lock().expect("records lock");
            if records.iter().any(|r| r.slug == "pv_voltage") {
                break;
            }
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for the telemetry reading"
        );
        sleep(Duration::from_millis(50)).await;
    }

    cancel.cancel();
    run.await.expect("session task");
    Ok(())
}
