// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use serde_json::json;
use tokio::time::{Instant, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use winet_bridge_rs::{
    models::device::Device,
    publisher::{PublisherRegistry, Sink},
    session::{SessionExit, WinetSession},
};

use crate::integration_tests::common;

#[tokio::test]
async fn test_happy_path_registers_device_and_publishes_readings() -> Result<()> {
    let props_port = common::spawn_properties_server().await;
    let ws_port = common::spawn_gateway(|mut ws| async move {
        // Connect: empty token in, "T1" out.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "connect");
        assert_eq!(request["token"], "");
        assert_eq!(request["lang"], "en_us");
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "connect", "token": "T1"}
            }),
        )
        .await;

        // Login with the connect token; "T2" supersedes it.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "login");
        assert_eq!(request["token"], "T1");
        assert_eq!(request["username"], "admin");
        assert_eq!(request["passwd"], "pw8888");
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "login", "token": "T2"}
            }),
        )
        .await;

        // Device list: one inverter.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "devicelist");
        assert_eq!(request["token"], "T2");
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "devicelist", "count": 1, "list": [{
                    "id": 1,
                    "dev_id": 1,
                    "dev_type": 35,
                    "dev_model": "SH10.0RT",
                    "dev_sn": "A123"
                }]}
            }),
        )
        .await;

        // Real stage.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "real");
        assert_eq!(request["dev_id"], "1");
        assert_eq!(request["token"], "T2");
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

        // Battery view of the inverter.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "real_battery");
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "real_battery", "count": 0, "list": []}
            }),
        )
        .await;

        // MPPT strings.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "direct");
        common::send_json(
            &mut ws,
            json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": "direct", "count": 1, "list": [{
                    "name": "MPPT1",
                    "voltage": "350.0",
                    "voltage_unit": "V",
                    "current": "2.0",
                    "current_unit": "A"
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
        Arc::clone(&publisher),
        cancel.clone(),
    )
    .await
    .expect("session must connect");
    let run = tokio::spawn(session.run());

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        {
            let records = sink.records.lock().expect("records lock");
            let has_pv = records.iter().any(|r| r.slug == "pv_voltage");
            let has_power = records.iter().any(|r| r.slug == "mppt1_power");
            if has_pv && has_power {
                break;
            }
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for readings to be published"
        );
        sleep(Duration::from_millis(50)).await;
    }

    {
        let devices = sink.devices.lock().expect("devices lock");
        assert_eq!(devices.len(), 1, "device must be registered exactly once");
        assert_eq!(
            devices[0],
            Device {
                id: "1".to_string(),
                model: "SH10.0RT".to_string(),
                serial_number: "A123".to_string(),
            }
        );
    }
    {
        let records = sink.records.lock().expect("records lock");
        let pv = records
            .iter()
            .find(|r| r.slug == "pv_voltage")
            .expect("pv reading");
        assert_eq!(pv.value, "350.5000");
        assert_eq!(pv.unit, "V");
        assert_eq!(pv.identifier, "SH100RT_A123");

        let power = records
            .iter()
            .find(|r| r.slug == "mppt1_power")
            .expect("mppt power reading");
        assert_eq!(power.value, "700.0000");
        assert_eq!(power.unit, "W");
    }

    cancel.cancel();
    let exit = run.await.expect("session task");
    assert_eq!(exit, SessionExit::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_fragmented_connect_reply_still_advances_to_login() -> Result<()> {
    let props_port = common::spawn_properties_server().await;
    let (seen_login_tx, seen_login_rx) = tokio::sync::oneshot::channel();
    let ws_port = common::spawn_gateway(|mut ws| async move {
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "connect");

        // The connect reply, split mid-string across two frames.
        use futures_util::SinkExt;
        ws.send(Message::text(r#"{"result_code":1,"result_msg":"suc"#))
            .await
            .expect("send first fragment");
        ws.send(Message::text(
            r#"cess","result_data":{"service":"connect","token":"T1"}}"#,
        ))
        .await
        .expect("send second fragment");

        // Only a reassembled envelope gets the session here.
        let request = common::recv_request(&mut ws).await;
        assert_eq!(request["service"], "login");
        assert_eq!(request["token"], "T1");
        let _ = seen_login_tx.send(request);

        common::drain_politely(&mut ws).await;
    })
    .await;

    let publisher = Arc::new(PublisherRegistry::new(Vec::new()));
    let cancel = CancellationToken::new();
    let session = WinetSession::connect(
        common::winet_config(ws_port, props_port),
        publisher,
        cancel.clone(),
    )
    .await
    .expect("session must connect");
    let run = tokio::spawn(session.run());

    let login_request =
        tokio::time::timeout(Duration::from_secs(10), seen_login_rx)
            .await
            .expect("timed out waiting for the login request")
            .expect("gateway script ended early");
    assert_eq!(login_request["username"], "admin");

    cancel.cancel();
    run.await.expect("session task");
    Ok(())
}
