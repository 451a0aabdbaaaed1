// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::Mutex,
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use axum::{Router, routing::get};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use winet_bridge_rs::{
    cfg::config::WinetConfig,
    models::{device::Device, property::PropertyRecord},
    publisher::Sink,
};

/// The slice of `en_US.properties` the scripted gateway serves.
pub const PROPERTIES_BODY: &str = "I18N_COMMON_PV_VOLT=PV Voltage\n\
I18N_COMMON_TOTAL_DCPOWER=Total DC Power\n\
I18N_COMMON_STATUS_RUNNING=Running\n";

pub type ServerWs = WebSocketStream<TcpStream>;

/// Serves `/i18n/en_US.properties` the way the gateway does. Returns the
/// bound port.
pub async fn spawn_properties_server() -> u16 {
    let app = Router::new().route(
        "/i18n/en_US.properties",
        get(|| async { PROPERTIES_BODY }),
    );
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind properties server");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    port
}

/// Accepts one WebSocket connection and hands it to the scripted gateway.
/// Returns the bound port.
pub async fn spawn_gateway<F, Fut>(script: F) -> u16
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock gateway");
    let port = listener.local_addr().expect("local addr").port();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let ws = accept_async(stream).await.expect("websocket accept");
            script(ws).await;
        }
    });
    port
}

/// Next client request as JSON, skipping keepalive pings.
pub async fn recv_request(ws: &mut ServerWs) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a request")
            .expect("connection ended while awaiting a request")
            .expect("websocket error while awaiting a request");
        match message {
            Message::Text(text) => {
                if text.as_str() == "ping" {
                    continue;
                }
                return serde_json::from_str(text.as_str())
                    .expect("client request must be JSON");
            },
            Message::Ping(_) | Message::Pong(_) => {},
            other => panic!("unexpected message from client: {other:?}"),
        }
    }
}

pub async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("send reply");
}

/// Replies to any telemetry or devicelist request with an empty success
/// body, keeping the client's poll loop content until the test finishes.
pub async fn drain_politely(ws: &mut ServerWs) {
    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else { continue };
        if text.as_str() == "ping" {
            continue;
        }
        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let service = request["service"].as_str().unwrap_or_default().to_string();
        if service.is_empty() {
            continue;
        }
        send_json(
            ws,
            serde_json::json!({
                "result_code": 1,
                "result_msg": "success",
                "result_data": {"service": service, "count": 0, "list": []}
            }),
        )
        .await;
    }
}

/// Session config pointed at the scripted gateway.
pub fn winet_config(ws_port: u16, props_port: u16) -> WinetConfig {
    WinetConfig {
        host: "127.0.0.1".to_string(),
        username: "admin".to_string(),
        password: "pw8888".to_string(),
        ssl: false,
        poll_interval: Duration::from_secs(1),
        ping_interval: Duration::from_secs(30),
        send_timeout: Duration::from_secs(5),
        dial_retries: 2,
        websocket_port: Some(ws_port),
        properties_port: Some(props_port),
    }
}

/// Sink that remembers everything it was given.
#[derive(Default)]
pub struct RecordingSink {
    pub devices: Mutex<Vec<Device>>,
    pub records: Mutex<Vec<PropertyRecord>>,
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn register_device(&self, device: &Device) -> Result<()> {
        self.devices
            .lock()
            .expect("devices lock")
            .push(device.clone());
        Ok(())
    }

    async fn write(&self, records: &[PropertyRecord]) -> Result<()> {
        self.records
            .lock()
            .expect("records lock")
            .extend(records.iter().cloned());
        Ok(())
    }
}
