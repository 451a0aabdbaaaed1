// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fmt::{self, Debug},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
    time::{MissedTickBehavior, interval},
};
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
    tungstenite::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{cfg::config::WinetConfig, client::common::io_with_timeout};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Fixed keepalive payload the gateway expects.
pub const PING_PAYLOAD: &str = "ping";

/// Capacity of the inbound frame channel between the read loop and the
/// session driver.
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// One item delivered by the read loop.
#[derive(Debug)]
pub enum Inbound {
    Frame(Bytes),
    /// The server closed the socket without an error. A clean close: logged,
    /// never fatal.
    Eof,
    Error(anyhow::Error),
}

/// A live WebSocket to the gateway.
///
/// There is exactly one write path: every sender goes through the mutex'd
/// sink half. Inbound frames are pumped by a spawned read loop into an mpsc
/// channel; a second task sends the keepalive ping. Cancelling the token
/// stops both tasks and rejects further writes, which makes `close`
/// idempotent.
pub struct WsConnection {
    writer: Mutex<WsSink>,
    cancel: CancellationToken,
    send_timeout: Duration,
}

impl fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConnection")
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}

impl WsConnection {
    /// Dials the gateway and spawns the read-loop and keepalive tasks.
    /// Returns the connection handle plus the inbound frame channel.
    pub async fn dial(
        cfg: &WinetConfig,
        cancel: CancellationToken,
    ) -> Result<(Arc<Self>, mpsc::Receiver<Inbound>)> {
        let url = cfg.websocket_url();
        debug!(%url, "dialing gateway");

        let connector = if cfg.ssl {
            // The WiNet-S serves a self-signed certificate. Verification is
            // disabled for this endpoint only, never for outbound API calls.
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .context("failed to build the TLS connector")?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let (stream, _response) =
            connect_async_tls_with_config(url.as_str(), None, false, connector)
                .await
                .with_context(|| format!("failed to dial {url}"))?;
        debug!(%url, "gateway connected");

        let (sink, source) = stream.split();
        let conn = Arc::new(Self {
            writer: Mutex::new(sink),
            cancel: cancel.clone(),
            send_timeout: cfg.send_timeout,
        });

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        tokio::spawn(read_loop(source, inbound_tx, cancel));
        tokio::spawn(keepalive(Arc::clone(&conn), cfg.ping_interval));

        Ok((conn, inbound_rx))
    }

    /// Serializes and sends one request. Concurrent callers are ordered by
    /// the writer mutex.
    pub async fn send_json<T: Serialize + Debug>(&self, request: &T) -> Result<()> {
        if self.cancel.is_cancelled() {
            bail!("connection closed");
        }
        let body = serde_json::to_string(request)
            .context("failed to serialize the request")?;
        debug!(request = ?request, "sending message");

        let mut writer = self.writer.lock().await;
        io_with_timeout(
            "websocket write",
            writer.send(Message::text(body)),
            self.send_timeout,
            &self.cancel,
        )
        .await
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops the read loop, the keepalive, and any blocked writer, then
    /// sends a close frame. Safe to call more than once.
    pub async fn close(&self) {
        self.cancel.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.send(Message::Close(None)).await {
            trace!(error = %e, "close frame not delivered");
        }
        if let Err(e) = writer.close().await {
            trace!(error = %e, "websocket sink close failed");
        }
    }
}

async fn read_loop(
    mut source: WsSource,
    inbound: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = source.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                let payload = Bytes::copy_from_slice(text.as_bytes());
                if inbound.send(Inbound::Frame(payload)).await.is_err() {
                    break;
                }
            },
            Some(Ok(Message::Binary(data))) => {
                let payload = Bytes::copy_from_slice(&data);
                if inbound.send(Inbound::Frame(payload)).await.is_err() {
                    break;
                }
            },
            Some(Ok(Message::Ping(_)) | Ok(Message::Pong(_))) => {
                trace!("websocket ping/pong");
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(frame = ?frame, "close frame received");
                let _ = inbound.send(Inbound::Eof).await;
                break;
            },
            Some(Ok(Message::Frame(_))) => {
                // Raw frames do not surface from a read.
            },
            Some(Err(e)) => {
                let _ = inbound.send(Inbound::Error(e.into())).await;
                break;
            },
            None => {
                let _ = inbound.send(Inbound::Eof).await;
                break;
            },
        }
    }
    debug!("read loop exited");
}

async fn keepalive(conn: Arc<WsConnection>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval fires immediately; harmless here.
    loop {
        tokio::select! {
            _ = conn.cancel.cancelled() => break,
            _ = ticker.tick() => {
                let mut writer = conn.writer.lock().await;
                if let Err(e) = writer.send(Message::text(PING_PAYLOAD)).await {
                    warn!(error = %e, "keepalive write failed");
                    break;
                }
                trace!("keepalive sent");
            }
        }
    }
}
