// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod commands;
pub mod decoder;
pub mod handlers;
pub mod i18n;
pub mod poller;

use std::{
    collections::HashMap,
    sync::{Arc, atomic::AtomicBool},
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cfg::config::WinetConfig,
    client::{
        reassembly::FrameBuffer,
        transport::{Inbound, WsConnection},
    },
    models::{
        auth::ConnectRequest,
        command::ParamReplyList,
        envelope::{
            Envelope, ParsedEnvelope, RESULT_LOGIN_TIMEOUT, RESULT_SUCCESS,
            RESULT_USER_LIMIT,
        },
        stage::QueryStage,
    },
    publisher::PublisherRegistry,
    session::{
        commands::{ParamOutcome, PendingCommands},
        poller::PollTicket,
    },
};

/// Why a session ended. Both reasons lead the supervisor back to a fresh
/// dial; they differ only in logging and in what the tests assert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// The gateway reported `login timeout`; the session token is dead.
    LoginTimeout,
    /// The transport ended: clean close, EOF, read/write error, or local
    /// cancellation.
    Disconnected,
}

/// Failure to bring a session up. Dial failures are retried by the
/// supervisor; a properties failure is fatal.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to fetch the gateway i18n properties: {0}")]
    Properties(anyhow::Error),
    #[error("failed to dial the gateway: {0}")]
    Dial(anyhow::Error),
}

/// State shared between the session driver, the poller, and the command
/// issuer. Recreated from scratch on every dial: the token starts empty and
/// the pending-command table never outlives its session.
#[derive(Debug, Default)]
pub struct SessionState {
    pub token: Mutex<String>,
    pub pending: PendingCommands,
    pub poll_slot: Mutex<Option<PollTicket>>,
    pub poll_cycle_running: AtomicBool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// What the command issuer needs from a live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub conn: Arc<WsConnection>,
    pub state: Arc<SessionState>,
}

/// One protocol session over one WebSocket.
///
/// Owns the connection outright; stage handlers are methods over
/// `(session, envelope)` with no back-references. Stages progress
/// reply-driven: connect stores the first token and sends login, login
/// stores the final token and sends devicelist, devicelist starts the poll
/// cycle.
pub struct WinetSession {
    cfg: WinetConfig,
    conn: Arc<WsConnection>,
    state: Arc<SessionState>,
    properties: Arc<HashMap<String, String>>,
    publisher: Arc<PublisherRegistry>,
    inbound: mpsc::Receiver<Inbound>,
    cancel: CancellationToken,
    connected_at: DateTime<Utc>,
}

impl WinetSession {
    /// Fetches the i18n map and dials the gateway. The returned session has
    /// not sent anything yet; [`run`](Self::run) drives the protocol.
    pub async fn connect(
        cfg: WinetConfig,
        publisher: Arc<PublisherRegistry>,
        cancel: CancellationToken,
    ) -> Result<Self, ConnectError> {
        let properties = i18n::fetch_properties(&cfg)
            .await
            .map_err(ConnectError::Properties)?;
        info!(entries = properties.len(), "loaded i18n properties");

        let (conn, inbound) = WsConnection::dial(&cfg, cancel.clone())
            .await
            .map_err(ConnectError::Dial)?;

        Ok(Self {
            cfg,
            conn,
            state: Arc::new(SessionState::new()),
            properties: Arc::new(properties),
            publisher,
            inbound,
            cancel,
            connected_at: Utc::now(),
        })
    }

    /// Handle for issuing control commands on this session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            conn: Arc::clone(&self.conn),
            state: Arc::clone(&self.state),
        }
    }

    /// Drives the session until it ends. Consumes the session; a reconnect
    /// starts over with [`connect`](Self::connect).
    pub async fn run(mut self) -> SessionExit {
        // Socket is open: request a token.
        if let Err(e) = self.conn.send_json(&ConnectRequest::new()).await {
            warn!(error = %e, "failed to send the connect request");
            self.shutdown().await;
            return SessionExit::Disconnected;
        }

        let cancel = self.cancel.clone();
        let mut frames = FrameBuffer::new();
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => None,
                item = self.inbound.recv() => item,
            };
            match item {
                Some(Inbound::Frame(frame)) => {
                    let Some((envelope, raw)) = frames.push(&frame) else {
                        continue;
                    };
                    if let Some(exit) = self.route(envelope, raw).await {
                        self.shutdown().await;
                        return exit;
                    }
                },
                Some(Inbound::Eof) => {
                    info!("gateway closed the connection");
                    self.shutdown().await;
                    return SessionExit::Disconnected;
                },
                Some(Inbound::Error(e)) => {
                    warn!(error = %e, "transport error");
                    self.shutdown().await;
                    return SessionExit::Disconnected;
                },
                None => {
                    self.shutdown().await;
                    return SessionExit::Disconnected;
                },
            }
        }
    }

    /// Routes one envelope by its service field. Returns the exit reason
    /// when the envelope ends the session.
    async fn route(&self, envelope: Envelope, raw: Bytes) -> Option<SessionExit> {
        let stage = envelope.result_data.service;
        debug!(result = %envelope.result_msg, stage = %stage, "received message");

        if envelope.result_msg == RESULT_LOGIN_TIMEOUT {
            warn!("gateway reported a login timeout");
            return Some(SessionExit::LoginTimeout);
        }
        if envelope.result_msg == RESULT_USER_LIMIT {
            debug!("gateway is at its user limit; ignoring frame");
            return None;
        }
        if envelope.result_msg != RESULT_SUCCESS {
            warn!(result = %envelope.result_msg, stage = %stage, "gateway reported a non-success result");
        }

        match stage {
            QueryStage::Connect => self.on_connect(&raw).await,
            QueryStage::Login => self.on_login(&raw).await,
            QueryStage::Devicelist => self.on_device_list(&raw),
            QueryStage::Real | QueryStage::RealBattery | QueryStage::Direct => {
                self.on_telemetry(stage, raw);
            },
            QueryStage::Param => self.on_param(&envelope, &raw).await,
            QueryStage::Local | QueryStage::Notice | QueryStage::Statistics => {},
            QueryStage::Unknown => {
                warn!(result = %envelope.result_msg, "ignoring envelope for an unknown service");
            },
        }
        None
    }

    /// Telemetry decodes run off the read loop so a slow decode cannot
    /// stall frame intake. Attribution comes from the poll ticket parked by
    /// the poller for exactly this request.
    fn on_telemetry(&self, stage: QueryStage, raw: Bytes) {
        let state = Arc::clone(&self.state);
        let publisher = Arc::clone(&self.publisher);
        let properties = Arc::clone(&self.properties);
        tokio::spawn(async move {
            let Some(ticket) = state.poll_slot.lock().await.take() else {
                warn!(stage = %stage, "telemetry reply without an outstanding poll request; dropping");
                return;
            };
            let PollTicket { device, stage: requested, done } = ticket;
            if requested != stage {
                debug!(expected = %requested, got = %stage, "telemetry reply stage does not match the outstanding request");
            }

            let decoded = match stage {
                QueryStage::Direct => decoder::decode_direct(&raw),
                _ => decoder::decode_real(&raw, &properties),
            };
            match decoded {
                Ok(readings) => {
                    let mut batch = HashMap::new();
                    batch.insert(device, readings);
                    if let Err(e) = publisher.publish(&batch).await {
                        warn!(error = %e, "failed to publish readings");
                    }
                },
                Err(e) => {
                    warn!(error = %e, stage = %stage, "failed to decode telemetry payload");
                },
            }
            let _ = done.send(());
        });
    }

    /// A param reply resolves the oldest outstanding command; replies on a
    /// single ordered socket arrive in request order.
    async fn on_param(&self, envelope: &Envelope, raw: &[u8]) {
        if let Ok(reply) = serde_json::from_slice::<ParsedEnvelope<ParamReplyList>>(raw) {
            debug!(params = reply.result_data.list.len(), result = %reply.result_msg, "param reply");
        }
        let outcome = ParamOutcome {
            success: envelope.result_msg == RESULT_SUCCESS,
            message: envelope.result_msg.clone(),
        };
        if !self.state.pending.resolve_oldest(outcome).await {
            debug!("param reply with no pending command");
        }
    }

    async fn shutdown(&mut self) {
        self.conn.close().await;
        self.state.pending.drain().await;
        self.state.poll_slot.lock().await.take();
        let uptime = Utc::now() - self.connected_at;
        info!(uptime_secs = uptime.num_seconds(), "session closed");
    }
}
