// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, atomic::Ordering};

use tracing::{debug, warn};

use crate::{
    models::{
        auth::{ConnectResult, LoginRequest, LoginResult},
        device::{DeviceListRequest, DeviceListResult},
        envelope::ParsedEnvelope,
    },
    session::{WinetSession, poller, poller::PollerCtx},
};

impl WinetSession {
    /// Connect reply: store the handed-out token and log in with the
    /// configured credentials.
    pub(super) async fn on_connect(&self, raw: &[u8]) {
        let reply = match serde_json::from_slice::<ParsedEnvelope<ConnectResult>>(raw) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "failed to decode connect reply");
                return;
            },
        };
        *self.state.token.lock().await = reply.result_data.token.clone();

        let request = LoginRequest::new(
            &self.cfg.username,
            &self.cfg.password,
            reply.result_data.token,
        );
        if let Err(e) = self.conn.send_json(&request).await {
            warn!(error = %e, "failed to send the login request");
        }
    }

    /// Login reply: the login token supersedes the connect token; ask for
    /// the device list to start enumerating.
    pub(super) async fn on_login(&self, raw: &[u8]) {
        let reply = match serde_json::from_slice::<ParsedEnvelope<LoginResult>>(raw) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "failed to decode login reply");
                return;
            },
        };
        *self.state.token.lock().await = reply.result_data.token.clone();

        let request = DeviceListRequest::new(reply.result_data.token);
        if let Err(e) = self.conn.send_json(&request).await {
            warn!(error = %e, "failed to send the devicelist request");
        }
    }

    /// Devicelist reply: hand the list to a poll cycle. Exactly one cycle
    /// runs at a time; the cycle itself requests the next list.
    pub(super) fn on_device_list(&self, raw: &[u8]) {
        let reply = match serde_json::from_slice::<ParsedEnvelope<DeviceListResult>>(raw)
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "failed to decode devicelist reply");
                return;
            },
        };

        if self
            .state
            .poll_cycle_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("poll cycle already running; ignoring devicelist reply");
            return;
        }

        let ctx = PollerCtx {
            conn: Arc::clone(&self.conn),
            state: Arc::clone(&self.state),
            publisher: Arc::clone(&self.publisher),
            poll_interval: self.cfg.poll_interval,
            cancel: self.cancel.clone(),
        };
        tokio::spawn(poller::run_cycle(ctx, reply.result_data.list));
    }
}
