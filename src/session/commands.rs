// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::VecDeque,
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tokio::{
    sync::{Mutex, RwLock, oneshot},
    time::timeout,
};
use tracing::warn;

use crate::{
    models::{
        command::{
            CHARGE_COMMAND_CODE, DISCHARGE_COMMAND_CODE, FEED_IN_LIMITED,
            FEED_IN_UNLIMITED, InverterUpdateRequest, PARAM_ADDR_CHARGE_COMMAND,
            PARAM_ADDR_CHARGE_POWER, PARAM_ADDR_ENERGY_MODE, PARAM_ADDR_FEED_IN_LIMIT,
            PARAM_DEV_CODE, ParamWrite, PowerSwitch, PowerSwitchRequest,
            STOP_COMMAND_CODE,
        },
        envelope::RequestHeader,
        stage::{DEV_TYPE_INVERTER, QueryStage},
    },
    session::SessionHandle,
    utils::epoch_millis_string,
};

/// How long a command waits for its param reply.
pub const COMMAND_DEADLINE: Duration = Duration::from_secs(10);

/// Result of one control command, extracted from its param reply.
#[derive(Debug, Clone)]
pub struct ParamOutcome {
    pub success: bool,
    pub message: String,
}

type PendingEntry = (u64, oneshot::Sender<ParamOutcome>);

/// Table of control requests awaiting their param reply.
///
/// Param replies carry no request correlator, but the socket has one
/// totally-ordered write path and the gateway answers in order, so entries
/// resolve oldest-first. Entries are keyed by a sequence number only so a
/// timed-out caller can withdraw precisely its own entry.
#[derive(Debug, Default)]
pub struct PendingCommands {
    next_seq: AtomicU64,
    waiting: Mutex<VecDeque<PendingEntry>>,
}

impl PendingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry before its request is written, so a fast reply
    /// cannot race the registration.
    pub async fn register(&self) -> (u64, oneshot::Receiver<ParamOutcome>) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().await.push_back((seq, tx));
        (seq, rx)
    }

    pub async fn discard(&self, seq: u64) {
        self.waiting.lock().await.retain(|(s, _)| *s != seq);
    }

    /// Delivers a param reply to the oldest outstanding command. Returns
    /// false when nothing was waiting.
    pub async fn resolve_oldest(&self, outcome: ParamOutcome) -> bool {
        let entry = self.waiting.lock().await.pop_front();
        match entry {
            Some((_, tx)) => {
                let _ = tx.send(outcome);
                true
            },
            None => false,
        }
    }

    /// Drops every outstanding entry; their callers observe a closed reply
    /// channel. Called on session teardown so the table never outlives its
    /// session.
    pub async fn drain(&self) {
        self.waiting.lock().await.clear();
    }

    pub async fn outstanding(&self) -> usize {
        self.waiting.lock().await.len()
    }
}

/// Issues control commands against whichever session is currently live.
///
/// The supervisor attaches a fresh [`SessionHandle`] after each dial and
/// detaches it on teardown; HTTP handlers and the price logic hold this
/// value for the life of the process.
#[derive(Debug, Default)]
pub struct InverterCommander {
    session: RwLock<Option<SessionHandle>>,
}

impl InverterCommander {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, handle: SessionHandle) {
        *self.session.write().await = Some(handle);
    }

    pub async fn detach(&self) {
        *self.session.write().await = None;
    }

    async fn current(&self) -> Result<SessionHandle> {
        self.session
            .read()
            .await
            .clone()
            .context("no live gateway session")
    }

    /// Battery back to self-consumption: energy-management mode 0.
    pub async fn set_self_consumption(&self) -> Result<bool> {
        self.send_params(vec![energy_mode_param("0")]).await
    }

    /// Forced charge at `power_kw` kilowatts.
    pub async fn charge(&self, power_kw: &str) -> Result<bool> {
        self.send_params(forced_mode_params(CHARGE_COMMAND_CODE, Some(power_kw)))
            .await
    }

    /// Forced discharge at `power_kw` kilowatts.
    pub async fn discharge(&self, power_kw: &str) -> Result<bool> {
        self.send_params(forced_mode_params(DISCHARGE_COMMAND_CODE, Some(power_kw)))
            .await
    }

    /// Forced mode with the stop command code: the battery neither charges
    /// nor discharges.
    pub async fn battery_stop(&self) -> Result<bool> {
        self.send_params(forced_mode_params(STOP_COMMAND_CODE, None))
            .await
    }

    /// Turns the inverter off (`off = true`) or back on.
    pub async fn set_inverter_power(&self, off: bool) -> Result<bool> {
        let handle = self.current().await?;
        let token = handle.state.token.lock().await.clone();
        let request = PowerSwitchRequest {
            header: RequestHeader::new(QueryStage::Param, token),
            dev_code: PARAM_DEV_CODE,
            dev_type: DEV_TYPE_INVERTER,
            dev_id_array: vec!["1".to_string()],
            kind: "3".to_string(),
            count: "1".to_string(),
            list: vec![PowerSwitch {
                power_switch: if off { "0" } else { "1" }.to_string(),
            }],
        };
        self.dispatch(&handle, &request).await
    }

    /// Limits export to the grid (`limited = true`) or lifts the limit.
    pub async fn set_feed_in_limit(&self, limited: bool) -> Result<bool> {
        let value = if limited { FEED_IN_LIMITED } else { FEED_IN_UNLIMITED };
        self.send_params(vec![ParamWrite {
            accuracy: 0,
            param_addr: PARAM_ADDR_FEED_IN_LIMIT,
            param_id: 13,
            param_type: 1,
            param_value: value.to_string(),
            param_name: "Feed-in Limitation".to_string(),
        }])
        .await
    }

    async fn send_params(&self, params: Vec<ParamWrite>) -> Result<bool> {
        let handle = self.current().await?;
        let token = handle.state.token.lock().await.clone();
        let now = epoch_millis_string();
        let request = InverterUpdateRequest {
            header: RequestHeader::new(QueryStage::Param, token),
            time: now.clone(),
            park_serial: now,
            dev_code: PARAM_DEV_CODE,
            dev_type: DEV_TYPE_INVERTER,
            dev_id_array: vec!["1".to_string()],
            kind: "9".to_string(),
            count: "1".to_string(),
            current_pack_num: 1,
            pack_num_total: 1,
            list: params,
        };
        self.dispatch(&handle, &request).await
    }

    /// Registers a pending entry, writes the request, and awaits the
    /// correlated reply. Never blocks past [`COMMAND_DEADLINE`].
    async fn dispatch<T: Serialize + Debug>(
        &self,
        handle: &SessionHandle,
        request: &T,
    ) -> Result<bool> {
        let (seq, reply) = handle.state.pending.register().await;
        if let Err(e) = handle.conn.send_json(request).await {
            handle.state.pending.discard(seq).await;
            return Err(e);
        }
        match timeout(COMMAND_DEADLINE, reply).await {
            Ok(Ok(outcome)) => {
                if !outcome.success {
                    warn!(message = %outcome.message, "gateway rejected the command");
                }
                Ok(outcome.success)
            },
            Ok(Err(_)) => bail!("session closed before the command reply arrived"),
            Err(_) => {
                handle.state.pending.discard(seq).await;
                bail!("no command reply within {}s", COMMAND_DEADLINE.as_secs())
            },
        }
    }
}

fn energy_mode_param(value: &str) -> ParamWrite {
    ParamWrite {
        accuracy: 0,
        param_addr: PARAM_ADDR_ENERGY_MODE,
        param_id: 1,
        param_type: 1,
        param_value: value.to_string(),
        param_name: "Energy Management Mode".to_string(),
    }
}

/// Forced energy-management mode plus the charge/discharge command code;
/// the power register is written only when a power is given.
fn forced_mode_params(command_code: &str, power_kw: Option<&str>) -> Vec<ParamWrite> {
    let mut params = vec![
        energy_mode_param("2"),
        ParamWrite {
            accuracy: 0,
            param_addr: PARAM_ADDR_CHARGE_COMMAND,
            param_id: 2,
            param_type: 1,
            param_value: command_code.to_string(),
            param_name: "Charging/Discharging Command".to_string(),
        },
    ];
    if let Some(power) = power_kw {
        params.push(ParamWrite {
            accuracy: 2,
            param_addr: PARAM_ADDR_CHARGE_POWER,
            param_id: 3,
            param_type: 2,
            param_value: power.to_string(),
            param_name: "Charging/Discharging Power".to_string(),
        });
    }
    params
}
