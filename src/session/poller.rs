// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use tokio::{
    sync::oneshot,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    client::transport::WsConnection,
    models::{
        device::{Device, DeviceListItem, DeviceListRequest, RealRequest},
        stage::{DeviceType, QueryStage, stages_for},
    },
    publisher::PublisherRegistry,
    session::SessionState,
    utils::epoch_millis_string,
};

/// How long the poller waits for one stage reply before advancing.
const STAGE_REPLY_DEADLINE: Duration = Duration::from_secs(10);

/// Attribution for one outstanding stage request. Parked in the session's
/// poll slot before the request is written; the decoder takes it, files the
/// readings under `device`, and signals `done`. Stage requests are strictly
/// serialized, so one slot is enough and no reading can be attributed to
/// the wrong device.
#[derive(Debug)]
pub struct PollTicket {
    pub device: Device,
    pub stage: QueryStage,
    pub done: oneshot::Sender<()>,
}

/// Everything one poll cycle needs from its session.
pub(crate) struct PollerCtx {
    pub conn: Arc<WsConnection>,
    pub state: Arc<SessionState>,
    pub publisher: Arc<PublisherRegistry>,
    pub poll_interval: Duration,
    pub cancel: CancellationToken,
}

/// One full poll cycle: per device, register it and walk its stages; then
/// pace and request the next device list. The devicelist reply to that
/// request starts the next cycle.
pub(crate) async fn run_cycle(ctx: PollerCtx, devices: Vec<DeviceListItem>) {
    for item in &devices {
        let stages = stages_for(DeviceType::from_code(item.dev_type));
        if stages.is_empty() {
            debug!(dev_type = item.dev_type, dev_id = item.dev_id, "device type is not polled");
            continue;
        }
        let device = Device::from_list_item(item);
        // A device is announced to every sink before its first reading.
        if let Err(e) = ctx.publisher.register_device(&device).await {
            warn!(error = %e, device = %device.id, "failed to register device");
        }
        for stage in stages {
            if ctx.cancel.is_cancelled() || !poll_stage(&ctx, &device, *stage).await {
                ctx.state.poll_cycle_running.store(false, Ordering::SeqCst);
                return;
            }
        }
    }

    tokio::select! {
        _ = ctx.cancel.cancelled() => {
            ctx.state.poll_cycle_running.store(false, Ordering::SeqCst);
            return;
        },
        _ = sleep(ctx.poll_interval) => {},
    }

    // Clear the gate before asking for the next device list; its reply is
    // what starts the next cycle.
    ctx.state.poll_cycle_running.store(false, Ordering::SeqCst);
    let token = ctx.state.token.lock().await.clone();
    if let Err(e) = ctx.conn.send_json(&DeviceListRequest::new(token)).await {
        warn!(error = %e, "failed to re-request the device list");
    }
}

/// Sends one stage request and waits for the decoder to finish with it.
/// Returns false when the session is going away and the cycle should stop.
async fn poll_stage(ctx: &PollerCtx, device: &Device, stage: QueryStage) -> bool {
    let (done_tx, done_rx) = oneshot::channel();
    *ctx.state.poll_slot.lock().await = Some(PollTicket {
        device: device.clone(),
        stage,
        done: done_tx,
    });

    let token = ctx.state.token.lock().await.clone();
    let request =
        RealRequest::new(stage, device.id.clone(), token, epoch_millis_string());
    if let Err(e) = ctx.conn.send_json(&request).await {
        warn!(error = %e, device = %device.id, stage = %stage, "stage request failed");
        ctx.state.poll_slot.lock().await.take();
        return false;
    }

    match timeout(STAGE_REPLY_DEADLINE, done_rx).await {
        Ok(Ok(())) => true,
        // Ticket dropped without completion: the session is tearing down.
        Ok(Err(_)) => false,
        Err(_) => {
            warn!(device = %device.id, stage = %stage, "no reply for stage request; advancing");
            ctx.state.poll_slot.lock().await.take();
            true
        },
    }
}
