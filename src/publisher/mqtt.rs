// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashSet;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::{
    cfg::config::MqttConfig,
    models::{
        device::Device,
        mqtt::{DiscoveryMessage, StatePayload},
        property::PropertyRecord,
    },
    publisher::Sink,
};

/// Queued-but-unsent requests tolerated before publishes start failing
/// instead of blocking the fan-out.
const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Pause before re-polling a broken broker connection.
const RECONNECT_PAUSE: Duration = Duration::from_secs(5);

/// Publishes readings into a Home Assistant discovery topic tree: a
/// retained `homeassistant/sensor/{identifier}/config` per device, then
/// `homeassistant/sensor/{identifier}/{slug}/state` updates.
pub struct MqttSink {
    client: AsyncClient,
    configured: DashSet<String>,
}

impl MqttSink {
    /// Builds the client and spawns its connection driver. The driver
    /// reconnects with a fixed pause until the token is cancelled; while
    /// the broker is away, publishes queue up to the request-channel cap
    /// and then fail fast (the registry logs and skips this sink).
    pub fn connect(cfg: &MqttConfig, cancel: CancellationToken) -> Self {
        let mut options = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            options.set_credentials(username, password);
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = event_loop.poll() => match event {
                        Ok(event) => trace!(event = ?event, "mqtt event"),
                        Err(e) => {
                            warn!(error = %e, "mqtt connection error");
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = sleep(RECONNECT_PAUSE) => {},
                            }
                        },
                    },
                }
            }
            trace!("mqtt driver exited");
        });

        Self {
            client,
            configured: DashSet::new(),
        }
    }
}

pub fn discovery_topic(device: &Device) -> String {
    format!("homeassistant/sensor/{}/config", device.identifier())
}

pub fn state_topic(record: &PropertyRecord) -> String {
    format!(
        "homeassistant/sensor/{}/{}/state",
        record.identifier, record.slug
    )
}

#[async_trait]
impl Sink for MqttSink {
    fn name(&self) -> &str {
        "mqtt"
    }

    /// Retained discovery config, once per device id. A failed publish
    /// leaves the device unconfigured so the next registration retries.
    async fn register_device(&self, device: &Device) -> Result<()> {
        if self.configured.contains(&device.id) {
            return Ok(());
        }
        let payload = serde_json::to_vec(&DiscoveryMessage::for_device(device))
            .context("failed to serialize the discovery config")?;
        self.client
            .try_publish(discovery_topic(device), QoS::AtLeastOnce, true, payload)
            .context("mqtt discovery publish failed")?;
        self.configured.insert(device.id.clone());
        Ok(())
    }

    async fn write(&self, records: &[PropertyRecord]) -> Result<()> {
        for record in records {
            let payload = serde_json::to_vec(&StatePayload::from_record(record))
                .context("failed to serialize the state payload")?;
            self.client
                .try_publish(state_topic(record), QoS::AtMostOnce, false, payload)
                .with_context(|| {
                    format!("mqtt state publish failed for {}", record.slug)
                })?;
        }
        Ok(())
    }
}
