// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Gateway connection and polling parameters.
    pub winet: WinetConfig,
    /// Local HTTP control surface.
    #[serde(default)]
    pub server: ServerConfig,
    /// Optional Postgres persistence. When absent, readings are decoded and
    /// deduplicated but nothing is written and the property endpoints 404.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// Optional MQTT broker for the Home Assistant discovery sink.
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
    /// Optional electricity-price API. When absent, no price refresh or
    /// price-driven control runs.
    #[serde(default)]
    pub amber: Option<AmberConfig>,
}

/// Parameters of the WiNet-S gateway session.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct WinetConfig {
    /// Gateway hostname or address, without a port.
    pub host: String,
    /// Gateway login user.
    pub username: String,
    /// Gateway login password.
    pub password: String,
    /// Dial `wss` on 443 instead of `ws` on 8082. The gateway ships with a
    /// self-signed certificate; verification is disabled for this endpoint
    /// only.
    #[serde(default)]
    pub ssl: bool,

    #[serde(
        default = "default_poll_interval",
        rename = "poll_interval_secs",
        with = "serde_secs"
    )]
    /// Pause between device-list poll cycles.
    pub poll_interval: Duration,

    #[serde(
        default = "default_ping_interval",
        rename = "ping_interval_secs",
        with = "serde_secs"
    )]
    /// Keepalive ping cadence on the WebSocket.
    pub ping_interval: Duration,

    #[serde(
        default = "default_send_timeout",
        rename = "send_timeout_secs",
        with = "serde_secs"
    )]
    /// Upper bound on a single WebSocket write.
    pub send_timeout: Duration,

    /// Consecutive dial failures tolerated before the supervisor gives up.
    #[serde(default = "default_dial_retries")]
    pub dial_retries: u32,

    /// Port overrides. The gateway's fixed ports (8082 / 443 for the
    /// WebSocket, 80 / 443 for the i18n properties file) apply when unset.
    #[serde(default)]
    pub websocket_port: Option<u16>,
    #[serde(default)]
    pub properties_port: Option<u16>,
}

impl WinetConfig {
    pub fn websocket_url(&self) -> String {
        let (scheme, default_port) = if self.ssl { ("wss", 443) } else { ("ws", 8082) };
        let port = self.websocket_port.unwrap_or(default_port);
        format!("{scheme}://{}:{port}/ws/home/overview", self.host)
    }

    pub fn properties_url(&self) -> String {
        let (scheme, default_port) = if self.ssl { ("https", 443) } else { ("http", 80) };
        let port = self.properties_port.unwrap_or(default_port);
        format!("{scheme}://{}:{port}/i18n/en_US.properties", self.host)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AmberConfig {
    #[serde(default = "default_amber_base_url")]
    pub base_url: String,
    pub token: String,
    /// Six-field cron expression driving the price refresh.
    #[serde(default = "default_price_cron")]
    pub price_cron: String,
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.winet.host.is_empty(), "winet.host must not be empty");
        ensure!(
            !self.winet.host.contains(':'),
            "winet.host must not carry a port; use the port overrides"
        );
        ensure!(
            !self.winet.username.is_empty(),
            "winet.username must not be empty"
        );
        ensure!(
            self.winet.dial_retries >= 1,
            "winet.dial_retries must be >= 1"
        );
        ensure!(
            !self.winet.poll_interval.is_zero(),
            "winet.poll_interval_secs must be >= 1"
        );
        ensure!(
            !self.server.listen_addr.is_empty(),
            "server.listen_addr must not be empty"
        );

        if let Some(db) = &self.database {
            ensure!(!db.url.is_empty(), "database.url must not be empty");
        }
        if let Some(mqtt) = &self.mqtt {
            ensure!(!mqtt.host.is_empty(), "mqtt.host must not be empty");
            ensure!(
                !mqtt.client_id.is_empty(),
                "mqtt.client_id must not be empty"
            );
        }
        if let Some(amber) = &mut self.amber {
            ensure!(!amber.token.is_empty(), "amber.token must not be empty");
            // Trailing slashes double up when joining request paths.
            while amber.base_url.ends_with('/') {
                amber.base_url.pop();
            }
            ensure!(
                !amber.base_url.is_empty(),
                "amber.base_url must not be empty"
            );
        }

        Ok(())
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(8)
}

fn default_send_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_dial_retries() -> u32 {
    5
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_client_id() -> String {
    "winet-bridge".to_string()
}

fn default_amber_base_url() -> String {
    "https://api.amber.com.au/v1".to_string()
}

fn default_price_cron() -> String {
    // sec min hour dom mon dow
    "0 */5 * * * *".to_string()
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
