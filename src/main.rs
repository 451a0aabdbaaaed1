// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use tracing::info;
use winet_bridge_rs::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    supervisor,
};

#[tokio::main]
async fn main() -> Result<()> {
    let logger_path =
        resolve_config_path("WINET_LOGGER_CONFIG", "config_logger.yaml")?;
    let _logger_guard = init_logger(&logger_path)?;

    let cfg = resolve_config_path("WINET_CONFIG", "config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    info!(gateway = %cfg.winet.host, "starting winet bridge");
    supervisor::run(cfg).await
}
