// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{db::Database, logic::EnergyLogic, pricing, pricing::AmberClient};

/// Nightly property cleanup, 02:00 local.
const CLEANUP_CRON: &str = "0 0 2 * * *";

/// Runs the cron jobs until cancelled: price refresh plus next-best-action
/// on the configured cadence, property cleanup nightly. Jobs whose
/// dependencies are not configured are simply not scheduled.
pub async fn run(
    price_cron: Option<String>,
    client: Option<Arc<AmberClient>>,
    logic: Option<Arc<EnergyLogic>>,
    db: Option<Arc<Database>>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut scheduler = JobScheduler::new()
        .await
        .context("failed to create the job scheduler")?;

    if let (Some(cron), Some(client), Some(db)) = (price_cron, client, db.clone()) {
        let job = Job::new_async(cron.as_str(), move |_id, _scheduler| {
            let client = Arc::clone(&client);
            let db = Arc::clone(&db);
            let logic = logic.clone();
            Box::pin(async move {
                if let Err(e) = pricing::refresh_prices(&client, &db).await {
                    error!(error = %e, "price refresh failed");
                    return;
                }
                debug!("prices refreshed");
                if let Some(logic) = logic {
                    if let Err(e) = logic.next_best_action().await {
                        error!(error = %e, "next-best-action failed");
                    }
                }
            })
        })
        .context("invalid price refresh schedule")?;
        scheduler
            .add(job)
            .await
            .context("failed to add the price refresh job")?;
        info!("scheduled price refresh");
    }

    if let Some(db) = db {
        let job = Job::new_async(CLEANUP_CRON, move |_id, _scheduler| {
            let db = Arc::clone(&db);
            Box::pin(async move {
                match db.cleanup().await {
                    Ok(()) => debug!("nightly cleanup done"),
                    Err(e) => error!(error = %e, "nightly cleanup failed"),
                }
            })
        })
        .context("invalid cleanup schedule")?;
        scheduler
            .add(job)
            .await
            .context("failed to add the cleanup job")?;
        info!("scheduled nightly cleanup");
    }

    scheduler
        .start()
        .await
        .context("failed to start the job scheduler")?;

    cancel.cancelled().await;
    scheduler
        .shutdown()
        .await
        .context("failed to stop the job scheduler")?;
    Ok(())
}
