// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use tokio::{task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cfg::config::{Config, WinetConfig},
    db::Database,
    logic::EnergyLogic,
    pricing::AmberClient,
    publisher::{PublisherRegistry, Sink, mqtt::MqttSink, postgres::PostgresSink},
    scheduler,
    server::{self, AppState},
    session::{ConnectError, SessionExit, WinetSession, commands::InverterCommander},
};

/// Pause between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Wires every long-running piece under one cancellation scope and runs
/// until shutdown: the gateway session loop, the HTTP surface, and the cron
/// scheduler. The first task to fail cancels the rest; Ctrl-C cancels
/// everything gracefully.
pub async fn run(cfg: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                cancel.cancel();
            }
        });
    }

    let db = match &cfg.database {
        Some(database) => Some(Arc::new(Database::connect(&database.url).await?)),
        None => None,
    };

    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    if let Some(db) = &db {
        sinks.push(Arc::new(PostgresSink::new(Arc::clone(db))));
    }
    if let Some(mqtt) = &cfg.mqtt {
        sinks.push(Arc::new(MqttSink::connect(mqtt, cancel.clone())));
    }
    let publisher = Arc::new(PublisherRegistry::new(sinks));
    let commander = Arc::new(InverterCommander::new());

    let pricing_client = match &cfg.amber {
        Some(amber) => {
            Some(Arc::new(AmberClient::new(&amber.base_url, &amber.token).await?))
        },
        None => None,
    };
    let logic = match (&db, &pricing_client) {
        (Some(db), Some(_)) => Some(Arc::new(EnergyLogic::new(
            Arc::clone(&commander),
            Arc::clone(db),
        ))),
        _ => None,
    };

    let mut tasks = JoinSet::new();
    tasks.spawn(server::serve(
        cfg.server.listen_addr.clone(),
        AppState {
            commander: Arc::clone(&commander),
            db: db.clone(),
        },
        cancel.clone(),
    ));
    tasks.spawn(scheduler::run(
        cfg.amber.as_ref().map(|a| a.price_cron.clone()),
        pricing_client,
        logic,
        db,
        cancel.clone(),
    ));
    tasks.spawn(session_loop(
        cfg.winet.clone(),
        Arc::clone(&publisher),
        commander,
        cancel.clone(),
    ));

    // First failure wins; everything else is cancelled and awaited.
    let mut failure: Option<anyhow::Error> = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {
                cancel.cancel();
            },
            Ok(Err(e)) => {
                if failure.is_none() {
                    failure = Some(e);
                }
                cancel.cancel();
            },
            Err(e) => {
                if failure.is_none() {
                    failure = Some(anyhow!("task panicked: {e}"));
                }
                cancel.cancel();
            },
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Dial, run, reconnect. A login timeout or disconnect leads back to a
/// fresh dial with cleared state after a short pause; a properties-fetch
/// failure or too many consecutive dial failures is fatal.
async fn session_loop(
    cfg: WinetConfig,
    publisher: Arc<PublisherRegistry>,
    commander: Arc<InverterCommander>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut dial_failures: u32 = 0;
    while !cancel.is_cancelled() {
        match WinetSession::connect(
            cfg.clone(),
            Arc::clone(&publisher),
            cancel.child_token(),
        )
        .await
        {
            Err(ConnectError::Properties(e)) => {
                return Err(e.context("fetching the gateway i18n properties failed"));
            },
            Err(ConnectError::Dial(e)) => {
                dial_failures += 1;
                if dial_failures >= cfg.dial_retries {
                    return Err(
                        e.context(format!("gateway dial failed {dial_failures} times"))
                    );
                }
                warn!(error = %e, attempt = dial_failures, "gateway dial failed; retrying");
                if !pause(&cancel, RECONNECT_DELAY).await {
                    break;
                }
            },
            Ok(session) => {
                dial_failures = 0;
                commander.attach(session.handle()).await;
                let exit = session.run().await;
                commander.detach().await;
                match exit {
                    SessionExit::LoginTimeout => {
                        warn!("session ended on a login timeout; reconnecting");
                    },
                    SessionExit::Disconnected => {
                        info!("session disconnected; reconnecting");
                    },
                }
                if !pause(&cancel, RECONNECT_DELAY).await {
                    break;
                }
            },
        }
    }
    Ok(())
}

/// Sleeps unless cancelled first; returns false on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
