// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use lnd_manager::api;
use lnd_manager::backup::reconcile::HttpTokenExchanger;
use lnd_manager::config::Settings;
use lnd_manager::lifecycle::controller::RestartHandle;
use lnd_manager::lifecycle::executor::StatusBoard;
use lnd_manager::lnd::cli::LndCli;
use lnd_manager::lnd::rest::LndRestClient;
use lnd_manager::service::run_service;
use lnd_manager::state::AppState;
use lnd_manager::store::{BackupStore, WalletStore};
use lnd_manager::wallet::TaskRegistry;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let settings = Arc::new(Settings::from_env());
    println!("Starting LND service wrapper");

    let rpc = Arc::new(
        LndRestClient::new(settings.rest_base_url()).expect("Failed to build LND REST client"),
    );
    let cli = Arc::new(LndCli::new(
        settings.lncli_bin.clone(),
        settings.rpc_server.clone(),
    ));
    let exchanger =
        Arc::new(HttpTokenExchanger::new().expect("Failed to build OAuth token exchanger"));
    let restart = Arc::new(RestartHandle::new());

    let state = AppState {
        wallet: Arc::new(WalletStore::new(settings.wallet_store_path())),
        backup: Arc::new(BackupStore::new(settings.backup_store_path())),
        settings: settings.clone(),
        tasks: Arc::new(TaskRegistry::default()),
        notices: Arc::new(TaskRegistry::default()),
        rpc,
        cli,
        controller: restart.clone(),
        exchanger,
        units: Arc::new(RwLock::new(StatusBoard::default())),
    };

    // Action surface.
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .expect("Failed to parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind action surface");
    println!("Action surface listening on http://{addr} (docs at /docs)");
    let app = api::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("Action surface server failed");
    });

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    // Start attempts run until cancellation; a restart request cancels the
    // current run and re-enters with a freshly built graph. Fatal errors
    // exit nonzero so the surrounding service manager retries the whole
    // service.
    loop {
        let run = shutdown.child_token();
        restart.arm(run.clone());
        if let Err(e) = run_service(&state, run).await {
            tracing::error!(error = %e, "service start failed");
            std::process::exit(1);
        }
        if shutdown.is_cancelled() {
            break;
        }
        if restart.take_requested() {
            tracing::info!("restart requested, rebuilding the unit graph");
            continue;
        }
        break;
    }
}
