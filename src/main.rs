// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{fs, path::Path, process, sync::Arc};

use harmony_aura_core::{
    api::router,
    config::{Config, StoreBackend},
    dispatch::CommandDispatcher,
    logging,
    paths::SitePaths,
    state::AppState,
    store::{FirebaseStore, InMemoryStore, RealtimeStore},
    telemetry::{DecryptionKey, TelemetrySubscriber},
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

fn build_store(backend: &StoreBackend) -> Result<Arc<dyn RealtimeStore>, String> {
    match backend {
        StoreBackend::Memory { seed_file: None } => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Memory {
            seed_file: Some(path),
        } => {
            let root = load_seed(path)?;
            Ok(Arc::new(InMemoryStore::with_root(root)))
        }
        StoreBackend::Firebase { db_url, auth_token } => FirebaseStore::new(db_url, auth_token.clone())
            .map(|store| Arc::new(store) as Arc<dyn RealtimeStore>)
            .map_err(|e| e.to_string()),
    }
}

fn load_seed(path: &Path) -> Result<Value, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("{}: {e}", path.display()))
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            process::exit(2);
        }
    };

    logging::init(config.log_format).expect("Failed to initialize logging");

    let key = DecryptionKey::from_hex(&config.psk_hex).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid pre-shared key");
        process::exit(2);
    });

    let store = build_store(&config.store).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to initialize realtime store");
        process::exit(1);
    });

    let paths = SitePaths::new(&config.site_root);
    let subscription = TelemetrySubscriber::new(store.clone(), Arc::new(key), paths.clone())
        .with_grace_period(config.startup_grace)
        .start();
    let dispatcher = CommandDispatcher::new(store, paths, config.command_source.clone());
    let state = AppState::new(subscription.updates(), Arc::new(dispatcher));
    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    tracing::info!(
        address = %addr,
        site_root = %config.site_root,
        "Harmony Aura core listening (docs at /docs)"
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                signal.cancel();
            }
            // keep serving; the process can still be stopped externally
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .expect("HTTP server failed");

    subscription.stop().await;
    tracing::info!("Telemetry subscription stopped");
}
