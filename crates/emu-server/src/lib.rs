//! Library surface shared between the `emu-server` binary and its
//! integration tests (teacher precedent: `rustpress-server` splits
//! `lib.rs` from `main.rs` the same way).

pub mod attrs;
pub mod config;
pub mod dispatch;
pub mod hot_reload;
pub mod state;
pub mod wire;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use emu_core::registry::Registry;
use emu_core::signing;
use tokio::sync::watch;

use state::AppState;

/// Serves the self-signed cert PEM at the path an `SnsEnvelope`'s
/// `SigningCertURL` points at, so a recipient that verifies signatures can
/// actually fetch the key.
async fn signing_cert() -> ([(&'static str, &'static str); 1], &'static str) {
    ([("Content-Type", "application/x-pem-file")], signing::signing_cert_pem())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(signing::SIGNING_CERT_PATH, get(signing_cert))
        .route("/", post(dispatch::handle))
        .route("/*path", post(dispatch::handle))
        .with_state(state)
}

/// Builds a fresh, config-seeded `AppState` and its router, without
/// binding any sockets — the shape integration tests drive directly via
/// `tower::ServiceExt::oneshot`.
pub fn build_app(app_config: config::AppConfig) -> (AppState, Router, Arc<Registry>) {
    let registry = Arc::new(Registry::new());
    let state = AppState::new(registry.clone(), app_config);
    state.seed_from_config();
    let router = build_router(state.clone());
    (state, router, registry)
}

pub fn spawn_ticker(registry: Arc<Registry>) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = watch::channel(false);
    let handle = emu_core::engine::spawn_ticker(registry, rx);
    (tx, handle)
}
