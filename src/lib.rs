use std::sync::Arc;

use axum::{middleware, routing::post, Router};
use tokio::sync::watch;

pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod proxy;
pub mod rpc;
pub mod services;

use rpc::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    faults: Arc<watch::Sender<Option<String>>>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        let (faults, _) = watch::channel(None);
        Self {
            registry,
            faults: Arc::new(faults),
        }
    }

    /// Records the wire method of a handler that panicked. Only the first
    /// fault is kept.
    pub fn report_fault(&self, method: String) {
        self.faults.send_if_modified(|fault| {
            if fault.is_some() {
                return false;
            }
            *fault = Some(method);
            true
        });
    }

    pub fn faults(&self) -> watch::Receiver<Option<String>> {
        self.faults.subscribe()
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", post(http::handlers::rpc_endpoint))
        .layer(http::cors::cors_layer())
        .layer(middleware::from_fn(http::cors::guard_preflight))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
