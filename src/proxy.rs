//! Proxy process lifecycle
//!
//! A [`Proxy`] moves through `Created → Listening → ShuttingDown → Stopped`.
//! `start` serves until `shutdown` is called or a handler panics; `shutdown`
//! drains in-flight requests up to the configured deadline.

use std::{
    future::{Future, IntoFuture},
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info, warn};

use crate::config::DEFAULT_SHUTDOWN_TIMEOUT;
use crate::errors::ProxyError;
use crate::rpc::registry::Registry;
use crate::{build_app, AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

pub struct Proxy {
    addr: SocketAddr,
    drain_timeout: Duration,
    app: AppState,
    state: Arc<watch::Sender<ProxyState>>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
    drain_timed_out: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
}

impl Proxy {
    pub fn new(registry: Registry, addr: SocketAddr) -> Self {
        let (state, _) = watch::channel(ProxyState::Created);
        let (shutdown, _) = watch::channel(false);
        Self {
            addr,
            drain_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            app: AppState::new(Arc::new(registry)),
            state: Arc::new(state),
            shutdown,
            started: AtomicBool::new(false),
            drain_timed_out: AtomicBool::new(false),
            local_addr: OnceLock::new(),
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn state(&self) -> ProxyState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProxyState> {
        self.state.subscribe()
    }

    /// Address actually bound, which differs from the configured one when
    /// port 0 was requested. `None` until the listener is up.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub async fn start(&self) -> Result<(), ProxyError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ProxyError::InvalidState(self.state()));
        }

        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.abandon_start();
                error!(addr = %self.addr, error = %source, "failed to bind listener");
                return Err(ProxyError::Bind {
                    addr: self.addr,
                    source,
                });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(err) => {
                self.abandon_start();
                return Err(ProxyError::Listener(err));
            }
        };
        let _ = self.local_addr.set(local_addr);

        self.state.send_replace(ProxyState::Listening);
        let stopped = StopOnDrop(&self.state);
        info!(
            addr = %local_addr,
            handlers = ?self.app.registry.keys(),
            "proxy listening"
        );

        let graceful = {
            let state = self.state.clone();
            let stop = self.stop_requested();
            async move {
                stop.await;
                enter_shutting_down(&state);
            }
        };
        let deadline = {
            let stop = self.stop_requested();
            let drain_timeout = self.drain_timeout;
            async move {
                stop.await;
                tokio::time::sleep(drain_timeout).await;
            }
        };

        let app = build_app(self.app.clone());
        let serve = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(graceful)
            .into_future();

        let served = tokio::select! {
            result = serve => result.map_err(ProxyError::Listener),
            _ = deadline => {
                self.drain_timed_out.store(true, Ordering::SeqCst);
                warn!(
                    timeout_ms = self.drain_timeout.as_millis(),
                    "drain deadline elapsed, abandoning in-flight requests"
                );
                Ok(())
            }
        };

        drop(stopped);
        info!(addr = %local_addr, "proxy stopped");
        served?;

        let fault = self.app.faults().borrow().clone();
        match fault {
            Some(method) => Err(ProxyError::HandlerPanicked { method }),
            None => Ok(()),
        }
    }

    /// Stops accepting connections and waits for in-flight requests. Without
    /// an active listener this is a no-op.
    pub async fn shutdown(&self) -> Result<(), ProxyError> {
        let mut state = self.state.subscribe();
        let current = *state.borrow_and_update();
        match current {
            ProxyState::Created if self.started.load(Ordering::SeqCst) => {
                // start() is still binding; it picks the flag up once listening.
                info!("shutdown requested while the listener is binding");
                self.shutdown.send_replace(true);
                return Ok(());
            }
            ProxyState::Created | ProxyState::Stopped => {
                info!(state = ?current, "shutdown requested without an active listener");
                return Ok(());
            }
            ProxyState::Listening => {
                enter_shutting_down(&self.state);
                self.shutdown.send_replace(true);
            }
            ProxyState::ShuttingDown => {
                self.shutdown.send_replace(true);
            }
        }

        let _ = state.wait_for(|state| *state == ProxyState::Stopped).await;

        if self.drain_timed_out.load(Ordering::SeqCst) {
            return Err(ProxyError::DrainTimeout(self.drain_timeout));
        }
        Ok(())
    }

    fn abandon_start(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(false);
    }

    fn stop_requested(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut shutdown = self.shutdown.subscribe();
        let mut faults = self.app.faults();
        let requested = async move {
            let _ = shutdown.wait_for(|requested| *requested).await;
        };
        let faulted = async move {
            let _ = faults.wait_for(Option::is_some).await;
        };

        async move {
            tokio::select! {
                _ = requested => {}
                _ = faulted => {
                    error!("handler panicked, stopping proxy");
                }
            }
        }
    }
}

/// Publishes `Stopped` when `start` returns or its future is dropped.
struct StopOnDrop<'a>(&'a watch::Sender<ProxyState>);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(ProxyState::Stopped);
    }
}

fn enter_shutting_down(state: &watch::Sender<ProxyState>) {
    let entered = state.send_if_modified(|current| {
        if *current != ProxyState::Listening {
            return false;
        }
        *current = ProxyState::ShuttingDown;
        true
    });

    if entered {
        info!("proxy shutting down");
    }
}
