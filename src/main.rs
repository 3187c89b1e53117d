use std::sync::Arc;

use ethrpc_proxy::{
    config::Config,
    logging,
    proxy::Proxy,
    rpc::registry::Registry,
    services::net,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;

    let mut registry = Registry::builder();
    net::register(&mut registry, &config.network_id)?;

    let proxy = Arc::new(
        Proxy::new(registry.build(), config.bind_socket()?)
            .with_drain_timeout(config.shutdown_timeout),
    );

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        network_id = %config.network_id,
        "proxy starting"
    );

    let signal_proxy = Arc::clone(&proxy);
    tokio::spawn(async move {
        termination_signal().await;
        info!("termination signal received");
        if let Err(err) = signal_proxy.shutdown().await {
            warn!(error = %err, "shutdown did not complete cleanly");
        }
    });

    proxy.start().await?;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn termination_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => {
                    warn!(error = %err, "failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
