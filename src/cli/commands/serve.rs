use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::open_workflows;
use crate::api;
use crate::config::EhrConfig;
use crate::shutdown::ShutdownCoordinator;

pub struct ServeCommand {
    config: EhrConfig,
    in_memory: bool,
}

impl ServeCommand {
    pub fn new(config: EhrConfig, in_memory: bool) -> Self {
        Self { config, in_memory }
    }

    pub async fn execute(&self) -> Result<()> {
        let (workflows, backend) = open_workflows(&self.config, self.in_memory).await?;
        let coordinator = ShutdownCoordinator::new(workflows.metrics.clone());

        let address = &self.config.server.bind_address;
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind {address}"))?;
        info!(address = %address, "HTTP server listening");

        let (signalled_tx, mut signalled_rx) = tokio::sync::watch::channel(false);
        let server = axum::serve(listener, api::router(workflows)).with_graceful_shutdown(
            async move {
                ShutdownCoordinator::wait_for_signal().await;
                let _ = signalled_tx.send(true);
            },
        );
        let mut server = tokio::spawn(server.into_future());

        // Once a signal arrives, in-flight requests get the grace period to drain.
        let grace = Duration::from_secs(self.config.server.shutdown_grace_seconds);
        tokio::select! {
            result = &mut server => result??,
            _ = signalled_rx.changed() => {
                match tokio::time::timeout(grace, &mut server).await {
                    Ok(result) => result??,
                    Err(_) => {
                        warn!(grace_seconds = grace.as_secs(), "Grace period elapsed; aborting open connections");
                        server.abort();
                    }
                }
            }
        }

        coordinator.shutdown_all_services().await;
        backend.close().await;
        Ok(())
    }
}
