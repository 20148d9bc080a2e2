use std::sync::Arc;
use tracing::{info, warn};

use crate::observability::WorkflowMetrics;

/// Graceful shutdown coordinator for the HTTP service
pub struct ShutdownCoordinator {
    metrics: Arc<WorkflowMetrics>,
}

impl ShutdownCoordinator {
    pub fn new(metrics: Arc<WorkflowMetrics>) -> Self {
        Self { metrics }
    }

    /// Resolves on ctrl-c or SIGTERM. Handed to axum's graceful shutdown.
    pub async fn wait_for_signal() {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received ctrl-c, shutting down"),
            _ = terminate => info!("Received SIGTERM, shutting down"),
        }
    }

    /// Runs after the listener has drained.
    pub async fn shutdown_all_services(self) {
        info!("Initiating graceful shutdown of all services...");
        self.metrics.log_stats();
        info!("Graceful shutdown completed successfully");
    }
}
