use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::SystemClock;
use crate::config::EhrConfig;
use crate::directory::StaffRoster;
use crate::store::InMemoryStore;
#[cfg(feature = "database")]
use crate::store::SqliteStore;
use crate::workflows::Workflows;

pub mod attestation;
pub mod init_config;
pub mod migrate;
pub mod serve;
pub mod sweep;

/// Storage behind an opened set of workflows.
pub enum Backend {
    Memory,
    #[cfg(feature = "database")]
    Sqlite(Arc<SqliteStore>),
}

impl Backend {
    pub async fn close(&self) {
        match self {
            Backend::Memory => {}
            #[cfg(feature = "database")]
            Backend::Sqlite(store) => store.shutdown().await,
        }
    }
}

async fn load_roster(config: &EhrConfig) -> Result<Arc<StaffRoster>> {
    match &config.staff_roster_path {
        Some(path) => Ok(Arc::new(StaffRoster::load(path).await?)),
        None => {
            warn!("No staff_roster_path configured; every signature will be rejected");
            Ok(Arc::new(StaffRoster::new()))
        }
    }
}

/// Wire the workflows against the configured store and staff roster.
pub async fn open_workflows(config: &EhrConfig, in_memory: bool) -> Result<(Workflows, Backend)> {
    let roster = load_roster(config).await?;
    let clock = Arc::new(SystemClock);

    if in_memory {
        info!("Using in-memory store; data is discarded on exit");
        let workflows = Workflows::new(
            Arc::new(InMemoryStore::new()),
            roster.clone(),
            roster,
            clock,
            config,
        );
        return Ok((workflows, Backend::Memory));
    }

    #[cfg(feature = "database")]
    {
        let store = Arc::new(SqliteStore::connect(&config.database).await?);
        let workflows = Workflows::new(store.clone(), roster.clone(), roster, clock, config);
        Ok((workflows, Backend::Sqlite(store)))
    }

    #[cfg(not(feature = "database"))]
    {
        anyhow::bail!("built without the `database` feature; pass --in-memory")
    }
}
