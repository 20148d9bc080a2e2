use anyhow::Result;

use crate::config::EhrConfig;

pub struct MigrateCommand {
    config: EhrConfig,
}

impl MigrateCommand {
    pub fn new(config: EhrConfig) -> Self {
        Self { config }
    }

    #[cfg(feature = "database")]
    pub async fn execute(&self) -> Result<()> {
        use crate::store::SqliteStore;

        let mut database = self.config.database.clone();
        database.auto_migrate = false;
        let store = SqliteStore::connect(&database).await?;
        let migrated = store.migrate().await;
        store.shutdown().await;
        migrated?;
        println!("✅ Database at {} is up to date", database.url);
        Ok(())
    }

    #[cfg(not(feature = "database"))]
    pub async fn execute(&self) -> Result<()> {
        anyhow::bail!(
            "built without the `database` feature; nothing to migrate for {}",
            self.config.database.url
        )
    }
}
