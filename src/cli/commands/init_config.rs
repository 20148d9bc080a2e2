use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::config::EhrConfig;

/// Writes the default configuration. Existing files are kept unless `force`.
pub struct InitConfigCommand {
    pub path: PathBuf,
    pub force: bool,
}

impl InitConfigCommand {
    pub fn new(path: PathBuf, force: bool) -> Self {
        Self { path, force }
    }

    pub fn execute(&self) -> Result<()> {
        if self.path.exists() && !self.force {
            bail!(
                "{} already exists; pass --force to overwrite it",
                self.path.display()
            );
        }
        EhrConfig::default().save_to_file(&self.path)?;
        println!("⚙️  Wrote default configuration to {}", self.path.display());
        println!("   Set staff_roster_path before signing notes.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ehr.toml");
        InitConfigCommand::new(path.clone(), false).execute().unwrap();

        let loaded = EhrConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.notes.max_unlock_window_hours, 168);
    }

    #[test]
    fn test_refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ehr.toml");
        std::fs::write(&path, "# keep me\n").unwrap();

        assert!(InitConfigCommand::new(path.clone(), false).execute().is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# keep me\n");

        InitConfigCommand::new(path.clone(), true).execute().unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[notes]"));
    }
}
