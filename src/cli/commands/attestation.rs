use anyhow::Result;

use super::open_workflows;
use crate::config::EhrConfig;

pub struct ResolveAttestationCommand {
    config: EhrConfig,
    in_memory: bool,
    pub role: String,
    pub note_type: String,
    pub jurisdiction: String,
}

impl ResolveAttestationCommand {
    pub fn new(
        config: EhrConfig,
        in_memory: bool,
        role: String,
        note_type: String,
        jurisdiction: String,
    ) -> Self {
        Self {
            config,
            in_memory,
            role,
            note_type,
            jurisdiction,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let (workflows, backend) = open_workflows(&self.config, self.in_memory).await?;
        let resolved = workflows
            .attestations
            .resolve_attestation(&self.role, &self.note_type, &self.jurisdiction)
            .await;
        backend.close().await;

        let found = resolved?;
        println!(
            "📜 {} / {} / {}",
            found.role, found.note_type, found.jurisdiction
        );
        println!("{}", found.attestation_text);
        Ok(())
    }
}
