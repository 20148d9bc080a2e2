use anyhow::Result;

use super::open_workflows;
use crate::config::EhrConfig;
use crate::observability::OperationTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    UnlockWindows,
    Offers,
}

/// One-shot expiry pass, meant for cron or a systemd timer.
pub struct SweepCommand {
    config: EhrConfig,
    in_memory: bool,
    kind: SweepKind,
}

impl SweepCommand {
    pub fn new(config: EhrConfig, in_memory: bool, kind: SweepKind) -> Self {
        Self {
            config,
            in_memory,
            kind,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let (workflows, backend) = open_workflows(&self.config, self.in_memory).await?;

        let result = match self.kind {
            SweepKind::UnlockWindows => {
                let timer = OperationTimer::new("expire_unlock_windows");
                let relocked = workflows.notes.expire_unlock_windows().await;
                timer.finish();
                relocked.map(|n| format!("🔒 Relocked {n} note(s) with elapsed unlock windows"))
            }
            SweepKind::Offers => {
                let timer = OperationTimer::new("expire_offers");
                let expired = workflows.waitlist.expire_offers().await;
                timer.finish();
                expired.map(|n| format!("⏰ Returned {n} expired offer(s) to the waitlist"))
            }
        };

        backend.close().await;
        println!("{}", result?);
        Ok(())
    }
}
