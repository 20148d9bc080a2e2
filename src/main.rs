use anyhow::Result;
use clap::Parser;

use ehr_workflows::cli::commands::attestation::ResolveAttestationCommand;
use ehr_workflows::cli::commands::init_config::InitConfigCommand;
use ehr_workflows::cli::commands::migrate::MigrateCommand;
use ehr_workflows::cli::commands::serve::ServeCommand;
use ehr_workflows::cli::commands::sweep::{SweepCommand, SweepKind};
use ehr_workflows::cli::{Cli, Commands};
use ehr_workflows::config::EhrConfig;
use ehr_workflows::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Needs neither configuration nor a runtime.
    if let Commands::InitConfig { path, force } = &cli.command {
        return InitConfigCommand::new(path.clone(), *force).execute();
    }

    EhrConfig::load_env_file()?;
    let config = EhrConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;

    let in_memory = cli.in_memory;
    tokio::runtime::Runtime::new()?.block_on(async move {
        match cli.command {
            Commands::Serve => ServeCommand::new(config, in_memory).execute().await,
            Commands::Migrate => MigrateCommand::new(config).execute().await,
            Commands::ExpireUnlocks => {
                SweepCommand::new(config, in_memory, SweepKind::UnlockWindows)
                    .execute()
                    .await
            }
            Commands::ExpireOffers => {
                SweepCommand::new(config, in_memory, SweepKind::Offers)
                    .execute()
                    .await
            }
            Commands::ResolveAttestation {
                role,
                note_type,
                jurisdiction,
            } => {
                ResolveAttestationCommand::new(config, in_memory, role, note_type, jurisdiction)
                    .execute()
                    .await
            }
            Commands::InitConfig { .. } => Ok(()),
        }
    })
}
