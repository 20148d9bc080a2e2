use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "ehr-workflows")]
#[command(version)]
#[command(about = "Clinical documentation and scheduling workflows for mental-health practices")]
#[command(long_about = "Runs the note lifecycle, unlock/revision, attestation and waitlist \
                       workflows as an HTTP service, plus maintenance sweeps for unlock \
                       windows and slot offers. Start with 'ehr-workflows init-config'.")]
pub struct Cli {
    /// Configuration file (defaults to ehr-workflows.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use a process-local store instead of the configured database
    #[arg(long, global = true)]
    pub in_memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the REST API until ctrl-c or SIGTERM
    Serve,
    /// Apply database migrations
    Migrate,
    /// Relock notes whose unlock window has elapsed
    ExpireUnlocks,
    /// Return expired slot offers to the waitlist
    ExpireOffers,
    /// Print the attestation a signer would receive
    ResolveAttestation {
        /// Signing role, e.g. CLINICIAN
        #[arg(long)]
        role: String,
        /// Note type, e.g. "Progress Note"
        #[arg(long)]
        note_type: String,
        /// Jurisdiction code, e.g. GA
        #[arg(long)]
        jurisdiction: String,
    },
    /// Write a configuration file with default values
    InitConfig {
        /// Destination path
        #[arg(long, default_value = crate::config::DEFAULT_CONFIG_FILE)]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
