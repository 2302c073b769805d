use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use pacscope_sync::{RunOptions, RunSummary, SyncConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pacscope")]
#[command(about = "Campaign-finance updater: organization and candidate sweeps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Categorize tracked organizations by where their committees give.
    Organizations {
        /// Fetch and categorize without publishing or writing state.
        #[arg(long)]
        dry_run: bool,
        /// Process a single tracked organization, by name or slug.
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        resume: bool,
    },
    /// Refresh candidate fundraising, one jurisdiction at a time.
    Candidates {
        #[arg(long)]
        dry_run: bool,
        /// Comma-separated jurisdiction codes, e.g. `NC,VA`.
        #[arg(long)]
        states: Option<String>,
        #[arg(long)]
        resume: bool,
        #[arg(long)]
        presidential_only: bool,
    },
    /// Announce a refresh on the updates topic.
    Notify { organizations: u32, candidates: u32 },
}

fn print_summary(summary: &RunSummary) {
    println!(
        "run complete: run_id={} processed={} succeeded={} degraded={} errored={} published={} deleted={} rate_limit_hit={}",
        summary.run_id,
        summary.processed,
        summary.succeeded,
        summary.degraded,
        summary.errored,
        summary.published,
        summary.deleted,
        summary.rate_limit_hit
    );
}

async fn run(cli: Cli) -> Result<u8> {
    let summary = match cli.command {
        Commands::Organizations {
            dry_run,
            company,
            resume,
        } => {
            let options = RunOptions {
                dry_run,
                resume,
                organization: company,
                ..RunOptions::default()
            };
            pacscope_sync::run_organizations_from_env(&options).await?
        }
        Commands::Candidates {
            dry_run,
            states,
            resume,
            presidential_only,
        } => {
            let options = RunOptions {
                dry_run,
                resume,
                jurisdictions: states,
                presidential_only,
                ..RunOptions::default()
            };
            pacscope_sync::run_candidates_from_env(&options).await?
        }
        Commands::Notify {
            organizations,
            candidates,
        } => {
            if organizations == 0 && candidates == 0 {
                Cli::command()
                    .error(ErrorKind::InvalidValue, "nothing to announce: both counts are zero")
                    .exit();
            }
            let config = SyncConfig::from_env();
            let sent = pacscope_sync::send_refresh_notice(&config, organizations, candidates).await?;
            println!("notification sent={sent}");
            return Ok(0);
        }
    };

    print_summary(&summary);
    Ok(summary.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %err, "run aborted");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
