//! batchlane CLI.
//!
//! Entry point for the `batchlane` command-line tool.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use batchlane::config::{ApiCredential, SubmitConfig};
use batchlane::job;
use batchlane::ledger::{Ledger, SubmissionStatus};
use batchlane::mock::{MockPlatform, MockUploadTool};
use batchlane::platform::{HttpPlatformClient, PlatformApi};
use batchlane::scheduler::SubmissionScheduler;
use batchlane::upload::{CliUploadTool, UploadTool};

#[derive(Parser)]
#[command(name = "batchlane")]
#[command(about = "Concurrent, rate-paced batch job submission", version)]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a batch of jobs
    Submit {
        /// Path to the job batch JSON file
        #[arg(long, short = 'j')]
        jobs: PathBuf,

        /// Path to config file (default: batchlane.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Ledger path, overriding the config
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Do everything except real uploads and API calls
        #[arg(long)]
        dry_run: bool,
    },

    /// Show ledger outcomes and jobs needing follow-up
    Status {
        /// Path to config file (default: batchlane.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Ledger path, overriding the config
        #[arg(long)]
        ledger: Option<PathBuf>,
    },

    /// Validate config and job batch without side effects
    Validate {
        /// Path to the job batch JSON file
        #[arg(long, short = 'j')]
        jobs: PathBuf,

        /// Path to config file (default: batchlane.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Submit {
            jobs,
            config,
            ledger,
            dry_run,
        } => run_submit(jobs, config, ledger, dry_run),
        Commands::Status { config, ledger } => run_status(config, ledger),
        Commands::Validate { jobs, config } => run_validate(jobs, config),
    };
    process::exit(code);
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<SubmitConfig, i32> {
    let config = SubmitConfig::load(path.as_deref()).map_err(|e| {
        error!("{e}");
        1
    })?;
    config.validate().map_err(|e| {
        error!("{e}");
        1
    })?;
    Ok(config)
}

fn run_submit(
    jobs_path: PathBuf,
    config_path: Option<PathBuf>,
    ledger_override: Option<PathBuf>,
    dry_run: bool,
) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let jobs = match job::load_batch(&jobs_path) {
        Ok(jobs) => jobs,
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };
    info!(jobs = jobs.len(), "job batch loaded");

    let (tool, api): (Arc<dyn UploadTool>, Arc<dyn PlatformApi>) = if dry_run {
        info!("dry-run: using in-memory upload tool and platform");
        (Arc::new(MockUploadTool::new()), Arc::new(MockPlatform::new()))
    } else {
        let credential = match ApiCredential::from_env() {
            Ok(credential) => credential,
            Err(e) => {
                error!("{e}");
                return 1;
            }
        };
        let client = match HttpPlatformClient::new(&config.base_url, credential.clone()) {
            Ok(client) => client,
            Err(e) => {
                error!("{e}");
                return 1;
            }
        };
        (
            Arc::new(CliUploadTool::new(&config.upload, credential)),
            Arc::new(client),
        )
    };

    let ledger_path = ledger_override.unwrap_or_else(|| config.ledger_path.clone());
    let ledger = Ledger::open(ledger_path);

    let scheduler = SubmissionScheduler::new(tool, api, config.throttle.clone());
    let cancel = scheduler.cancellation_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    }) {
        warn!("could not install interrupt handler: {e}");
    }

    match scheduler.run(jobs, &ledger) {
        Ok(summary) => {
            info!(
                submitted = summary.submitted,
                skipped = summary.skipped,
                failed = summary.failed,
                created_not_submitted = summary.created_not_submitted,
                not_attempted = summary.not_attempted,
                "done"
            );
            if summary.has_failures() {
                2
            } else {
                0
            }
        }
        Err(e) => {
            error!("{e}");
            1
        }
    }
}

fn run_status(config_path: Option<PathBuf>, ledger_override: Option<PathBuf>) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let ledger_path = ledger_override.unwrap_or_else(|| config.ledger_path.clone());
    let ledger = Ledger::open(&ledger_path);

    let index = match ledger.load_index() {
        Ok(index) => index,
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };

    let mut submitted = 0usize;
    let mut pending = 0usize;
    let mut failed = Vec::new();
    let mut created_not_submitted = Vec::new();
    for record in index.records() {
        match record.status {
            SubmissionStatus::Submitted => submitted += 1,
            SubmissionStatus::Pending => pending += 1,
            SubmissionStatus::Failed => failed.push(record),
            SubmissionStatus::CreatedNotSubmitted => created_not_submitted.push(record),
        }
    }

    println!("ledger: {}", ledger_path.display());
    println!("  submitted:             {submitted}");
    println!("  failed:                {}", failed.len());
    println!("  created-not-submitted: {}", created_not_submitted.len());
    println!("  pending (interrupted): {pending}");

    if !created_not_submitted.is_empty() {
        println!("\njobs created but never submitted (manual submit or cleanup):");
        for record in &created_not_submitted {
            println!(
                "  {} (job id {})",
                record.job_name,
                record.job_id.as_deref().unwrap_or("?")
            );
        }
    }
    if !failed.is_empty() {
        println!("\nfailed jobs (re-run submit to retry):");
        for record in &failed {
            println!(
                "  {} after {} attempt(s): {}",
                record.job_name,
                record.attempts,
                record.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    0
}

fn run_validate(jobs_path: PathBuf, config_path: Option<PathBuf>) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    match job::load_batch(&jobs_path) {
        Ok(jobs) => {
            println!(
                "ok: {} job(s), burst {} / gap {}s, {} upload worker(s)",
                jobs.len(),
                config.throttle.burst_size,
                config.throttle.gap_seconds,
                config.throttle.max_upload_concurrency
            );
            0
        }
        Err(e) => {
            error!("{e}");
            1
        }
    }
}
