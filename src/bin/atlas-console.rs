//! Atlas Console
//!
//! Runs the gateway, or performs one maintenance task and exits.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use comfy_table::Table;
use tracing::{error, info};

use atlas_console::app;
use atlas_console::config::ConsoleConfig;
use atlas_console::dns::record::{RecordCandidate, RecordType, TenantId};
use atlas_console::dns::validation;
use atlas_console::dns::RequestContext;
use atlas_console::errors::{ConsoleError, Result};
use atlas_console::logging;
use atlas_console::web;

/// Operations console for Kea DHCP and BIND DNS
#[derive(Parser)]
#[command(name = "atlas-console")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "ATLAS_CONFIG")]
    config: Option<PathBuf>,

    /// Keep data in memory even when a database URL is configured
    #[arg(long)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway with health and backup timers
    Serve {
        /// Overrides web.bind_address
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Take one full backup of every tenant
    Backup,

    /// Delete backups older than the retention period
    Cleanup,

    /// List backups, newest first
    ListBackups,

    /// Run every health probe once
    Check,

    /// Print a zone in zone-file format
    ExportZone {
        zone: String,
        #[arg(short, long, default_value = "default")]
        tenant: String,
    },

    /// Validate a single record without storing it
    Validate {
        name: String,
        #[arg(value_name = "TYPE")]
        record_type: String,
        value: String,
        #[arg(long)]
        ttl: Option<i64>,
        #[arg(long)]
        priority: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ConsoleConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = logging::init(&config.logging);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: ConsoleConfig) -> Result<()> {
    if let Commands::Validate {
        name,
        record_type,
        value,
        ttl,
        priority,
    } = &cli.command
    {
        return validate(name, record_type, value, *ttl, *priority);
    }

    let store = app::open_store(&config, cli.in_memory).await?;
    let state = app::build_state(&config, store)?;

    match cli.command {
        Commands::Serve { bind } => {
            let addr = match bind {
                Some(addr) => addr,
                None => config
                    .web
                    .bind_address
                    .parse()
                    .map_err(|_| ConsoleError::Config(format!("Invalid bind address: {}", config.web.bind_address)))?,
            };
            let timers = app::start_timers(&config, &state);
            let result = web::serve(addr, state).await;
            timers.stop();
            result
        }
        Commands::Backup => {
            let manifest = state.backups.perform_full_backup(None).await?;
            let mut table = Table::new();
            table.set_header(vec!["Component", "Status", "Counts", "Warnings"]);
            for result in &manifest.components {
                let counts = result
                    .counts
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(" ");
                table.add_row(vec![
                    result.component.to_string(),
                    result.status.to_string(),
                    counts,
                    result.warnings.join("; "),
                ]);
            }
            println!("{}", table);
            println!("Backup {} written to {}", manifest.id, state.backups.root().display());
            Ok(())
        }
        Commands::Cleanup => {
            let deleted = state.backups.cleanup_old_backups().await?;
            println!("Deleted {} old backups", deleted);
            Ok(())
        }
        Commands::ListBackups => {
            let backups = state.backups.list_backups().await?;
            if backups.is_empty() {
                println!("No backups found in {}", state.backups.root().display());
                return Ok(());
            }
            let mut table = Table::new();
            table.set_header(vec!["ID", "Timestamp", "Compressed", "Size", "Complete"]);
            for backup in &backups {
                table.add_row(vec![
                    backup.id.clone(),
                    backup.timestamp.to_rfc3339(),
                    backup.compressed.to_string(),
                    format!("{} KiB", backup.size_bytes / 1024),
                    backup.is_complete().to_string(),
                ]);
            }
            println!("{}", table);
            Ok(())
        }
        Commands::Check => {
            let status = state.monitor.run_health_checks().await;
            let mut table = Table::new();
            table.set_header(vec!["Check", "Status", "Time (ms)", "Message"]);
            for result in status.checks.values() {
                table.add_row(vec![
                    result.check_name.clone(),
                    result.status.to_string(),
                    result.response_time_ms.map(|ms| ms.to_string()).unwrap_or_default(),
                    result.message.clone(),
                ]);
            }
            println!("{}", table);
            println!("Overall: {}", status.overall);
            info!(overall = %status.overall, failed = status.failed_checks, "Health check run complete");
            Ok(())
        }
        Commands::ExportZone { zone, tenant } => {
            let ctx = RequestContext::new(TenantId::new(tenant), "cli");
            print!("{}", state.dns.export_zone(&ctx, &zone).await?);
            Ok(())
        }
        Commands::Validate { .. } => Ok(()),
    }
}

fn validate(name: &str, record_type: &str, value: &str, ttl: Option<i64>, priority: Option<i64>) -> Result<()> {
    let record_type: RecordType = record_type.parse()?;
    let mut candidate = RecordCandidate::new(name, record_type, value);
    candidate.ttl = ttl;
    candidate.priority = priority;

    let report = validation::validate_record(&candidate);
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    if report.is_valid {
        println!("valid");
        Ok(())
    } else {
        Err(ConsoleError::Validation(report.errors))
    }
}
