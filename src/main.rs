use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repovault::{backup_all, BatchReport, MirrorResult, RunOptions};

/// Exit status when the configuration cannot be read at all
const EXIT_BAD_INPUT: u8 = 2;

#[derive(Parser)]
#[command(name = "repovault")]
#[command(about = "Back up every repository a GitHub or GitLab token can see as bare mirrors")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON, or YAML with a .yml/.yaml extension).
    /// Reads a JSON list from stdin when omitted.
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// List and filter repositories without touching the disk
    #[arg(long)]
    dry_run: bool,

    /// Exit non-zero when any single repository fails to mirror
    #[arg(long)]
    strict: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_format) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::from(EXIT_BAD_INPUT);
    }
    info!("Starting RepoVault v{}", env!("CARGO_PKG_VERSION"));

    let configs = match repovault::config::load(cli.config.as_deref()) {
        Ok(configs) => configs,
        Err(e) => {
            error!("Cannot load configuration: {:#}", e);
            return ExitCode::from(EXIT_BAD_INPUT);
        }
    };

    let options = RunOptions {
        dry_run: cli.dry_run,
        strict: cli.strict,
    };
    let report = backup_all(configs, options).await;

    print_report(&report, options);
    ExitCode::from(report.exit_code(options.strict))
}

/// Initialize logging on stderr; stdout is reserved for the run summary
fn init_logging(verbose: bool, format: LogFormat) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let layer = fmt::layer().with_writer(std::io::stderr);
    let layer = match format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    };

    tracing_subscriber::registry().with(layer).with(filter).try_init()?;

    Ok(())
}

fn print_report(report: &BatchReport, options: RunOptions) {
    for (index, record) in report.records.iter().enumerate() {
        match record {
            Ok(summary) => {
                if options.dry_run {
                    println!("\n🔍 Dry run for record {} ({} as {})", index, summary.provider, summary.username);
                } else {
                    println!("\n🎉 Backup complete for record {} ({} as {})", index, summary.provider, summary.username);
                }
                println!("   📄 Pages: {}", summary.pages);
                println!("   🔍 Repositories listed: {}", summary.discovered);
                if options.dry_run {
                    println!("   📋 Would mirror: {}", summary.planned());
                } else {
                    println!("   ✅ Mirrored: {}", summary.mirrored());
                    println!("   ❌ Failed: {}", summary.failed());
                }
                println!("   ⏭️  Filtered out: {}", summary.filtered_out);
                if summary.duplicates > 0 {
                    println!("   🔁 Duplicate listings: {}", summary.duplicates);
                }
                if !summary.invalid_names.is_empty() {
                    println!("   ⚠️  Invalid names skipped: {}", summary.invalid_names.len());
                }
                println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

                for result in &summary.results {
                    match result {
                        MirrorResult::Planned { full_name, path } => {
                            println!("   📥 {} -> {}", full_name, path.display());
                        }
                        MirrorResult::Failed {
                            full_name, error, ..
                        } => {
                            println!("   ❌ {}: {}", full_name, error);
                        }
                        MirrorResult::Mirrored { .. } => {}
                    }
                }
            }
            Err(e) => {
                println!("\n❌ Record {} failed: {}", index, e);
            }
        }
    }
}
