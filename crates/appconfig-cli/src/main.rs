//! appconfig-probe: run configuration-service health probes.
//!
//! # Usage
//!
//! ```text
//! appconfig-probe check --config appconfig-probe.toml --format json
//! appconfig-probe watch --config appconfig-probe.toml --interval 30
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "appconfig-probe",
    about = "Probe configuration-service endpoints by reading configured keys",
    version,
    propagate_version = true
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every configured check once and print the report.
    ///
    /// Exits with status 1 when the report is not healthy.
    Check {
        /// Settings file with one [[check]] table per probe.
        #[arg(short, long, default_value = "appconfig-probe.toml")]
        config: PathBuf,
        /// Only run checks carrying this tag.
        #[arg(short, long)]
        tag: Option<String>,
        /// Report format.
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Re-run the checks on an interval until interrupted.
    Watch {
        #[arg(short, long, default_value = "appconfig-probe.toml")]
        config: PathBuf,
        /// Seconds between runs.
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,appconfig_health=debug".into());
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    match cli.command {
        Command::Check {
            config,
            tag,
            format,
        } => {
            let healthy = commands::check(&config, tag.as_deref(), format).await?;
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Watch { config, interval } => commands::watch(&config, interval).await,
    }
}
