use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Downloads RCM and Sentinel imagery for one FEWS run.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// FEWS PI run description
    #[arg(short = 'r', long = "runInfoFile")]
    run_info_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Unable to install log subscriber: {e}"))?;

    let cli = Cli::parse();
    let code = eo_acquire::run::run(&cli.run_info_file).await;
    Ok(ExitCode::from(code))
}
