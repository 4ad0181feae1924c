//! electro-viewer CLI.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "electro-viewer",
    version,
    about = "Entity schema cache and single-table key reconstruction for entity-modeled stores"
)]
struct Cli {
    /// Project root (contains electro-viewer.yaml)
    #[arg(long, global = true, env = "ELECTRO_VIEWER_CWD", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: electro_viewer::cli::Commands,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(e) = electro_viewer::cli::dispatch(cli.command, &cli.root) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
