//! QAFlow command-line entry point.
//!
//! Usage:
//!   qaflow                              Console with default settings
//!   qaflow --settings ./SaveDirectory.json
//!   qaflow --log-level debug

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "qaflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file holding the save directories
    #[arg(long, env = "QAFLOW_SETTINGS")]
    settings: Option<PathBuf>,

    /// Root of the default output tree (defaults to ~/QAFlow)
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let options = qaflow_lib::AppOptions {
        settings_path: cli.settings,
        data_root: cli.data_root,
    };
    if let Err(e) = qaflow_lib::run(options).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
