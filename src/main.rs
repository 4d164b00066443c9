use clap::Parser;
use std::path::PathBuf;
use strata::cli::{self, Args};
use strata::core::config::loader::CONFIG_FILE_NAME;
use strata::logging;

fn main() {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    if let Err(err) = logging::init(Some(&config_path), args.verbose) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }

    if let Err(err) = cli::run(args) {
        tracing::error!(error = %err, "command failed");
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
