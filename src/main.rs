//! nafder - prefixes and multiplexes the lines of every named pipe in a
//! directory onto stdout.
//!
//! See `nafder --help` for usage.

use std::process;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info};

use nafder::config::{self, Cli};
use nafder::{logging, ConsoleSink, Supervisor};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            process::exit(code);
        }
    };

    // The copy file is opened before the logger exists; report afterwards.
    let copy = cli.copy.as_ref().map(|path| (path.clone(), config::open_copy(path)));
    let mirror = match &copy {
        Some((_, Ok(file))) => file.try_clone().ok(),
        _ => None,
    };

    let log_config = cli.log_config();
    if let Err(e) = logging::init(&log_config, mirror) {
        eprintln!("Failed to set up logging: {}", e);
        process::exit(1);
    }

    let copy = match copy {
        Some((path, Ok(file))) => {
            info!("Copy to {}", path.display());
            Some(file)
        }
        Some((path, Err(e))) => {
            error!("Cannot open {}: {}", path.display(), e);
            None
        }
        None => None,
    };

    if log_config.debug {
        info!("Debug message is enabled");
    }

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let sink = ConsoleSink::new()
        .with_timestamp(config.log.timestamp)
        .with_mirror(copy);

    let supervisor = Supervisor::new(config.target_dir, Arc::new(sink)).with_interval(config.interval);

    if let Err(e) = supervisor.run().await {
        error!("{}", e);
        process::exit(1);
    }
}
