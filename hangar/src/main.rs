//! Hangar - Entry Point
//!
//! Game server deployment orchestrator. Serves the deployment API and its
//! push channel, or with `--watch` follows a remote server's deployments.

use std::collections::HashMap;
use std::env;

use hangar::app::options::AppOptions;
use hangar::app::run::{run, watch};
use hangar::filesys::file::File;
use hangar::logs::{init_logging, LogOptions};
use hangar::storage::layout::StorageLayout;
use hangar::storage::settings::Settings;
use hangar::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };

    // Write default settings and exit
    if cli_args.contains_key("init") {
        if settings_file.exists().await {
            println!("Settings already exist at {}", settings_file.path().display());
            return;
        }
        if let Err(e) = layout.setup().await {
            eprintln!("Failed to create {}: {}", layout.base_dir.display(), e);
            return;
        }
        match settings_file.write_json(&Settings::default()).await {
            Ok(()) => println!("Wrote default settings to {}", settings_file.path().display()),
            Err(e) => eprintln!("Failed to write settings: {}", e),
        }
        return;
    }

    // A missing settings file means defaults
    let settings = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!(
                    "Unable to read settings file {}: {}",
                    settings_file.path().display(),
                    e
                );
                return;
            }
        }
    } else {
        Settings::default()
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.json_logs,
        log_dir: settings.log_to_file.then(|| layout.logs_dir()),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    let options = AppOptions::from_settings(&settings);
    info!("Running Hangar {} with options: {:?}", version.version, options);

    let result = match cli_args.get("watch") {
        Some(base_url) => watch(base_url, options, await_shutdown_signal()).await,
        None => run(options, await_shutdown_signal()).await,
    };
    if let Err(e) = result {
        error!("Hangar exited with an error: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Failed to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
