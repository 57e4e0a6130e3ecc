//! farmctl - Entry Point
//!
//! Drives a farm of attached devices: discovery, group actions and macro
//! playback, with a local HTTP control API.

use std::collections::HashMap;
use std::env;

use colored::Colorize;
use tracing::{error, info, info_span};

use farmctl::app::options::AppOptions;
use farmctl::app::run::run;
use farmctl::bridge::{AdbBridge, DeviceBridge};
use farmctl::device::DeviceState;
use farmctl::gateway::CommandGateway;
use farmctl::logs::{init_logging, LogLevel, LogOptions};
use farmctl::storage::layout::StorageLayout;
use farmctl::storage::settings::Settings;
use farmctl::utils::version_info;

#[tokio::main(flavor = "current_thread")]
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
            Ok(json) => println!("{json}"),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file
    let mut settings = match Settings::load(&layout.settings_file()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return;
        }
    };
    if let Some(level) = cli_args.get("log-level") {
        match level.parse::<LogLevel>() {
            Ok(level) => settings.log_level = level,
            Err(e) => eprintln!("{e}, keeping {:?}", settings.log_level),
        }
    }

    // One-shot discovery listing
    if cli_args.contains_key("devices") {
        list_devices(&settings, &layout).await;
        return;
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_to_file.then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, layout);
    info!("Running farmctl {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the controller: {e}");
    }
}

async fn list_devices(settings: &Settings, layout: &StorageLayout) {
    let options = AppOptions::from_settings(settings, layout.clone());
    let gateway = CommandGateway::new(options.gateway, info_span!("gateway"));
    let bridge = AdbBridge::new(gateway.into());

    let devices = match bridge.list_devices().await {
        Ok(devices) => devices,
        Err(e) => {
            eprintln!("{} {}", "Discovery failed:".red().bold(), e);
            return;
        }
    };

    if devices.is_empty() {
        println!("{}", "No devices attached".yellow());
        return;
    }

    for device in devices {
        let state = format!("{:?}", device.state).to_uppercase();
        let state = match device.state {
            DeviceState::Online => state.green(),
            DeviceState::Offline => state.red(),
            DeviceState::Unauthorized => state.yellow(),
            DeviceState::Unknown => state.dimmed(),
        };
        println!(
            "{:<24} {:<14} {}",
            device.id.bold(),
            state,
            device.model.as_deref().unwrap_or("-")
        );
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) =
            (signal(SignalKind::terminate()), signal(SignalKind::interrupt()))
        else {
            error!("Unable to install signal handlers, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
