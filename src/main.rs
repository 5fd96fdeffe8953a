use pxld_player::app::{self, PlayerApp, RunOptions};
use pxld_player::cli::Args;
use pxld_player::config::{self, Settings};
use pxld_player::core::api::{HttpApi, PxldApi};
use pxld_player::core::connection::Pacing;

use anyhow::Context;
use clap::Parser;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

fn init_logging(args: &Args, path_config: &config::PathConfig) -> anyhow::Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .filter_module("tungstenite", log::LevelFilter::Warn)
            .filter_module("reqwest", log::LevelFilter::Warn)
            .filter_module("rouille", log::LevelFilter::Warn)
            .filter_module("cosmic_text", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .filter_module("tungstenite", log::LevelFilter::Warn)
            .filter_module("reqwest", log::LevelFilter::Warn)
            .filter_module("rouille", log::LevelFilter::Warn)
            .filter_module("cosmic_text", log::LevelFilter::Warn)
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let Some(name) = args.name.clone() else {
        use clap::CommandFactory;
        let mut cmd = Args::command();
        let _ = cmd.print_help();
        println!();
        return Ok(());
    };

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;

    info!("PXLD player starting...");
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());
    let mut settings = Settings::load_or_default(&settings_path);

    // CLI overrides, not persisted
    if let Some(url) = &args.api_base {
        settings.api_base = url.clone();
    }
    if let Some(url) = &args.stream_base {
        settings.stream_base = url.clone();
    }
    if args.pull {
        settings.pacing = Pacing::Pull;
    }
    if args.no_fallback {
        settings.http_fallback = false;
    }
    if args.control_port.is_some() {
        settings.control_port = args.control_port;
    }

    let api: Arc<dyn PxldApi> = Arc::new(HttpApi::new(&settings.api_base, settings.http_timeout())?);
    let conn = app::connection_for(&settings, api.clone());
    let control_port = settings.control_port;
    let mut player = PlayerApp::new(settings, api, conn);

    let snapshot_default = config::data_file("pxld-snapshot.png", &path_config);
    player.set_snapshot_path(args.snapshot.clone().unwrap_or(snapshot_default));

    let opts = RunOptions {
        name,
        autoplay: args.autoplay,
        start_frame: args.start_frame.unwrap_or(0),
        duration: args.duration.filter(|d| *d > 0.0).map(Duration::from_secs_f64),
        snapshot: args.snapshot.clone(),
        control_port,
        initial_view: args.slave,
        ..RunOptions::default()
    };
    player.run(&opts)
}
