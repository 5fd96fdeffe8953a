use clap::Parser;
use std::path::PathBuf;

// Build version with transport info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Stream: tungstenite 0.24 (websocket), reqwest 0.12 (http fallback)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// PXLD LED-matrix show player
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// PXLD show name on the server (e.g. show.pxld)
    #[arg(value_name = "NAME")]
    pub name: Option<String>,

    /// HTTP API base URL (overrides settings)
    #[arg(long = "api", value_name = "URL")]
    pub api_base: Option<String>,

    /// Streaming base URL (overrides settings)
    #[arg(long = "stream", value_name = "URL")]
    pub stream_base: Option<String>,

    /// Slave to play, -1 for all slaves
    #[arg(short = 's', long = "slave", value_name = "ID", default_value_t = -1, allow_hyphen_values = true)]
    pub slave: i32,

    /// Auto-play on startup
    #[arg(short = 'a', long = "autoplay")]
    pub autoplay: bool,

    /// Start frame number (0-based)
    #[arg(long = "frame", value_name = "N")]
    pub start_frame: Option<u32>,

    /// Stop after this many seconds (default: run until interrupted)
    #[arg(short = 'd', long = "duration", value_name = "SECS")]
    pub duration: Option<f64>,

    /// Write a PNG of the board on exit
    #[arg(long = "snapshot", value_name = "PNG")]
    pub snapshot: Option<PathBuf>,

    /// Serve the local control endpoint on this port
    #[arg(long = "port", value_name = "PORT")]
    pub control_port: Option<u16>,

    /// Request every frame instead of letting the server stream
    #[arg(long = "pull")]
    pub pull: bool,

    /// Do not fall back to HTTP polling when the stream is unavailable
    #[arg(long = "no-fallback")]
    pub no_fallback: bool,

    /// Enable debug logging to file (default: pxld-player.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["pxld-player", "show.pxld"]);
        assert_eq!(args.name.as_deref(), Some("show.pxld"));
        assert_eq!(args.slave, -1);
        assert!(!args.autoplay);
        assert!(args.log_file.is_none());
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from([
            "pxld-player", "show.pxld", "--slave", "3", "-a", "--frame", "10", "-vv", "--log", "--port", "9876",
        ]);
        assert_eq!(args.slave, 3);
        assert!(args.autoplay);
        assert_eq!(args.start_frame, Some(10));
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
        assert_eq!(args.control_port, Some(9876));
    }
}
