//! Paths and persistent settings

mod paths;
mod settings;

pub use paths::{LOG_FILE, PathConfig, SETTINGS_FILE, config_file, data_file, ensure_dirs};
pub use settings::Settings;
