//! Persistent settings (`pxld-player.json`).
//!
//! Every field has a default so partial files load. CLI flags are applied
//! on top by `main` and are not written back.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::api::DEFAULT_API_BASE;
use crate::core::color::ColorPolicy;
use crate::core::connection::{DEFAULT_STREAM_BASE, Pacing};
use crate::core::frame_cache::DEFAULT_MAX_ENTRIES;
use crate::core::layout::DEFAULT_SPACING;
use crate::core::mapping::IdOrder;
use crate::core::player::PlaybackConfig;
use crate::render::renderer::{DEFAULT_CELL, RenderOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Endpoints
    pub api_base: String,
    pub stream_base: String,
    pub http_timeout_ms: u64,
    pub pacing: Pacing,
    pub http_fallback: bool,

    // Board
    pub grid_w: u32,
    pub grid_h: u32,
    pub id_order: IdOrder,
    pub arrange_spacing: u32,
    pub auto_arrange_on_overlap: bool,

    // Rendering
    pub cell: f32,
    pub dpr: f32,
    pub show_grid: bool,
    pub color: ColorPolicy,

    // Playback
    pub guard_ms: u64,
    pub init_timeout_ms: u64,
    pub cache_max_entries: usize,
    pub cache_max_mb: usize,

    // UI
    pub status_ttl_ms: u64,
    pub control_port: Option<u16>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            stream_base: DEFAULT_STREAM_BASE.to_string(),
            http_timeout_ms: 5000,
            pacing: Pacing::Push,
            http_fallback: true,
            grid_w: 140,
            grid_h: 80,
            id_order: IdOrder::RowMajor,
            arrange_spacing: DEFAULT_SPACING,
            auto_arrange_on_overlap: true,
            cell: DEFAULT_CELL,
            dpr: 1.0,
            show_grid: true,
            color: ColorPolicy::default(),
            guard_ms: 100,
            init_timeout_ms: 5000,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            cache_max_mb: 256,
            status_ttl_ms: 3000,
            control_port: None,
        }
    }
}

impl Settings {
    /// Strict load; errors on unreadable or malformed files
    pub fn try_load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    /// Missing file → defaults; malformed file → warning + defaults
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::try_load(path) {
            Ok(s) => {
                info!("Loaded settings from {}", path.display());
                s
            }
            Err(e) => {
                warn!("{:#}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write settings: {}", path.display()))?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_millis(self.status_ttl_ms)
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            guard: Duration::from_millis(self.guard_ms),
            init_timeout: Duration::from_millis(self.init_timeout_ms),
            cache_max_entries: self.cache_max_entries.max(1),
            cache_max_bytes: self.cache_max_mb.max(1) * 1024 * 1024,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            cell: if self.cell > 0.0 { self.cell } else { DEFAULT_CELL },
            dpr: if self.dpr > 0.0 { self.dpr } else { 1.0 },
            show_grid: self.show_grid,
            policy: self.color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::color::WhiteBlend;

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pxld-player.json");
        let mut s = Settings::default();
        s.grid_w = 64;
        s.pacing = Pacing::Pull;
        s.color.blend = WhiteBlend::Ignore;
        s.control_port = Some(9876);
        s.save(&path).unwrap();
        assert_eq!(Settings::try_load(&path).unwrap(), s);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pxld-player.json");
        std::fs::write(&path, r#"{"grid_w": 32, "id_order": "column_major"}"#).unwrap();
        let s = Settings::load_or_default(&path);
        assert_eq!(s.grid_w, 32);
        assert_eq!(s.grid_h, 80);
        assert_eq!(s.id_order, IdOrder::ColumnMajor);
        assert_eq!(s.api_base, DEFAULT_API_BASE);
    }

    #[test]
    fn test_malformed_or_missing_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("pxld-player.json");
        assert_eq!(Settings::load_or_default(&path), Settings::default());
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Settings::try_load(&path).is_err());
        assert_eq!(Settings::load_or_default(&path), Settings::default());
    }

    #[test]
    fn test_derived_configs() {
        let mut s = Settings::default();
        s.guard_ms = 250;
        s.cache_max_mb = 0;
        s.cell = -3.0;
        let pc = s.playback_config();
        assert_eq!(pc.guard, Duration::from_millis(250));
        assert_eq!(pc.cache_max_bytes, 1024 * 1024);
        assert_eq!(s.render_options().cell, DEFAULT_CELL);
    }
}
