//! PXLD player - LED-matrix show playback, pixel mapping and board rendering
//!
//! Re-exports all modules for use by the binary target.

// Core engine (protocol, playback, cache, mapping, layout)
pub mod core;

// Drawing
pub mod render;

// App modules
pub mod app;
pub mod cli;
pub mod config;
pub mod server;
pub mod status;

// Re-export commonly used types from core
pub use core::api::{HttpApi, PxldApi};
pub use core::error::{PlayerError, PlayerResult};
pub use core::player::{PlaybackController, PlaybackState, PlayerEvent};
pub use core::session::{Board, Scope, ViewMode};

pub use app::{PlayerApp, RunOptions};
