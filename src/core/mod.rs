//! Core engine modules - protocol, playback, cache, mapping, layout
//!
//! These modules form the playback engine, independent of any drawing surface.

pub mod api;
pub mod color;
pub mod connection;
pub mod error;
pub mod fallback;
pub mod frame_cache;
pub mod layout;
pub mod mapping;
pub mod player;
pub mod protocol;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod loopback;

// Re-exports for convenience
pub use api::{HttpApi, PxldApi};
pub use color::{ColorPolicy, Rgb, WhiteBlend};
pub use connection::{ConnectionManager, Connector, Pacing, Transport, WsConnector};
pub use error::{PlayerError, PlayerResult};
pub use fallback::HttpConnector;
pub use frame_cache::{CacheStats, FrameCache, RgbwBuffer};
pub use layout::{LayoutResolver, Placement, SlaveGeometry};
pub use mapping::{IdOrder, MCU_UNASSIGNED, MappingEntry, MappingTable};
pub use player::{PlaybackController, PlaybackState, PlayerEvent};
pub use scheduler::{RenderScheduler, ScheduledTask};
pub use session::{Board, Scope, Selection, Slave, ViewMode};
