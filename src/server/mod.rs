//! Local control endpoint for driving the player from scripts or a browser.
//!
//! ```text
//! API server thread (rouille)  ── ApiCommand (mpsc) ──▶  app loop
//!                              ◀── SharedApiState (RwLock snapshots) ──
//! ```
//!
//! | Method | Path                      | Description                 |
//! |--------|---------------------------|-----------------------------|
//! | GET    | `/api/status`             | Player, board, cache status |
//! | GET    | `/api/health`             | Health check                |
//! | POST   | `/api/player/play`        | Start playback              |
//! | POST   | `/api/player/pause`       | Pause                       |
//! | POST   | `/api/player/stop`        | Stop (frame 0)              |
//! | POST   | `/api/player/frame/{n}`   | Seek to frame n             |
//! | POST   | `/api/view/{id}`          | Slave view, -1 for board    |
//! | POST   | `/api/pick`               | Pick cell `{x, y}`          |
//! | POST   | `/api/mapping/apply`      | Edit picked `{pxld_id, mcu_id}` |
//! | POST   | `/api/mapping/save`       | Persist all mappings        |
//! | POST   | `/api/layout/arrange`     | Auto-arrange and save       |
//! | POST   | `/api/snapshot[?path=]`   | Write PNG of current view   |

mod api;

pub use api::{
    ApiCommand, ApiServer, BoardSnapshot, CacheSnapshot, PickSnapshot, PlayerSnapshot, SharedApiState,
    SlaveSnapshot, StatusResponse,
};
