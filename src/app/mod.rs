//! Application module - PlayerApp and related functionality.
//!
//! The app loop owns the board, the playback controller and the drawing
//! surface; nothing here is shared across threads except the control
//! endpoint's snapshots. Submodules:
//! - `session_io` - bootstrap from the HTTP API, mapping/layout persistence
//! - `events` - playback commands, picking/editing, controller events
//! - `api` - control endpoint start, snapshots, command dispatch
//! - `run` - the blocking main loop

mod api;
mod events;
mod run;
mod session_io;

pub use run::RunOptions;

use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Instant;

use anyhow::Context;
use log::info;

use crate::config::Settings;
use crate::core::api::PxldApi;
use crate::core::connection::{ConnectionManager, WsConnector};
use crate::core::fallback::HttpConnector;
use crate::core::player::PlaybackController;
use crate::core::scheduler::RenderScheduler;
use crate::core::session::{Board, Scope};
use crate::render::{Canvas, HudState, RasterCanvas, Renderer};
use crate::server::{ApiCommand, SharedApiState};
use crate::status::StatusLine;

/// Stream connector from settings, with the HTTP polling fallback when
/// enabled
pub fn connection_for(settings: &Settings, api: Arc<dyn PxldApi>) -> ConnectionManager {
    let ws = WsConnector::new(&settings.stream_base).with_pacing(settings.pacing);
    let conn = ConnectionManager::new(Box::new(ws));
    if settings.http_fallback {
        conn.with_fallback(Box::new(HttpConnector::new(api)))
    } else {
        conn
    }
}

/// Main application state
pub struct PlayerApp {
    pub(crate) board: Board,
    pub(crate) controller: PlaybackController,
    pub(crate) api: Arc<dyn PxldApi>,
    pub(crate) renderer: Renderer,
    pub(crate) redraw: RenderScheduler,
    pub(crate) status: StatusLine,
    pub(crate) settings: Settings,
    /// Playback scope requested for the next init
    pub(crate) scope: Scope,
    /// Frame to play once `playback_ready` arrives
    pub(crate) pending_play: Option<u32>,
    /// Frame to show (without playing) once `playback_ready` arrives
    pub(crate) pending_still: Option<u32>,
    surface: RasterCanvas,
    snapshot_path: Option<PathBuf>,
    api_state: Arc<SharedApiState>,
    api_command_rx: Option<mpsc::Receiver<ApiCommand>>,
}

impl PlayerApp {
    pub fn new(settings: Settings, api: Arc<dyn PxldApi>, conn: ConnectionManager) -> Self {
        let controller = PlaybackController::new(conn, settings.playback_config());
        let board = Board::new("", settings.grid_w, settings.grid_h, settings.id_order);
        Self {
            board,
            controller,
            api,
            renderer: Renderer::new(settings.render_options()),
            redraw: RenderScheduler::default(),
            status: StatusLine::new(settings.status_ttl()),
            scope: Scope::All,
            pending_play: None,
            pending_still: None,
            surface: RasterCanvas::new(),
            snapshot_path: None,
            api_state: Arc::new(SharedApiState::default()),
            api_command_rx: None,
            settings,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Default target for `Snapshot` commands without a path
    pub fn set_snapshot_path(&mut self, path: PathBuf) {
        self.snapshot_path = Some(path);
    }

    pub fn hud(&self) -> HudState {
        let (frame, total_frames) = match self.controller.session() {
            Some(s) => (s.current_frame, s.total_frames),
            None => (0, self.board.total_frames),
        };
        HudState {
            state: self.controller.state().name().to_string(),
            frame,
            total_frames,
            measured_fps: self.controller.stats().measured_fps(),
            transport: self.controller.via_fallback().then(|| "http polling".to_string()),
            status: self.status.display(),
        }
    }

    /// Full redraw onto any canvas
    pub fn render_to(&self, canvas: &mut dyn Canvas) {
        self.renderer
            .render(canvas, &self.board, self.controller.view(), &self.hud());
    }

    /// Redraw the surface if something changed since the last draw
    pub fn draw(&mut self) -> bool {
        if !self.redraw.take() {
            return false;
        }
        let mut surface = std::mem::take(&mut self.surface);
        self.render_to(&mut surface);
        self.surface = surface;
        true
    }

    pub fn surface(&self) -> &RasterCanvas {
        &self.surface
    }

    /// Render now and write the surface as PNG
    pub fn snapshot(&mut self, path: &Path) -> anyhow::Result<()> {
        self.redraw.request();
        self.draw();
        self.surface
            .save_png(path)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
        info!("Snapshot written to {}", path.display());
        Ok(())
    }

    /// One loop iteration: controller I/O and timers, events, status expiry
    pub fn tick(&mut self, now: Instant) {
        self.controller.tick(now);
        self.handle_player_events(now);
        if self.status.expire(now) {
            self.redraw.request();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::api::MappingDoc;
    use crate::core::connection::Pacing;
    use crate::core::error::PlayerError;
    use crate::core::layout::{Placement, SlaveGeometry};
    use crate::core::loopback::{LoopbackConnector, LoopbackServer, MockApi};
    use crate::core::mapping::MapPoint;
    use crate::core::player::PlaybackState;
    use crate::core::protocol::{ClientMessage, ServerMessage, SlaveFrame};
    use crate::core::session::ViewMode;
    use crate::render::{DrawList, Rect, Rgba};
    use std::time::Duration;

    fn app_with(api: MockApi) -> (PlayerApp, LoopbackServer, Arc<MockApi>) {
        let api = Arc::new(api);
        let (connector, server) = LoopbackConnector::new(Pacing::Push);
        let conn = ConnectionManager::new(Box::new(connector));
        let app = PlayerApp::new(Settings::default(), api.clone(), conn);
        (app, server, api)
    }

    fn ready_app(t0: Instant) -> (PlayerApp, LoopbackServer, Arc<MockApi>) {
        let (mut app, server, api) = app_with(MockApi::with_two_slaves());
        app.bootstrap("show.pxld", t0).unwrap();
        (app, server, api)
    }

    fn frame_all(frame: u32, b64: &str) -> ServerMessage {
        ServerMessage::FrameDataAll {
            frame,
            slaves: vec![SlaveFrame {
                slave_id: 1,
                rgbw_b64: b64.to_string(),
                pixel_count: None,
            }],
        }
    }

    #[test]
    fn test_end_to_end_play_pause() {
        let t0 = Instant::now();
        let (mut app, server, _) = ready_app(t0);

        app.play(0, t0).unwrap();
        assert_eq!(
            server.take_sent(),
            vec![ClientMessage::PlaybackInit {
                filename: "show.pxld".into(),
                slave_id: -1,
            }]
        );

        server.push(&ServerMessage::PlaybackReady {
            total_frames: 100,
            fps: 30.0,
            slave_ids: None,
        });
        app.tick(t0 + Duration::from_millis(5));
        assert_eq!(app.controller().state(), PlaybackState::Playing);
        assert_eq!(
            server.take_sent(),
            vec![ClientMessage::PlaybackPlay {
                frame: 0,
                slave_id: None,
            }]
        );

        server.push(&ServerMessage::PlaybackStarted { frame: 0 });
        server.push(&frame_all(0, "AAAAAA=="));
        app.tick(t0 + Duration::from_millis(10));

        let mut canvas = DrawList::new();
        app.render_to(&mut canvas);
        let black: Vec<&Rect> = canvas
            .fills()
            .filter(|(_, c)| **c == Rgba::opaque(0, 0, 0))
            .map(|(r, _)| r)
            .collect();
        // Slave 1 is auto-arranged at the origin, pxld 0 at its (0,0)
        assert_eq!(black, vec![&Rect::new(0.0, 0.0, 12.0, 12.0)]);

        app.pause(t0 + Duration::from_millis(20)).unwrap();
        server.push(&frame_all(1, "AQEBAQ=="));
        app.tick(t0 + Duration::from_millis(40));
        assert_eq!(app.controller().current_frame(), 0);
        assert_eq!(app.controller().view().frame(), Some(0));
    }

    #[test]
    fn test_bootstrap_merges_mappings_and_degrades() {
        let mut api = MockApi::with_two_slaves();
        api.failing_mappings.insert(1);
        api.mappings.get_mut().unwrap().insert(
            2,
            MappingDoc {
                version: 2,
                slave_id: 2,
                ox: Some(30),
                oy: Some(4),
                w: Some(1),
                h: Some(2),
                map: vec![
                    MapPoint { x: 0, y: 0, pxld_id: 1, mcu_id: 7 },
                    MapPoint { x: 0, y: 1, pxld_id: 0, mcu_id: 8 },
                ],
            },
        );
        let (mut app, _server, _) = app_with(api);
        app.bootstrap("show.pxld", Instant::now()).unwrap();

        let b = app.board();
        assert_eq!(b.slave_ids(), vec![1, 2]);
        assert_eq!(b.geometry(1), Some(SlaveGeometry::new(1, 4, 1)));
        assert_eq!(b.geometry(2), Some(SlaveGeometry::new(2, 1, 2)));
        assert_eq!(b.placement(2), Placement { slave_id: 2, ox: 30, oy: 4 });
        assert_eq!(b.mapping.resolve(2, 0, 1).map(|e| e.mcu_id), Some(8));
        // Slave 1 has no placement and sits at the origin without overlap
        assert_eq!(b.placement(1), Placement { slave_id: 1, ox: 0, oy: 0 });
        assert_eq!(b.total_frames, 100);
    }

    #[test]
    fn test_bootstrap_failure_keeps_board() {
        let t0 = Instant::now();
        let (mut app, _server, _) = ready_app(t0);
        let err = app.bootstrap("", t0).unwrap_err();
        assert!(matches!(err, PlayerError::Api(_)));
        assert_eq!(app.board().name, "show.pxld");
        assert!(app.status().display().unwrap().contains("PXLD not found"));
    }

    #[test]
    fn test_overlap_rearranged() {
        let api = MockApi::with_two_slaves();
        *api.layout.lock().unwrap() = crate::core::api::LayoutDoc::new(vec![
            Placement { slave_id: 1, ox: 5, oy: 5 },
            Placement { slave_id: 2, ox: 5, oy: 5 },
        ]);
        let (mut app, _server, _) = app_with(api);
        app.bootstrap("show.pxld", Instant::now()).unwrap();
        assert!(app.board().overlaps().is_empty());
        assert_eq!(app.board().placement(2), Placement { slave_id: 2, ox: 6, oy: 0 });
    }

    #[test]
    fn test_pick_apply_and_save() {
        let t0 = Instant::now();
        let (mut app, _server, api) = ready_app(t0);

        // Slave 2 auto-arranged at (6,0)
        let hit = app.click(7.0 * 12.0 + 3.0, 5.0, t0).unwrap();
        assert_eq!((hit.slave_id, hit.local_x, hit.local_y), (2, 1, 0));
        app.apply(0, 9, t0).unwrap();
        assert_eq!(app.board().mapping.resolve(2, 1, 0).map(|e| e.mcu_id), Some(9));

        app.pick_cell(6, 0, t0).unwrap();
        assert!(matches!(app.apply(1, 9, t0), Err(PlayerError::DuplicateMcuId { .. })));
        assert!(!app.board().mapping.is_explicit(2, 0, 0));

        app.save_slave(2, t0).unwrap();
        app.save_all(t0).unwrap();
        app.arrange_and_save_layout(t0).unwrap();
        assert_eq!(api.posts(), vec!["mapping 2", "batch 2", "layout 2"]);
        let stored = api.mappings.lock().unwrap().get(&2).cloned().unwrap();
        assert_eq!(stored.map.len(), 1);
        assert_eq!((stored.ox, stored.w), (Some(6), Some(2)));
    }

    #[test]
    fn test_failed_save_reports_and_keeps_state() {
        let mut api = MockApi::with_two_slaves();
        api.fail_posts = true;
        let (mut app, _server, _) = app_with(api);
        let t0 = Instant::now();
        app.bootstrap("show.pxld", t0).unwrap();
        app.pick_cell(0, 0, t0).unwrap();
        app.apply(3, -1, t0).unwrap();
        assert!(app.save_slave(1, t0).is_err());
        assert!(app.status().display().unwrap().contains("read-only"));
        assert!(app.board().mapping.is_explicit(1, 0, 0));
    }

    #[test]
    fn test_view_change_reinits_and_resumes() {
        let t0 = Instant::now();
        let (mut app, server, _) = ready_app(t0);
        app.play(0, t0).unwrap();
        server.push(&ServerMessage::PlaybackReady {
            total_frames: 100,
            fps: 30.0,
            slave_ids: None,
        });
        app.tick(t0);
        server.take_sent();

        assert_eq!(app.select_view(2, t0).unwrap(), ViewMode::Single(2));
        assert_eq!(app.scope(), Scope::Slave(2));
        assert_eq!(
            server.take_sent(),
            vec![ClientMessage::PlaybackInit {
                filename: "show.pxld".into(),
                slave_id: 2,
            }]
        );
        server.push(&ServerMessage::PlaybackReady {
            total_frames: 100,
            fps: 30.0,
            slave_ids: Some(vec![2]),
        });
        app.tick(t0 + Duration::from_millis(1));
        assert_eq!(app.controller().state(), PlaybackState::Playing);
        assert!(matches!(
            server.take_sent().as_slice(),
            [ClientMessage::PlaybackPlay { slave_id: Some(2), .. }]
        ));

        assert!(app.select_view(42, t0).is_err());
        assert_eq!(app.board().view, ViewMode::Single(2));
    }

    #[test]
    fn test_api_commands_dispatch() {
        let t0 = Instant::now();
        let (mut app, _server, _) = ready_app(t0);
        app.handle_api_command(ApiCommand::View(1), t0);
        app.handle_api_command(ApiCommand::Pick { x: 2, y: 0 }, t0);
        app.handle_api_command(ApiCommand::Apply { pxld_id: 3, mcu_id: -1 }, t0);
        assert_eq!(app.board().view, ViewMode::Single(1));
        assert_eq!(app.board().mapping.resolve(1, 2, 0).map(|e| e.pxld_id), Some(3));

        let board = app.api_state.board.read().unwrap().clone();
        assert_eq!(board.view, 1);
        assert_eq!(board.picked.map(|p| p.pxld_id), Some(3));
        assert_eq!(board.slaves.len(), 2);
    }
}
