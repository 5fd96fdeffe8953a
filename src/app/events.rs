//! Playback commands, picking/editing, and controller event handling.

use std::time::Instant;

use log::{debug, trace, warn};

use super::PlayerApp;
use crate::core::error::{PlayerError, PlayerResult};
use crate::core::player::{PlaybackState, PlayerEvent};
use crate::core::session::{Selection, ViewMode};
use crate::render::Hit;
use crate::render::pick;

impl PlayerApp {
    /// Connect (if needed) and ask the server to open the board's show for
    /// the current scope
    pub(crate) fn open_session(&mut self, now: Instant) -> PlayerResult<()> {
        if self.board.name.is_empty() {
            return Err(PlayerError::InvalidState {
                op: "play",
                state: "no show loaded",
            });
        }
        if self.controller.state() == PlaybackState::Disconnected {
            self.controller.connect()?;
        }
        self.controller.init(&self.board.name, self.scope, now)
    }

    /// Start playback at `frame`. Connects and inits on demand; playback
    /// then starts when the server reports ready.
    pub fn play(&mut self, frame: u32, now: Instant) -> PlayerResult<()> {
        let result = match self.controller.state() {
            PlaybackState::Disconnected | PlaybackState::Connected => {
                self.pending_play = Some(frame);
                self.open_session(now)
            }
            PlaybackState::Initializing => {
                self.pending_play = Some(frame);
                Ok(())
            }
            PlaybackState::Ready | PlaybackState::Paused | PlaybackState::Playing => {
                self.controller.play(frame, now)
            }
        };
        if let Err(e) = &result {
            self.pending_play = None;
            self.status.error(format!("Play failed: {}", e), now);
        }
        self.redraw.request();
        result
    }

    /// Play from the current frame
    pub fn resume(&mut self, now: Instant) -> PlayerResult<()> {
        let frame = self.controller.current_frame();
        self.play(frame, now)
    }

    pub fn pause(&mut self, now: Instant) -> PlayerResult<()> {
        self.pending_play = None;
        let result = self.controller.pause(now);
        self.report(&result, "Pause", now);
        result
    }

    pub fn stop(&mut self, now: Instant) -> PlayerResult<()> {
        self.pending_play = None;
        let result = self.controller.stop(now);
        self.report(&result, "Stop", now);
        result
    }

    /// Scrub to `frame`
    pub fn seek(&mut self, frame: u32, now: Instant) -> PlayerResult<()> {
        let result = self.controller.seek(frame, now);
        self.report(&result, "Seek", now);
        result
    }

    fn report(&mut self, result: &PlayerResult<()>, what: &str, now: Instant) {
        if let Err(e) = result {
            self.status.warning(format!("{} failed: {}", what, e), now);
        }
        self.redraw.request();
    }

    /// Switch to one slave (`id >= 0`) or the board (`-1`). A different
    /// playback scope re-inits the session, resuming playback if it was
    /// running.
    pub fn select_view(&mut self, id: i32, now: Instant) -> PlayerResult<ViewMode> {
        let view = match self.board.select_view(id) {
            Ok(v) => v,
            Err(e) => {
                self.status.error(e.to_string(), now);
                return Err(e);
            }
        };
        self.redraw.request();

        let scope = view.scope();
        if scope == self.scope {
            return Ok(view);
        }
        self.scope = scope;
        let state = self.controller.state();
        if state.has_session() || state == PlaybackState::Initializing {
            let frame = self.controller.current_frame();
            if state == PlaybackState::Playing || self.pending_play.is_some() {
                self.pending_play = Some(frame);
            }
            if let Err(e) = self.controller.init(&self.board.name, scope, now) {
                self.pending_play = None;
                self.status.error(format!("Re-init for {} failed: {}", scope, e), now);
                return Err(e);
            }
        }
        self.status.info(format!("View: {}", scope), now);
        Ok(view)
    }

    /// Pick at a logical pointer position on the current view
    pub fn click(&mut self, px: f32, py: f32, now: Instant) -> Option<Hit> {
        let hit = self.renderer.pick_at(&self.board, px, py);
        self.select(hit, now);
        hit
    }

    /// Pick a grid cell of the current view
    pub fn pick_cell(&mut self, gx: i32, gy: i32, now: Instant) -> Option<Hit> {
        let hit = pick::pick(&self.board, gx, gy);
        self.select(hit, now);
        hit
    }

    fn select(&mut self, hit: Option<Hit>, now: Instant) {
        self.board.selection = hit.map(Selection::from);
        if let Some((sel, entry)) = self.board.picked() {
            self.status.info(
                format!(
                    "S{} ({},{}) pxld={} mcu={}",
                    sel.slave_id, sel.x, sel.y, entry.pxld_id, entry.mcu_id
                ),
                now,
            );
        }
        self.redraw.request();
    }

    /// Edit the picked cell. A duplicate mcu id is refused and the mapping
    /// stays as it was.
    pub fn apply(&mut self, pxld_id: i32, mcu_id: i32, now: Instant) -> PlayerResult<Selection> {
        match self.board.apply_to_selection(pxld_id, mcu_id) {
            Ok(sel) => {
                self.status.success(
                    format!("S{} ({},{}) -> pxld={} mcu={}", sel.slave_id, sel.x, sel.y, pxld_id, mcu_id),
                    now,
                );
                self.redraw.request();
                Ok(sel)
            }
            Err(e) => {
                self.status.error(e.to_string(), now);
                Err(e)
            }
        }
    }

    /// Turn controller events into board/status updates
    pub(crate) fn handle_player_events(&mut self, now: Instant) {
        for event in self.controller.drain_events() {
            match event {
                PlayerEvent::Connected(pacing) => {
                    let via = if self.controller.via_fallback() { " via HTTP polling" } else { "" };
                    self.status.info(format!("Connected{} ({:?} pacing)", via, pacing), now);
                }
                PlayerEvent::Ready { total_frames, fps } => {
                    self.board.total_frames = total_frames;
                    self.board.fps = fps;
                    self.status
                        .success(format!("Ready: {} frames @ {} fps", total_frames, fps), now);
                    let still = self
                        .pending_still
                        .take()
                        .unwrap_or_else(|| self.controller.current_frame());
                    let result = match self.pending_play.take() {
                        Some(f) => self.controller.play(f, now),
                        None => self.controller.seek(still, now),
                    };
                    if let Err(e) = result {
                        warn!("Start after ready failed: {}", e);
                        self.status.error(e.to_string(), now);
                    }
                }
                PlayerEvent::InitFailed(e) => {
                    self.pending_play = None;
                    self.status.error(format!("Init failed: {}", e), now);
                }
                PlayerEvent::FrameShown { frame, from_cache } => {
                    trace!("Frame {} shown (cache: {})", frame, from_cache);
                }
                PlayerEvent::FrameDropped { frame, reason } => {
                    trace!("Frame {} dropped: {:?}", frame, reason);
                    continue;
                }
                PlayerEvent::Started(frame) => debug!("Server playing from {}", frame),
                PlayerEvent::Paused(frame) => debug!("Server paused at {}", frame),
                PlayerEvent::Stopped => self.status.info("Stopped", now),
                PlayerEvent::DecodeFailed(e) => self.status.warning(format!("Frame skipped: {}", e), now),
                PlayerEvent::ServerError(message) => self.status.error(message, now),
                PlayerEvent::Disconnected(reason) => {
                    self.pending_play = None;
                    self.status.warning(format!("Disconnected: {}", reason), now);
                }
            }
            self.redraw.request();
        }
    }
}
