//! Control endpoint handling for PlayerApp.
//!
//! Contains methods for:
//! - Starting the endpoint (start_api_server)
//! - Publishing state snapshots (update_api_state)
//! - Dispatching received commands (handle_api_commands)

use std::path::PathBuf;
use std::time::Instant;

use log::{trace, warn};

use super::PlayerApp;
use crate::server::{ApiCommand, ApiServer, BoardSnapshot, CacheSnapshot, PickSnapshot, PlayerSnapshot, SlaveSnapshot};

impl PlayerApp {
    /// Start the control endpoint on `port`. Failure to bind is reported and
    /// playback continues without it.
    pub fn start_api_server(&mut self, port: u16, now: Instant) {
        if self.api_command_rx.is_some() {
            return;
        }
        match ApiServer::start(port, self.api_state.clone()) {
            Ok(rx) => self.api_command_rx = Some(rx),
            Err(e) => self.status.warning(format!("{:#}", e), now),
        }
    }

    /// Copy current state into the shared snapshots
    pub fn update_api_state(&self) {
        let c = &self.controller;
        {
            let mut player = self.api_state.player.write().unwrap_or_else(|e| e.into_inner());
            let (frame, total_frames, fps) = match c.session() {
                Some(s) => (s.current_frame, s.total_frames, s.fps),
                None => (0, self.board.total_frames, self.board.fps),
            };
            *player = PlayerSnapshot {
                state: c.state().name().to_string(),
                frame,
                total_frames,
                fps,
                measured_fps: c.stats().measured_fps(),
                playing: c.is_playing(),
                connected: c.is_connected(),
                via_fallback: c.via_fallback(),
            };
        }

        {
            let b = &self.board;
            let slaves = b
                .slaves()
                .map(|s| {
                    let p = b.placement(s.id);
                    let (w, h) = b.geometry(s.id).map_or((0, 0), |g| (g.width, g.height));
                    SlaveSnapshot {
                        slave_id: s.id,
                        pixel_count: s.pixel_count,
                        ox: p.ox,
                        oy: p.oy,
                        w,
                        h,
                    }
                })
                .collect();
            let picked = b.picked().map(|(sel, entry)| PickSnapshot {
                slave_id: sel.slave_id,
                x: sel.x,
                y: sel.y,
                pxld_id: entry.pxld_id,
                mcu_id: entry.mcu_id,
            });
            let mut board = self.api_state.board.write().unwrap_or_else(|e| e.into_inner());
            *board = BoardSnapshot {
                name: b.name.clone(),
                grid_w: b.grid_w,
                grid_h: b.grid_h,
                view: b.view.scope().to_wire(),
                slaves,
                picked,
                overlaps: b.overlaps().len(),
            };
        }

        {
            let cache = c.cache();
            let stats = cache.stats();
            let mut snap = self.api_state.cache.write().unwrap_or_else(|e| e.into_inner());
            *snap = CacheSnapshot {
                entries: cache.len(),
                bytes: cache.bytes(),
                hits: stats.hits(),
                misses: stats.misses(),
                hit_rate: stats.hit_rate(),
            };
        }

        *self.api_state.status.write().unwrap_or_else(|e| e.into_inner()) = self.status.display();
    }

    /// Handle commands received since the last call
    pub fn handle_api_commands(&mut self, now: Instant) {
        // Collect first (avoids borrowing the receiver while mutating self)
        let commands: Vec<ApiCommand> = match &self.api_command_rx {
            Some(rx) => rx.try_iter().collect(),
            None => return,
        };
        for cmd in commands {
            self.handle_api_command(cmd, now);
        }
    }

    pub(crate) fn handle_api_command(&mut self, cmd: ApiCommand, now: Instant) {
        trace!("API command: {:?}", cmd);
        // Failures are already on the status line
        let _ = match cmd {
            ApiCommand::Play => self.resume(now),
            ApiCommand::Pause => self.pause(now),
            ApiCommand::Stop => self.stop(now),
            ApiCommand::SetFrame(frame) => self.seek(frame, now),
            ApiCommand::View(id) => self.select_view(id, now).map(|_| ()),
            ApiCommand::Pick { x, y } => {
                self.pick_cell(x, y, now);
                Ok(())
            }
            ApiCommand::Apply { pxld_id, mcu_id } => self.apply(pxld_id, mcu_id, now).map(|_| ()),
            ApiCommand::SaveMapping => self.save_all(now),
            ApiCommand::ArrangeLayout => self.arrange_and_save_layout(now),
            ApiCommand::Snapshot(path) => {
                let path = path.map(PathBuf::from).or_else(|| self.snapshot_path.clone());
                match path {
                    Some(p) => {
                        if let Err(e) = self.snapshot(&p) {
                            warn!("{:#}", e);
                            self.status.error(format!("{:#}", e), now);
                        } else {
                            self.status.success(format!("Snapshot: {}", p.display()), now);
                        }
                    }
                    None => self.status.warning("No snapshot path configured", now),
                }
                Ok(())
            }
        };
        self.update_api_state();
    }
}
