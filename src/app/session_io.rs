//! Board bootstrap and mapping/layout persistence for PlayerApp.
//!
//! Bootstrap builds a fresh [`Board`] off to the side and only swaps it in
//! once info and slaves loaded, so a failed bootstrap leaves the previous
//! board untouched. Save operations never mutate in-memory state.

use std::time::Instant;

use log::{debug, info, warn};

use super::PlayerApp;
use crate::core::api::{LayoutDoc, MAPPING_VERSION, MappingDoc, SlaveInfo};
use crate::core::error::{PlayerError, PlayerResult};
use crate::core::layout::{Placement, SlaveGeometry};
use crate::core::session::Board;

/// Merge one stored mapping into the board: explicit size overrides the
/// auto geometry, origin seeds the placement, points replace the entries
fn apply_mapping_doc(board: &mut Board, doc: &MappingDoc) {
    let id = doc.slave_id;
    if let (Some(w), Some(h)) = (doc.w, doc.h) {
        if w > 0 && h > 0 {
            board.mapping.set_geometry(SlaveGeometry::new(id, w, h));
        }
    }
    if let (Some(ox), Some(oy)) = (doc.ox, doc.oy) {
        board.layout.set(Placement { slave_id: id, ox, oy });
    }
    match board.mapping.load(id, &doc.map) {
        Ok(n) => debug!("Slave {}: {} mapped cells", id, n),
        Err(e) => warn!("Slave {}: mapping not loaded: {}", id, e),
    }
}

impl PlayerApp {
    /// Load show info, slaves, every slave's mapping (in parallel) and the
    /// board layout for `name`
    pub fn bootstrap(&mut self, name: &str, now: Instant) -> PlayerResult<()> {
        let result = self.load_board(name);
        match result {
            Ok(board) => {
                let overlaps = board.overlaps();
                self.controller.set_pixel_counts(board.pixel_counts());
                self.status.success(
                    format!(
                        "Loaded {}: {} slaves, {} frames @ {} fps",
                        name,
                        board.slave_ids().len(),
                        board.total_frames,
                        board.fps
                    ),
                    now,
                );
                if let Some(o) = overlaps.first() {
                    self.status.warning(
                        format!(
                            "Slaves {:?} overlap at ({},{})",
                            o.slave_ids, o.origin.0, o.origin.1
                        ),
                        now,
                    );
                }
                self.board = board;
                self.redraw.request();
                Ok(())
            }
            Err(e) => {
                self.status.error(format!("Load {} failed: {}", name, e), now);
                Err(e)
            }
        }
    }

    fn load_board(&self, name: &str) -> PlayerResult<Board> {
        let info = self.api.info(name)?;
        let slaves = self.api.slaves(name)?;
        info!(
            "PXLD '{}': {} frames @ {} fps, {} slaves, {} pixels",
            name,
            info.total_frames,
            info.fps,
            slaves.len(),
            info.total_pixels
        );

        let s = &self.settings;
        let mut board = Board::new(name, s.grid_w, s.grid_h, s.id_order);
        board.fps = info.fps;
        board.total_frames = info.total_frames;
        board.set_slaves(slaves.iter().map(SlaveInfo::slave));

        let api = &self.api;
        let fetched: Vec<(i32, PlayerResult<Option<MappingDoc>>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = board
                .slave_ids()
                .into_iter()
                .map(|id| (id, scope.spawn(move || api.get_mapping(id))))
                .collect();
            handles
                .into_iter()
                .map(|(id, h)| {
                    let result = h
                        .join()
                        .unwrap_or_else(|_| Err(PlayerError::Api("mapping fetch panicked".into())));
                    (id, result)
                })
                .collect()
        });
        for (id, result) in fetched {
            match result {
                Ok(Some(doc)) => apply_mapping_doc(&mut board, &doc),
                Ok(None) => debug!("Slave {}: no stored mapping, auto geometry", id),
                Err(e) => warn!("Slave {}: mapping fetch failed ({}), using auto geometry", id, e),
            }
        }

        match self.api.get_layout() {
            Ok(doc) => {
                let known: Vec<Placement> = doc
                    .layout
                    .into_iter()
                    .filter(|p| board.slave(p.slave_id).is_some())
                    .collect();
                board.layout.set_all(known);
            }
            Err(e) => warn!("Layout fetch failed: {}", e),
        }

        let ids = board.slave_ids();
        let spacing = s.arrange_spacing;
        if !ids.iter().any(|id| board.layout.is_placed(*id)) {
            info!("No stored placements, auto-arranging");
            board.auto_arrange(spacing);
        } else {
            let overlaps = board.overlaps();
            if !overlaps.is_empty() {
                warn!("{} overlapping slave groups", overlaps.len());
                if s.auto_arrange_on_overlap {
                    board.auto_arrange(spacing);
                }
            }
        }
        Ok(board)
    }

    /// Persistable document for one slave: full grid, placement and size
    pub fn mapping_doc(&self, slave_id: i32) -> PlayerResult<MappingDoc> {
        let geometry = self
            .board
            .geometry(slave_id)
            .ok_or(PlayerError::UnknownSlave(slave_id))?;
        let placement = self.board.placement(slave_id);
        Ok(MappingDoc {
            version: MAPPING_VERSION,
            slave_id,
            ox: Some(placement.ox),
            oy: Some(placement.oy),
            w: Some(geometry.width),
            h: Some(geometry.height),
            map: self.board.mapping.to_persistable(slave_id)?,
        })
    }

    pub fn save_slave(&mut self, slave_id: i32, now: Instant) -> PlayerResult<()> {
        let result = self
            .mapping_doc(slave_id)
            .and_then(|doc| self.api.set_mapping(&doc));
        match &result {
            Ok(()) => self.status.success(format!("Saved mapping for slave {}", slave_id), now),
            Err(e) => self
                .status
                .error(format!("Save slave {} failed: {}", slave_id, e), now),
        }
        result
    }

    /// Save every slave's mapping in one batch request
    pub fn save_all(&mut self, now: Instant) -> PlayerResult<()> {
        let result = self
            .board
            .slave_ids()
            .into_iter()
            .map(|id| self.mapping_doc(id))
            .collect::<PlayerResult<Vec<_>>>()
            .and_then(|docs| self.api.set_mappings_batch(&docs).map(|_| docs.len()));
        match result {
            Ok(n) => {
                self.status.success(format!("Saved {} mappings", n), now);
                Ok(())
            }
            Err(e) => {
                self.status.error(format!("Save mappings failed: {}", e), now);
                Err(e)
            }
        }
    }

    pub fn save_layout(&mut self, now: Instant) -> PlayerResult<()> {
        let doc = LayoutDoc::new(self.board.layout.snapshot(self.board.slave_ids()));
        let result = self.api.set_layout(&doc);
        match &result {
            Ok(()) => self
                .status
                .success(format!("Saved layout ({} slaves)", doc.layout.len()), now),
            Err(e) => self.status.error(format!("Save layout failed: {}", e), now),
        }
        result
    }

    /// Re-pack all slaves on the board and persist the result
    pub fn arrange_and_save_layout(&mut self, now: Instant) -> PlayerResult<()> {
        self.board.auto_arrange(self.settings.arrange_spacing);
        self.redraw.request();
        self.save_layout(now)
    }
}
