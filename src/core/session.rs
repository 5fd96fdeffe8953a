//! Board context: slaves, geometry, placement, mapping and view state.
//!
//! One `Board` is owned by the app loop and borrowed by the controller and
//! renderer; nothing in it is shared across threads.

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::{PlayerError, PlayerResult};
use super::layout::{LayoutResolver, Overlap, Placement, SlaveGeometry};
use super::mapping::{IdOrder, MappingEntry, MappingTable};

/// Wire value for "all slaves"
pub const ALL_SLAVES: i32 = -1;

/// Device scope of a frame or playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    All,
    Slave(i32),
}

impl Scope {
    pub fn from_wire(id: i32) -> Self {
        if id < 0 { Scope::All } else { Scope::Slave(id) }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Scope::All => ALL_SLAVES,
            Scope::Slave(id) => id,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::All => write!(f, "all"),
            Scope::Slave(id) => write!(f, "slave {}", id),
        }
    }
}

/// One device on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slave {
    pub id: i32,
    pub pixel_count: u32,
}

/// Which part of the board is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Board,
    Single(i32),
}

impl ViewMode {
    pub fn scope(self) -> Scope {
        match self {
            ViewMode::Board => Scope::All,
            ViewMode::Single(id) => Scope::Slave(id),
        }
    }
}

/// Picked cell, in slave-local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub slave_id: i32,
    pub x: u32,
    pub y: u32,
}

/// Owned editor/player context
#[derive(Debug, Clone)]
pub struct Board {
    /// PXLD show name
    pub name: String,
    /// Slaves in source order
    slaves: IndexMap<i32, Slave>,
    pub mapping: MappingTable,
    pub layout: LayoutResolver,
    pub view: ViewMode,
    pub selection: Option<Selection>,
    /// Board grid in cells
    pub grid_w: u32,
    pub grid_h: u32,
    pub fps: f64,
    pub total_frames: u32,
}

impl Board {
    pub fn new(name: impl Into<String>, grid_w: u32, grid_h: u32, order: IdOrder) -> Self {
        Self {
            name: name.into(),
            slaves: IndexMap::new(),
            mapping: MappingTable::new(order),
            layout: LayoutResolver::new(),
            view: ViewMode::Board,
            selection: None,
            grid_w: grid_w.max(1),
            grid_h: grid_h.max(1),
            fps: 0.0,
            total_frames: 0,
        }
    }

    /// Register slaves with auto geometry, keeping source order
    pub fn set_slaves(&mut self, slaves: impl IntoIterator<Item = Slave>) {
        self.slaves.clear();
        for s in slaves {
            self.mapping.set_geometry(SlaveGeometry::auto(s.id, s.pixel_count));
            self.slaves.insert(s.id, s);
        }
        info!("Board '{}': {} slaves", self.name, self.slaves.len());
    }

    pub fn slaves(&self) -> impl Iterator<Item = &Slave> {
        self.slaves.values()
    }

    pub fn slave(&self, id: i32) -> Option<&Slave> {
        self.slaves.get(&id)
    }

    pub fn slave_ids(&self) -> Vec<i32> {
        self.slaves.keys().copied().collect()
    }

    /// `(id, pixel_count)` in source order, for splitting merged buffers
    pub fn pixel_counts(&self) -> Vec<(i32, u32)> {
        self.slaves.values().map(|s| (s.id, s.pixel_count)).collect()
    }

    pub fn geometry(&self, id: i32) -> Option<SlaveGeometry> {
        self.mapping.geometry(id)
    }

    pub fn geometries(&self) -> Vec<SlaveGeometry> {
        self.slaves
            .keys()
            .filter_map(|id| self.mapping.geometry(*id))
            .collect()
    }

    pub fn placement(&self, id: i32) -> Placement {
        self.layout.placement(id)
    }

    pub fn overlaps(&self) -> Vec<Overlap> {
        self.layout.overlaps(self.slaves.keys().copied())
    }

    pub fn auto_arrange(&mut self, spacing: u32) {
        let geoms = self.geometries();
        self.layout.arrange(&geoms, self.grid_w, spacing);
    }

    /// Switch between board view and one slave; `-1` means board
    pub fn select_view(&mut self, id: i32) -> PlayerResult<ViewMode> {
        let view = if id < 0 {
            ViewMode::Board
        } else if self.slaves.contains_key(&id) {
            ViewMode::Single(id)
        } else {
            return Err(PlayerError::UnknownSlave(id));
        };
        if view != self.view {
            debug!("View {:?} -> {:?}", self.view, view);
            self.view = view;
            self.selection = None;
        }
        Ok(view)
    }

    /// Selected cell with its resolved mapping
    pub fn picked(&self) -> Option<(Selection, MappingEntry)> {
        let sel = self.selection?;
        let entry = self.mapping.resolve(sel.slave_id, sel.x, sel.y)?;
        Some((sel, entry))
    }

    /// Apply an edit to the selected cell
    pub fn apply_to_selection(&mut self, pxld_id: i32, mcu_id: i32) -> PlayerResult<Selection> {
        let sel = self.selection.ok_or(PlayerError::InvalidState {
            op: "apply mapping",
            state: "nothing selected",
        })?;
        self.mapping.apply(sel.slave_id, sel.x, sel.y, pxld_id, mcu_id)?;
        Ok(sel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> Board {
        let mut b = Board::new("show.pxld", 60, 40, IdOrder::RowMajor);
        b.set_slaves([
            Slave { id: 7, pixel_count: 30 },
            Slave { id: 2, pixel_count: 4 },
        ]);
        b
    }

    #[test]
    fn test_scope_wire() {
        assert_eq!(Scope::from_wire(-1), Scope::All);
        assert_eq!(Scope::from_wire(3), Scope::Slave(3));
        assert_eq!(Scope::Slave(3).to_wire(), 3);
        assert_eq!(Scope::All.to_wire(), ALL_SLAVES);
    }

    #[test]
    fn test_source_order_and_geometry() {
        let b = board();
        assert_eq!(b.slave_ids(), vec![7, 2]);
        assert_eq!(b.geometry(7), Some(SlaveGeometry::new(7, 20, 2)));
        assert_eq!(b.pixel_counts(), vec![(7, 30), (2, 4)]);
        assert_eq!(b.overlaps().len(), 1);
    }

    #[test]
    fn test_select_view_clears_selection() {
        let mut b = board();
        b.selection = Some(Selection { slave_id: 7, x: 1, y: 1 });
        assert_eq!(b.select_view(2).unwrap(), ViewMode::Single(2));
        assert!(b.selection.is_none());
        assert_eq!(b.select_view(5), Err(PlayerError::UnknownSlave(5)));
        assert_eq!(b.view, ViewMode::Single(2));
        assert_eq!(b.select_view(-1).unwrap(), ViewMode::Board);
    }

    #[test]
    fn test_apply_requires_selection() {
        let mut b = board();
        assert!(matches!(
            b.apply_to_selection(1, 1),
            Err(PlayerError::InvalidState { .. })
        ));
        b.selection = Some(Selection { slave_id: 2, x: 3, y: 0 });
        b.apply_to_selection(0, 9).unwrap();
        let (_, entry) = b.picked().unwrap();
        assert_eq!(entry, MappingEntry { pxld_id: 0, mcu_id: 9 });
    }
}
