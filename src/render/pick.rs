//! Cell picking.
//!
//! Pointer position → board cell → slave. In board view slaves are tested in
//! source order and the first rectangle containing the cell wins, so with
//! overlapping placements the earlier slave is picked. In single-slave view
//! the cell is already slave-local.
//!
//! Complexity: O(slaves) per click.

use log::debug;

use crate::core::session::{Board, Selection, ViewMode};

/// Result of a pick: the slave and the cell in its local grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub slave_id: i32,
    pub local_x: u32,
    pub local_y: u32,
}

impl From<Hit> for Selection {
    fn from(h: Hit) -> Self {
        Selection {
            slave_id: h.slave_id,
            x: h.local_x,
            y: h.local_y,
        }
    }
}

/// Logical pointer position → grid cell (`floor(p / cell)`); None for
/// negative positions
pub fn pointer_to_cell(px: f32, py: f32, cell: f32) -> Option<(i32, i32)> {
    if px < 0.0 || py < 0.0 || cell <= 0.0 {
        return None;
    }
    Some(((px / cell).floor() as i32, (py / cell).floor() as i32))
}

/// Board cell → slave-local cell, first containing slave in source order
pub fn hit_test(board: &Board, gx: i32, gy: i32) -> Option<Hit> {
    for slave in board.slaves() {
        let Some(g) = board.geometry(slave.id) else {
            continue;
        };
        let p = board.placement(slave.id);
        let (lx, ly) = (gx - p.ox, gy - p.oy);
        if lx >= 0 && ly >= 0 && (lx as u32) < g.width && (ly as u32) < g.height {
            return Some(Hit {
                slave_id: slave.id,
                local_x: lx as u32,
                local_y: ly as u32,
            });
        }
    }
    None
}

/// Resolve a click in the current view. Board view goes through
/// [`hit_test`]; single view checks the slave's own bounds.
pub fn pick(board: &Board, gx: i32, gy: i32) -> Option<Hit> {
    let hit = match board.view {
        ViewMode::Board => hit_test(board, gx, gy),
        ViewMode::Single(id) => {
            let g = board.geometry(id)?;
            (gx >= 0 && gy >= 0 && (gx as u32) < g.width && (gy as u32) < g.height).then_some(Hit {
                slave_id: id,
                local_x: gx as u32,
                local_y: gy as u32,
            })
        }
    };
    debug!("pick ({},{}) in {:?} -> {:?}", gx, gy, board.view, hit);
    hit
}
