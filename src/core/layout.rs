//! Slave geometry and board placement.
//!
//! Geometry is derived from the pixel count unless a mapping document says
//! otherwise. Placements are board-cell origins; collisions are reported but
//! never rejected, and row packing is offered to resolve them.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Widest auto-derived slave, in cells
pub const AUTO_MAX_WIDTH: u32 = 20;
/// Default gap between packed slaves, in cells
pub const DEFAULT_SPACING: u32 = 2;
/// Longest slave side, in cells. Keeps `w*h` and every cell id inside `i32`.
pub const MAX_SLAVE_SIDE: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveGeometry {
    pub slave_id: i32,
    pub width: u32,
    pub height: u32,
}

impl SlaveGeometry {
    pub fn new(slave_id: i32, width: u32, height: u32) -> Self {
        Self {
            slave_id,
            width: width.clamp(1, MAX_SLAVE_SIDE),
            height: height.clamp(1, MAX_SLAVE_SIDE),
        }
    }

    /// `w = min(20, max(1, n))`, `h = ceil(n / w)`
    pub fn auto(slave_id: i32, pixel_count: u32) -> Self {
        let width = pixel_count.clamp(1, AUTO_MAX_WIDTH);
        let height = pixel_count.div_ceil(width).clamp(1, MAX_SLAVE_SIDE);
        Self {
            slave_id,
            width,
            height,
        }
    }

    pub fn cells(&self) -> u32 {
        self.width.saturating_mul(self.height)
    }
}

/// Board-cell origin of one slave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub slave_id: i32,
    pub ox: i32,
    pub oy: i32,
}

/// Slaves sharing one origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub origin: (i32, i32),
    pub slave_ids: Vec<i32>,
}

/// First-fit row packing by ascending slave id.
///
/// Slaves go left to right separated by `spacing`; a slave that would cross
/// `board_width` starts a new row below the tallest slave of the current row.
/// A slave wider than the board still gets its own row at x = 0.
pub fn auto_arrange(slaves: &[SlaveGeometry], board_width: u32, spacing: u32) -> Vec<Placement> {
    let mut sorted: Vec<&SlaveGeometry> = slaves.iter().collect();
    sorted.sort_by_key(|g| g.slave_id);

    let mut out = Vec::with_capacity(sorted.len());
    let (mut x, mut y, mut row_h) = (0u32, 0u32, 0u32);
    for g in sorted {
        if x > 0 && x + g.width > board_width {
            x = 0;
            y += row_h + spacing;
            row_h = 0;
        }
        out.push(Placement {
            slave_id: g.slave_id,
            ox: x as i32,
            oy: y as i32,
        });
        x += g.width + spacing;
        row_h = row_h.max(g.height);
    }
    out
}

/// Groups of more than one slave at the same origin, ordered by origin.
pub fn detect_overlap<'a>(placements: impl IntoIterator<Item = &'a Placement>) -> Vec<Overlap> {
    let mut by_origin: BTreeMap<(i32, i32), Vec<i32>> = BTreeMap::new();
    for p in placements {
        by_origin.entry((p.oy, p.ox)).or_default().push(p.slave_id);
    }
    by_origin
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((oy, ox), mut slave_ids)| {
            slave_ids.sort_unstable();
            Overlap {
                origin: (ox, oy),
                slave_ids,
            }
        })
        .collect()
}

/// Current placements for a board
#[derive(Debug, Clone, Default)]
pub struct LayoutResolver {
    placements: HashMap<i32, Placement>,
}

impl LayoutResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placement of a slave; unplaced slaves sit at the origin
    pub fn placement(&self, slave_id: i32) -> Placement {
        self.placements
            .get(&slave_id)
            .copied()
            .unwrap_or(Placement {
                slave_id,
                ox: 0,
                oy: 0,
            })
    }

    pub fn is_placed(&self, slave_id: i32) -> bool {
        self.placements.contains_key(&slave_id)
    }

    pub fn set(&mut self, placement: Placement) {
        self.placements.insert(placement.slave_id, placement);
    }

    pub fn set_all(&mut self, placements: impl IntoIterator<Item = Placement>) {
        for p in placements {
            self.set(p);
        }
    }

    /// Re-pack every given slave and store the result
    pub fn arrange(&mut self, slaves: &[SlaveGeometry], board_width: u32, spacing: u32) {
        let packed = auto_arrange(slaves, board_width, spacing);
        info!(
            "Auto-arranged {} slaves (board width {}, spacing {})",
            packed.len(),
            board_width,
            spacing
        );
        for p in &packed {
            debug!("  slave {} -> ({},{})", p.slave_id, p.ox, p.oy);
        }
        self.set_all(packed);
    }

    /// Overlaps among the given slaves, unplaced ones counted at the origin
    pub fn overlaps(&self, slave_ids: impl IntoIterator<Item = i32>) -> Vec<Overlap> {
        let placements: Vec<Placement> = slave_ids.into_iter().map(|id| self.placement(id)).collect();
        detect_overlap(&placements)
    }

    /// Placements for the given slaves, in the given order
    pub fn snapshot(&self, slave_ids: impl IntoIterator<Item = i32>) -> Vec<Placement> {
        slave_ids.into_iter().map(|id| self.placement(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_geometry() {
        assert_eq!(SlaveGeometry::auto(1, 0), SlaveGeometry::new(1, 1, 1));
        assert_eq!(SlaveGeometry::auto(1, 7), SlaveGeometry::new(1, 7, 1));
        assert_eq!(SlaveGeometry::auto(1, 20), SlaveGeometry::new(1, 20, 1));
        assert_eq!(SlaveGeometry::auto(1, 41), SlaveGeometry::new(1, 20, 3));
        assert_eq!(SlaveGeometry::auto(1, 400).cells(), 400);
    }

    #[test]
    fn test_geometry_clamped_to_max_side() {
        let g = SlaveGeometry::new(1, u32::MAX, u32::MAX);
        assert_eq!((g.width, g.height), (MAX_SLAVE_SIDE, MAX_SLAVE_SIDE));
        assert_eq!(g.cells(), MAX_SLAVE_SIDE * MAX_SLAVE_SIDE);
        assert!(g.cells() <= i32::MAX as u32);

        let g = SlaveGeometry::auto(1, u32::MAX);
        assert_eq!((g.width, g.height), (AUTO_MAX_WIDTH, MAX_SLAVE_SIDE));
    }

    #[test]
    fn test_auto_arrange_rows() {
        let slaves = [
            SlaveGeometry::new(3, 10, 5),
            SlaveGeometry::new(1, 10, 2),
            SlaveGeometry::new(2, 10, 4),
        ];
        let placed = auto_arrange(&slaves, 25, 2);
        assert_eq!(
            placed,
            vec![
                Placement { slave_id: 1, ox: 0, oy: 0 },
                Placement { slave_id: 2, ox: 12, oy: 0 },
                Placement { slave_id: 3, ox: 0, oy: 6 },
            ]
        );
    }

    #[test]
    fn test_auto_arrange_is_idempotent() {
        let slaves = [
            SlaveGeometry::new(5, 20, 20),
            SlaveGeometry::new(2, 8, 3),
            SlaveGeometry::new(9, 30, 1),
            SlaveGeometry::new(1, 1, 1),
        ];
        let first = auto_arrange(&slaves, 40, DEFAULT_SPACING);
        let second = auto_arrange(&slaves, 40, DEFAULT_SPACING);
        assert_eq!(first, second);

        let mut resolver = LayoutResolver::new();
        resolver.arrange(&slaves, 40, DEFAULT_SPACING);
        let before = resolver.snapshot([1, 2, 5, 9]);
        resolver.arrange(&slaves, 40, DEFAULT_SPACING);
        assert_eq!(before, resolver.snapshot([1, 2, 5, 9]));
    }

    #[test]
    fn test_oversized_slave_gets_own_row() {
        let slaves = [SlaveGeometry::new(1, 50, 2), SlaveGeometry::new(2, 5, 1)];
        let placed = auto_arrange(&slaves, 30, 2);
        assert_eq!(placed[0], Placement { slave_id: 1, ox: 0, oy: 0 });
        assert_eq!(placed[1], Placement { slave_id: 2, ox: 0, oy: 4 });
    }

    #[test]
    fn test_detect_overlap() {
        let mut resolver = LayoutResolver::new();
        resolver.set(Placement { slave_id: 4, ox: 10, oy: 0 });
        let overlaps = resolver.overlaps([1, 2, 3, 4]);
        assert_eq!(
            overlaps,
            vec![Overlap {
                origin: (0, 0),
                slave_ids: vec![1, 2, 3]
            }]
        );

        resolver.arrange(
            &[
                SlaveGeometry::new(1, 4, 4),
                SlaveGeometry::new(2, 4, 4),
                SlaveGeometry::new(3, 4, 4),
            ],
            100,
            2,
        );
        assert!(resolver.overlaps([1, 2, 3, 4]).is_empty());
    }
}
