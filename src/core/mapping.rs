//! Per-slave pixel mapping: local (x,y) → (pxld_id, mcu_id).
//!
//! Cells without an explicit entry resolve to a default id computed by the
//! slave's [`IdOrder`]; the same formula backs display and save so a slave
//! never mixes orders. `mcu_id` values are unique within one slave except the
//! sentinel [`MCU_UNASSIGNED`].

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::error::{PlayerError, PlayerResult};
use super::layout::SlaveGeometry;

/// mcu_id meaning "not wired"; exempt from uniqueness
pub const MCU_UNASSIGNED: i32 = -1;

/// Default pxld_id formula for unmapped cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdOrder {
    /// `y * w + x`
    #[default]
    RowMajor,
    /// `x * h + y`
    ColumnMajor,
}

impl IdOrder {
    pub fn default_id(self, x: u32, y: u32, geometry: &SlaveGeometry) -> i32 {
        let (major, stride, minor) = match self {
            IdOrder::RowMajor => (y, geometry.width, x),
            IdOrder::ColumnMajor => (x, geometry.height, y),
        };
        let id = u64::from(major) * u64::from(stride) + u64::from(minor);
        i32::try_from(id).unwrap_or(i32::MAX)
    }
}

/// Resolved address of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub pxld_id: i32,
    pub mcu_id: i32,
}

/// Wire/persisted form of one mapped cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: u32,
    pub y: u32,
    pub pxld_id: i32,
    #[serde(default = "unassigned")]
    pub mcu_id: i32,
}

fn unassigned() -> i32 {
    MCU_UNASSIGNED
}

#[derive(Debug, Clone)]
struct SlaveMapping {
    geometry: SlaveGeometry,
    order: IdOrder,
    /// Keyed (y, x) so iteration is row-major
    entries: BTreeMap<(u32, u32), MappingEntry>,
}

impl SlaveMapping {
    fn contains(&self, x: u32, y: u32) -> bool {
        x < self.geometry.width && y < self.geometry.height
    }

    fn default_entry(&self, x: u32, y: u32) -> MappingEntry {
        let id = self.order.default_id(x, y, &self.geometry);
        MappingEntry {
            pxld_id: id,
            mcu_id: id,
        }
    }

    /// Cell already holding `mcu_id`, other than (x,y)
    fn mcu_owner(&self, mcu_id: i32, x: u32, y: u32) -> Option<(u32, u32)> {
        self.entries
            .iter()
            .find(|&(&(ey, ex), e)| e.mcu_id == mcu_id && (ex, ey) != (x, y))
            .map(|(&(ey, ex), _)| (ex, ey))
    }
}

/// All slaves' mappings for one board
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    slaves: HashMap<i32, SlaveMapping>,
    default_order: IdOrder,
}

impl MappingTable {
    pub fn new(default_order: IdOrder) -> Self {
        Self {
            slaves: HashMap::new(),
            default_order,
        }
    }

    /// Register a slave (or replace its geometry); existing entries are kept
    pub fn set_geometry(&mut self, geometry: SlaveGeometry) {
        let order = self.default_order;
        self.slaves
            .entry(geometry.slave_id)
            .and_modify(|m| m.geometry = geometry)
            .or_insert_with(|| SlaveMapping {
                geometry,
                order,
                entries: BTreeMap::new(),
            });
    }

    pub fn geometry(&self, slave_id: i32) -> Option<SlaveGeometry> {
        self.slaves.get(&slave_id).map(|m| m.geometry)
    }

    pub fn order(&self, slave_id: i32) -> Option<IdOrder> {
        self.slaves.get(&slave_id).map(|m| m.order)
    }

    pub fn set_order(&mut self, slave_id: i32, order: IdOrder) -> PlayerResult<()> {
        let m = self
            .slaves
            .get_mut(&slave_id)
            .ok_or(PlayerError::UnknownSlave(slave_id))?;
        m.order = order;
        Ok(())
    }

    /// Explicit entry or the synthesized `{default, default}` pair.
    ///
    /// None for unknown slaves and coordinates outside the geometry.
    pub fn resolve(&self, slave_id: i32, x: u32, y: u32) -> Option<MappingEntry> {
        let m = self.slaves.get(&slave_id)?;
        if !m.contains(x, y) {
            return None;
        }
        Some(
            m.entries
                .get(&(y, x))
                .copied()
                .unwrap_or_else(|| m.default_entry(x, y)),
        )
    }

    pub fn is_explicit(&self, slave_id: i32, x: u32, y: u32) -> bool {
        self.slaves
            .get(&slave_id)
            .is_some_and(|m| m.entries.contains_key(&(y, x)))
    }

    /// Set one cell. A non-sentinel `mcu_id` already used by another cell of
    /// the same slave fails with `DuplicateMcuId` and leaves the table as-is.
    pub fn apply(
        &mut self,
        slave_id: i32,
        x: u32,
        y: u32,
        pxld_id: i32,
        mcu_id: i32,
    ) -> PlayerResult<()> {
        let m = self
            .slaves
            .get_mut(&slave_id)
            .ok_or(PlayerError::UnknownSlave(slave_id))?;
        if !m.contains(x, y) {
            return Err(PlayerError::OutOfBounds { slave_id, x, y });
        }
        if mcu_id != MCU_UNASSIGNED {
            if let Some(taken_by) = m.mcu_owner(mcu_id, x, y) {
                return Err(PlayerError::DuplicateMcuId {
                    slave_id,
                    mcu_id,
                    taken_by,
                });
            }
        }
        m.entries.insert((y, x), MappingEntry { pxld_id, mcu_id });
        debug!(
            "Mapping slave {} ({},{}) -> pxld {} mcu {}",
            slave_id, x, y, pxld_id, mcu_id
        );
        Ok(())
    }

    /// Replace a slave's explicit entries with a loaded document.
    ///
    /// Points outside the geometry are skipped. Duplicate mcu ids in stored
    /// data are kept as-is and only reported.
    pub fn load(&mut self, slave_id: i32, points: &[MapPoint]) -> PlayerResult<usize> {
        let m = self
            .slaves
            .get_mut(&slave_id)
            .ok_or(PlayerError::UnknownSlave(slave_id))?;
        m.entries.clear();
        let mut skipped = 0;
        for p in points {
            if !m.contains(p.x, p.y) {
                skipped += 1;
                continue;
            }
            if p.mcu_id != MCU_UNASSIGNED && m.mcu_owner(p.mcu_id, p.x, p.y).is_some() {
                warn!(
                    "Slave {}: stored mapping reuses mcu_id {} at ({},{})",
                    slave_id, p.mcu_id, p.x, p.y
                );
            }
            m.entries.insert(
                (p.y, p.x),
                MappingEntry {
                    pxld_id: p.pxld_id,
                    mcu_id: p.mcu_id,
                },
            );
        }
        if skipped > 0 {
            warn!(
                "Slave {}: {} mapping points outside {}x{} ignored",
                slave_id, skipped, m.geometry.width, m.geometry.height
            );
        }
        Ok(m.entries.len())
    }

    pub fn clear(&mut self, slave_id: i32) {
        if let Some(m) = self.slaves.get_mut(&slave_id) {
            m.entries.clear();
        }
    }

    pub fn explicit_len(&self, slave_id: i32) -> usize {
        self.slaves.get(&slave_id).map_or(0, |m| m.entries.len())
    }

    /// Points to persist: the explicit entries, or the full default grid
    /// (`w*h` points) when nothing was edited.
    pub fn to_persistable(&self, slave_id: i32) -> PlayerResult<Vec<MapPoint>> {
        let m = self
            .slaves
            .get(&slave_id)
            .ok_or(PlayerError::UnknownSlave(slave_id))?;
        if m.entries.is_empty() {
            let g = m.geometry;
            let mut out = Vec::with_capacity(g.cells() as usize);
            for y in 0..g.height {
                for x in 0..g.width {
                    let e = m.default_entry(x, y);
                    out.push(MapPoint {
                        x,
                        y,
                        pxld_id: e.pxld_id,
                        mcu_id: e.mcu_id,
                    });
                }
            }
            return Ok(out);
        }
        Ok(m.entries
            .iter()
            .map(|(&(y, x), e)| MapPoint {
                x,
                y,
                pxld_id: e.pxld_id,
                mcu_id: e.mcu_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use crate::core::layout::MAX_SLAVE_SIDE;

    fn table(order: IdOrder) -> MappingTable {
        let mut t = MappingTable::new(order);
        t.set_geometry(SlaveGeometry::new(1, 4, 3));
        t
    }

    #[test]
    fn test_resolve_defaults_row_major() {
        let t = table(IdOrder::RowMajor);
        for y in 0..3 {
            for x in 0..4 {
                let e = t.resolve(1, x, y).unwrap();
                assert_eq!(e.pxld_id, (y * 4 + x) as i32);
                assert_eq!(e.mcu_id, e.pxld_id);
            }
        }
        assert!(t.resolve(1, 4, 0).is_none());
        assert!(t.resolve(9, 0, 0).is_none());
    }

    #[test]
    fn test_resolve_defaults_column_major() {
        let mut t = table(IdOrder::RowMajor);
        t.set_order(1, IdOrder::ColumnMajor).unwrap();
        assert_eq!(t.resolve(1, 2, 1).unwrap().pxld_id, 2 * 3 + 1);
        assert_eq!(t.to_persistable(1).unwrap()[1].pxld_id, 3);
    }

    #[test]
    fn test_resolve_huge_geometry_from_server_doc() {
        let mut t = MappingTable::new(IdOrder::RowMajor);
        t.set_geometry(SlaveGeometry::new(1, 100_000, 100_000));
        let side = MAX_SLAVE_SIDE;
        let e = t.resolve(1, side - 1, side - 1).unwrap();
        assert_eq!(e.pxld_id, (side * side - 1) as i32);
        assert!(t.resolve(1, side, 0).is_none());

        t.set_order(1, IdOrder::ColumnMajor).unwrap();
        assert_eq!(t.resolve(1, side - 1, 0).unwrap().pxld_id, ((side - 1) * side) as i32);
    }

    #[test]
    fn test_apply_duplicate_rejected_without_mutation() {
        let mut t = table(IdOrder::RowMajor);
        t.apply(1, 0, 0, 5, 7).unwrap();
        let err = t.apply(1, 1, 0, 6, 7).unwrap_err();
        assert_eq!(
            err,
            PlayerError::DuplicateMcuId {
                slave_id: 1,
                mcu_id: 7,
                taken_by: (0, 0)
            }
        );
        assert!(!t.is_explicit(1, 1, 0));
        assert_eq!(t.resolve(1, 1, 0).unwrap().pxld_id, 1);
        assert_eq!(t.explicit_len(1), 1);

        // Re-applying the same mcu_id to its own cell is fine
        t.apply(1, 0, 0, 9, 7).unwrap();
        assert_eq!(t.resolve(1, 0, 0).unwrap().pxld_id, 9);
    }

    #[test]
    fn test_apply_sentinel_always_succeeds() {
        let mut t = table(IdOrder::RowMajor);
        for x in 0..4 {
            t.apply(1, x, 0, x as i32, MCU_UNASSIGNED).unwrap();
        }
        assert_eq!(t.explicit_len(1), 4);
    }

    #[test]
    fn test_apply_bounds_and_unknown_slave() {
        let mut t = table(IdOrder::RowMajor);
        assert_eq!(
            t.apply(1, 0, 3, 0, 0),
            Err(PlayerError::OutOfBounds {
                slave_id: 1,
                x: 0,
                y: 3
            })
        );
        assert_eq!(t.apply(2, 0, 0, 0, 0), Err(PlayerError::UnknownSlave(2)));
    }

    #[test]
    fn test_to_persistable_empty_is_full_grid() {
        let t = table(IdOrder::RowMajor);
        let points = t.to_persistable(1).unwrap();
        assert_eq!(points.len(), 12);
        let coords: HashSet<(u32, u32)> = points.iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(coords.len(), 12);
        for p in &points {
            assert_eq!(p.pxld_id, (p.y * 4 + p.x) as i32);
        }
    }

    #[test]
    fn test_to_persistable_explicit_only() {
        let mut t = table(IdOrder::RowMajor);
        t.apply(1, 2, 2, 40, 3).unwrap();
        let points = t.to_persistable(1).unwrap();
        assert_eq!(
            points,
            vec![MapPoint {
                x: 2,
                y: 2,
                pxld_id: 40,
                mcu_id: 3
            }]
        );
    }

    #[test]
    fn test_load_skips_out_of_bounds() {
        let mut t = table(IdOrder::RowMajor);
        t.apply(1, 0, 0, 1, 1).unwrap();
        let n = t
            .load(
                1,
                &[
                    MapPoint { x: 1, y: 1, pxld_id: 3, mcu_id: -1 },
                    MapPoint { x: 10, y: 1, pxld_id: 4, mcu_id: 2 },
                ],
            )
            .unwrap();
        assert_eq!(n, 1);
        assert!(!t.is_explicit(1, 0, 0));
        assert_eq!(t.resolve(1, 1, 1).unwrap().pxld_id, 3);
    }

    #[test]
    fn test_geometry_change_keeps_entries() {
        let mut t = table(IdOrder::RowMajor);
        t.apply(1, 1, 1, 50, 50).unwrap();
        t.set_geometry(SlaveGeometry::new(1, 2, 2));
        assert_eq!(t.resolve(1, 1, 1).unwrap().pxld_id, 50);
        assert_eq!(t.resolve(1, 1, 0).unwrap().pxld_id, 1);
    }
}
