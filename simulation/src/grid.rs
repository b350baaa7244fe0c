//! Spatial index for contact detection
//!
//! Hosts are bucketed into square cells. As long as the cell side is at
//! least the largest radio range, any host within range of another sits in
//! the same cell or one of the eight around it, so the candidate set equals
//! what an all-pairs scan would find in range.

use std::collections::BTreeMap;

use courier_core::{Coord, HostAddress};

#[derive(Debug, Clone)]
pub struct ConnectivityGrid {
    cell_size: f64,
    cells: BTreeMap<(i64, i64), Vec<HostAddress>>,
}

impl ConnectivityGrid {
    /// `cell_size` must be positive and no smaller than any interface range
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: BTreeMap::new(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    fn cell_of(&self, location: Coord) -> (i64, i64) {
        (
            (location.x / self.cell_size).floor() as i64,
            (location.y / self.cell_size).floor() as i64,
        )
    }

    /// Re-bucket every host from scratch
    pub fn rebuild(&mut self, hosts: impl IntoIterator<Item = (HostAddress, Coord)>) {
        self.cells.clear();
        for (address, location) in hosts {
            let cell = self.cell_of(location);
            self.cells.entry(cell).or_default().push(address);
        }
    }

    /// Hosts in the 3x3 block of cells around `location`, ascending
    pub fn candidates(&self, location: Coord) -> Vec<HostAddress> {
        let (cx, cy) = self.cell_of(location);
        let mut found: Vec<HostAddress> = (cx - 1..=cx + 1)
            .flat_map(|x| (cy - 1..=cy + 1).map(move |y| (x, y)))
            .filter_map(|cell| self.cells.get(&cell))
            .flatten()
            .copied()
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
