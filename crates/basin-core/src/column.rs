//! Sediment column: the ordered stack of cells at one grid location.
//! Index 0 is the oldest cell; the last cell is the top.

use serde::{Deserialize, Serialize};

use crate::cell::SedimentCell;
use crate::error::CellError;
use crate::sediment::SedimentTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SedimentColumn {
    cells: Vec<SedimentCell>,
    n_types: usize,
    /// Elevation of the column base (m, relative to datum).
    pub base_height: f64,
    /// Position in metres.
    pub x: f64,
    pub y: f64,
    /// Vertical bin size used by `rebin` (m).
    pub z_res: f64,
}

impl SedimentColumn {
    pub fn new(n_types: usize, base_height: f64, z_res: f64) -> Result<Self, CellError> {
        if n_types == 0 {
            return Err(CellError::NoGrainTypes);
        }
        Ok(Self { cells: Vec::new(), n_types, base_height, x: 0.0, y: 0.0, z_res })
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn n_types(&self) -> usize {
        self.n_types
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[SedimentCell] {
        &self.cells
    }

    pub fn cell(&self, i: usize) -> Option<&SedimentCell> {
        self.cells.get(i)
    }

    pub fn top_cell(&self) -> Option<&SedimentCell> {
        self.cells.last()
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [SedimentCell] {
        &mut self.cells
    }

    /// Σ cell thickness.
    pub fn thickness(&self) -> f64 {
        self.cells.iter().map(SedimentCell::thickness).sum()
    }

    /// Elevation of the sediment surface.
    pub fn top_height(&self) -> f64 {
        self.base_height + self.thickness()
    }

    /// `sea_level − top_height`; negative on land.
    pub fn water_depth(&self, sea_level: f64) -> f64 {
        sea_level - self.top_height()
    }

    /// Sediment mass per unit area (kg/m^2).
    pub fn sediment_mass(&self, table: &SedimentTable) -> f64 {
        self.cells.iter().map(|c| c.mass(table)).sum()
    }

    /// Push a cell on top.  Empty cells are dropped.
    pub fn add_cell(&mut self, cell: SedimentCell) -> Result<(), CellError> {
        if cell.n_types() != self.n_types {
            return Err(CellError::GrainTypeMismatch(self.n_types, cell.n_types()));
        }
        if !cell.is_empty() {
            self.cells.push(cell);
        }
        Ok(())
    }

    /// Remove `depth` of sediment from the top, splitting the boundary cell.
    ///
    /// Returned cells are ordered top-down.  When the column holds less than
    /// `depth`, everything is returned.
    pub fn extract_top(&mut self, depth: f64) -> Vec<SedimentCell> {
        let mut out = Vec::new();
        let mut left = depth.max(0.0);
        while left > 0.0 {
            let Some(top) = self.cells.last_mut() else { break };
            if top.thickness() <= left {
                left -= top.thickness();
                if let Some(cell) = self.cells.pop() {
                    out.push(cell);
                }
            } else {
                out.push(top.split(left));
                left = 0.0;
            }
        }
        out
    }

    /// Remove everything above `elevation`.
    pub fn extract_cells_above(&mut self, elevation: f64) -> Vec<SedimentCell> {
        let excess = self.top_height() - elevation;
        if excess <= 0.0 {
            return Vec::new();
        }
        self.extract_top(excess)
    }

    /// Erode `depth` from the top and return it as a single averaged cell.
    pub fn extract_top_merged(&mut self, depth: f64) -> Result<SedimentCell, CellError> {
        let mut merged = SedimentCell::new(self.n_types)?;
        for cell in self.extract_top(depth) {
            merged.add(&cell)?;
        }
        Ok(merged)
    }

    /// Shrink cell `i` to `new_thickness`.  Refuses any increase.
    pub fn compact_cell(&mut self, i: usize, new_thickness: f64) -> Result<(), CellError> {
        let len = self.cells.len();
        let cell = self.cells.get_mut(i).ok_or(CellError::OutOfRange { index: i, len })?;
        let current = cell.thickness();
        if cell.compact(new_thickness) {
            Ok(())
        } else {
            Err(CellError::CompactionIncrease { current, requested: new_thickness })
        }
    }

    /// Re-discretise the stack into bins of `dz` (the top bin may be thinner).
    /// Fractions within a bin are thickness-weighted; total thickness and
    /// per-type sediment are unchanged.
    pub fn rebin(&mut self, dz: f64) -> Result<(), CellError> {
        if dz <= 0.0 || self.cells.is_empty() {
            return Ok(());
        }
        let mut source: Vec<SedimentCell> = std::mem::take(&mut self.cells);
        source.reverse(); // pop from the bottom
        let mut bins: Vec<SedimentCell> = Vec::new();
        let mut bin = SedimentCell::new(self.n_types)?;
        while let Some(mut cell) = source.pop() {
            let room = dz - bin.thickness();
            if cell.thickness() <= room + dz * 1e-12 {
                bin.add(&cell)?;
            } else {
                let lower = cell.split(room);
                bin.add(&lower)?;
                source.push(cell);
            }
            if bin.thickness() >= dz * (1.0 - 1e-12) {
                bins.push(std::mem::replace(&mut bin, SedimentCell::new(self.n_types)?));
            }
        }
        if !bin.is_empty() {
            bins.push(bin);
        }
        self.cells = bins;
        Ok(())
    }
}
