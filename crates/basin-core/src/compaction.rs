//! Load-driven compaction.
//!
//! Porosity follows `φ(σ) = φ_min + (φ_0 − φ_min)·exp(−c·σ)` per grain type,
//! where σ is the buoyant weight of the sediment above a cell.  A cell's new
//! thickness is `t_0·(1 − φ_0)/(1 − φ(σ))`, computed from the uncompacted
//! thickness `t_0`, so the solid volume is preserved and a pass can be
//! repeated without compacting twice.  Thickness never increases.
//!
//! Columns are independent; with the `threading` feature the cube-wide pass
//! runs one column per rayon task.

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::column::SedimentColumn;
use crate::cube::SedimentCube;
use crate::sediment::{SedimentTable, GRAVITY, RHO_SEA_WATER};

/// Compact one column top-down.  Returns the thickness lost (m).
pub fn compact_column(col: &mut SedimentColumn, table: &SedimentTable) -> f64 {
    let mut sigma = 0.0;
    let mut lost = 0.0;
    for cell in col.cells_mut().iter_mut().rev() {
        let t0 = cell.original_thickness();
        let f = cell.fractions().to_vec();
        cell.pressure = sigma;

        let p0 = table.porosity_max(&f);
        let p = table.porosity_at(&f, sigma);
        if p < 1.0 && t0 > 0.0 {
            let target = t0 * (1.0 - p0) / (1.0 - p);
            let before = cell.thickness();
            if cell.compact(target) {
                lost += before - target;
            }
        }
        let buoyant = (table.bulk_density(&f) - RHO_SEA_WATER).max(0.0);
        sigma += buoyant * GRAVITY * t0;
    }
    lost
}

/// Compact every column of the cube.  Returns the total thickness lost (m).
pub fn compact_cube(cube: &mut SedimentCube, table: &SedimentTable) -> f64 {
    #[cfg(feature = "threading")]
    let lost: f64 = cube
        .columns_mut()
        .par_iter_mut()
        .map(|col| compact_column(col, table))
        .sum();

    #[cfg(not(feature = "threading"))]
    let lost: f64 = cube
        .columns_mut()
        .iter_mut()
        .map(|col| compact_column(col, table))
        .sum();

    tracing::debug!(lost, "compaction pass");
    lost
}
