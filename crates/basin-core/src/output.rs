//! Text and JSON writers for simulation output.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::cube::SedimentCube;
use crate::river::RiverSnapshot;

/// One line of space-separated river angles in degrees, ordered by handle.
pub fn write_angle_line<W: Write>(w: &mut W, cube: &SedimentCube) -> io::Result<()> {
    let mut rivers: Vec<_> = cube.rivers().iter().collect();
    rivers.sort_by_key(|(id, _)| *id);
    let line: Vec<String> = rivers
        .iter()
        .map(|(_, r)| format!("{:.6}", r.angle().to_degrees()))
        .collect();
    writeln!(w, "{}", line.join(" "))
}

/// Single-scalar walk output: one angle (degrees) per line.
pub fn write_angle_series<W: Write>(w: &mut W, angles: &[f64]) -> io::Result<()> {
    for a in angles {
        writeln!(w, "{:.6}", a.to_degrees())?;
    }
    Ok(())
}

/// Water-depth grid: one row per along-shore index `i`, `ny` values each.
pub fn write_depth_grid<W: Write>(w: &mut W, cube: &SedimentCube) -> io::Result<()> {
    let depths = cube.water_depth_grid();
    for row in depths.chunks(cube.ny().max(1)) {
        let line: Vec<String> = row.iter().map(|d| format!("{d:.4}")).collect();
        writeln!(w, "{}", line.join(" "))?;
    }
    Ok(())
}

/// Serializable state of a cube: rivers plus per-column surface values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeSnapshot {
    pub nx: usize,
    pub ny: usize,
    pub x_res: f64,
    pub y_res: f64,
    pub sea_level: f64,
    pub time: f64,
    pub rivers: Vec<RiverSnapshot>,
    /// Row-major sediment thickness (m).
    pub thickness: Vec<f64>,
    /// Row-major water depth (m).
    pub water_depth: Vec<f64>,
}

impl CubeSnapshot {
    pub fn of(cube: &SedimentCube) -> Self {
        let mut rivers = cube.river_snapshots();
        rivers.sort_by_key(|r| r.id);
        Self {
            nx: cube.nx(),
            ny: cube.ny(),
            x_res: cube.x_res,
            y_res: cube.y_res,
            sea_level: cube.sea_level(),
            time: cube.time,
            rivers,
            thickness: cube.columns().iter().map(|c| c.thickness()).collect(),
            water_depth: cube.water_depth_grid(),
        }
    }
}

pub fn write_snapshot<W: Write>(w: W, cube: &SedimentCube) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(w, &CubeSnapshot::of(cube))
}
