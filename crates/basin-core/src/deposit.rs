//! Deposition at river mouths.
//!
//! Each leaf river with a located mouth builds one cell per tick.  A cell
//! thicker than the water at the mouth is clipped to the water depth and the
//! excess spills on along the river's ray into the next columns that still
//! hold water.  Whatever is left when the ray leaves the grid is kept on the
//! river as carry-over and joins the next tick's load, so nothing is
//! deposited above sea level and nothing is lost.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cell::{Facies, SedimentCell};
use crate::cube::SedimentCube;
use crate::error::CellError;
use crate::hydro::HydroRecord;
use crate::river::RiverId;
use crate::sediment::SedimentTable;

/// How much sediment each river delivers per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DepositionPolicy {
    /// Every river deposits `thickness` (m) per tick.
    Fixed { thickness: f64 },
    /// `thickness` (m) per tick shared between rivers with random weights
    /// drawn from each river's own generator.
    RandomSplit { thickness: f64 },
    /// Load from the river's sediment flux over the time step.
    #[default]
    Hydrology,
}

/// Totals for one deposition pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepositReport {
    /// Rivers that added sediment to a column.
    pub rivers: usize,
    /// Σ deposited thickness (m).
    pub deposited: f64,
    /// Σ deposited mass (kg).
    pub deposited_mass: f64,
    /// Σ thickness held back as carry-over (m).
    pub carried: f64,
    /// Σ fresh load mass delivered by the rivers this tick (kg).
    pub load_mass: f64,
    /// Σ carry-over mass the rivers started the tick with (kg).
    pub carry_in_mass: f64,
    /// Σ carry-over mass the rivers end the tick with (kg).
    pub carry_out_mass: f64,
    /// Rivers with no mouth on the grid this tick.
    pub skipped: usize,
}

/// Grain fractions of a river's load, padded or truncated to `n` types.
/// Uniform when the river carries no sediment.
fn load_fractions(hydro: &HydroRecord, n: usize) -> Vec<f64> {
    let mut f = hydro.sediment_flux();
    f.resize(n, 0.0);
    let total: f64 = f.iter().map(|v| v.max(0.0)).sum();
    if total > 0.0 {
        f.iter().map(|v| v.max(0.0) / total).collect()
    } else {
        vec![1.0 / n as f64; n]
    }
}

/// Fresh load for one river, before carry-over and clipping.
fn river_load(
    hydro: &HydroRecord,
    n: usize,
    thickness: Option<f64>,
    table: &SedimentTable,
    area: f64,
    dt: f64,
) -> Result<SedimentCell, CellError> {
    if let Some(t) = thickness {
        return SedimentCell::new_sized(n, t.max(0.0), &load_fractions(hydro, n));
    }
    let mut mass = hydro.sediment_flux();
    mass.resize(n, 0.0);
    let total: f64 = mass.iter().map(|m| m.max(0.0) * dt).sum();
    if total <= 0.0 || area <= 0.0 {
        return SedimentCell::new(n);
    }
    let fractions: Vec<f64> = mass.iter().map(|m| m.max(0.0) * dt / total).collect();
    let rho = table.solid_density(&fractions);
    if rho <= 0.0 {
        return SedimentCell::new(n);
    }
    SedimentCell::new_sized(n, total / (area * rho), &fractions)
}

impl DepositReport {
    /// `load + carry-in − deposited − carry-out` (kg).  Zero up to rounding.
    pub fn mass_imbalance(&self) -> f64 {
        self.load_mass + self.carry_in_mass - self.deposited_mass - self.carry_out_mass
    }
}

/// Deposit every leaf river's load at its cached mouth, spilling the excess
/// along the river's ray.
///
/// Mouths must have been located this tick (`find_all_river_mouths`); a river
/// without one is skipped and keeps any carry-over it already holds.
pub fn deposit_at_mouths(
    cube: &mut SedimentCube,
    table: &SedimentTable,
    policy: &DepositionPolicy,
    dt: f64,
) -> Result<DepositReport, CellError> {
    let n = cube.n_types();
    let area = cube.x_res * cube.y_res;
    let time = cube.time;
    let mut report = DepositReport::default();

    let mut targets: Vec<(RiverId, (usize, usize))> = Vec::new();
    for id in cube.leaf_ids() {
        match cube.river(id).and_then(|r| r.mouth()) {
            Some(mouth) => targets.push((id, mouth)),
            None => {
                report.skipped += 1;
                tracing::debug!(river = %id, "no mouth; deposition skipped");
            }
        }
    }

    let shares: Vec<Option<f64>> = match *policy {
        DepositionPolicy::Fixed { thickness } => vec![Some(thickness); targets.len()],
        DepositionPolicy::RandomSplit { thickness } => {
            let weights: Vec<f64> = targets
                .iter()
                .map(|&(id, _)| {
                    cube.river_mut(id)
                        .map_or(0.0, |r| r.avulsion_mut().rng_mut().gen::<f64>())
                })
                .collect();
            let sum: f64 = weights.iter().sum();
            weights
                .iter()
                .map(|w| Some(if sum > 0.0 { thickness * w / sum } else { 0.0 }))
                .collect()
        }
        DepositionPolicy::Hydrology => vec![None; targets.len()],
    };

    for (&(id, mouth), share) in targets.iter().zip(shares) {
        let Some(river) = cube.river_mut(id) else { continue };
        let hydro = river.hydro.clone();
        let (hinge, angle) = (river.hinge, river.angle());
        let carry = river.carryover.take();

        let mut load = river_load(&hydro, n, share, table, area, dt)?;
        report.load_mass += load.mass(table) * area;
        if let Some(c) = carry {
            report.carry_in_mass += c.mass(table) * area;
            load.add(&c)?;
        }
        if load.is_empty() {
            continue;
        }
        load.age = time;
        load.facies |= Facies::RIVER | Facies::PLUME;
        if hydro.bedload > 0.0 {
            load.facies |= Facies::BEDLOAD;
        }

        let mut delivered = false;
        for (i, j) in cube.ray_path(hinge, angle).into_iter().skip_while(|&p| p != mouth) {
            if load.is_empty() {
                break;
            }
            let depth = cube.water_depth(i, j).unwrap_or(0.0);
            if depth <= 0.0 {
                continue;
            }
            let piece = load.split(depth);
            report.deposited += piece.thickness();
            report.deposited_mass += piece.mass(table) * area;
            cube.add_cell(i, j, piece)?;
            delivered = true;
        }
        if delivered {
            report.rivers += 1;
        }

        if !load.is_empty() {
            report.carried += load.thickness();
            report.carry_out_mass += load.mass(table) * area;
            tracing::debug!(river = %id, carried = load.thickness(), "ray left the grid with load to spare");
            if let Some(river) = cube.river_mut(id) {
                river.carryover = Some(load);
            }
        }
    }
    Ok(report)
}
