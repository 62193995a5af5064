//! Sediment cell: a homogeneous slab of mixed grain-size sediment.
//!
//! `thickness` is the current (possibly compacted) thickness.
//! `original_thickness` is the uncompacted equivalent, changed only when
//! sediment is added or removed, never by `resize` or `compact`.  Compaction
//! always works from `original_thickness`, so repeated passes never compact
//! the same sediment twice.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::CellError;
use crate::sediment::SedimentTable;

/// Loose tolerance used when checking fraction sums of stored cells.
pub const FRACTION_TOLERANCE: f64 = 1e-6;

bitflags! {
    /// Depositional process(es) that produced a cell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Facies: u16 {
        const BEDLOAD     = 1 << 0;
        const PLUME       = 1 << 1;
        const DEBRIS_FLOW = 1 << 2;
        const TURBIDITE   = 1 << 3;
        const DIFFUSED    = 1 << 4;
        const RIVER       = 1 << 5;
        const WAVE        = 1 << 6;
        const ALONG_SHORE = 1 << 7;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SedimentCell {
    fractions: Vec<f64>,
    thickness: f64,
    original_thickness: f64,
    /// Deposition age (time units of the caller).
    pub age: f64,
    pub facies: Facies,
    /// Overburden pressure (Pa) from the last compaction pass.
    pub pressure: f64,
}

impl SedimentCell {
    /// Empty cell: zero thickness, zero fractions.
    pub fn new(n_types: usize) -> Result<Self, CellError> {
        if n_types == 0 {
            return Err(CellError::NoGrainTypes);
        }
        Ok(Self {
            fractions: vec![0.0; n_types],
            thickness: 0.0,
            original_thickness: 0.0,
            age: 0.0,
            facies: Facies::empty(),
            pressure: 0.0,
        })
    }

    /// Cell of the given thickness holding a copy of `fractions`.
    ///
    /// Fractions are stored as given; call `normalize_fractions` when the
    /// input comes from a source that does not sum to one.
    pub fn new_sized(n_types: usize, thickness: f64, fractions: &[f64]) -> Result<Self, CellError> {
        let mut cell = Self::new(n_types)?;
        if fractions.len() != n_types {
            return Err(CellError::FractionCount { expected: n_types, found: fractions.len() });
        }
        if thickness < 0.0 {
            return Err(CellError::NegativeThickness(thickness));
        }
        cell.fractions.copy_from_slice(fractions);
        cell.thickness = thickness;
        cell.original_thickness = thickness;
        Ok(cell)
    }

    pub fn n_types(&self) -> usize {
        self.fractions.len()
    }

    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn original_thickness(&self) -> f64 {
        self.original_thickness
    }

    pub fn is_empty(&self) -> bool {
        self.thickness <= 0.0
    }

    /// Rescale fractions to sum to one.  No-op for an all-zero vector.
    pub fn normalize_fractions(&mut self) {
        let sum: f64 = self.fractions.iter().sum();
        if sum > 0.0 {
            for f in &mut self.fractions {
                *f /= sum;
            }
        }
    }

    /// Set thickness to `max(t, 0)`.  Fractions and original thickness stay.
    pub fn resize(&mut self, new_thickness: f64) {
        self.thickness = new_thickness.max(0.0);
    }

    /// Reduce thickness to `new_thickness` as the result of loading.
    ///
    /// Returns `false` and leaves the cell untouched when the request would
    /// thicken it (the overburden was eroded since the last pass).
    pub fn compact(&mut self, new_thickness: f64) -> bool {
        if new_thickness.is_nan() || new_thickness < 0.0 || new_thickness > self.thickness {
            return false;
        }
        self.thickness = new_thickness;
        true
    }

    /// Zero thickness and fractions; age, facies and pressure reset.
    pub fn clear(&mut self) {
        self.fractions.iter_mut().for_each(|f| *f = 0.0);
        self.thickness = 0.0;
        self.original_thickness = 0.0;
        self.age = 0.0;
        self.facies = Facies::empty();
        self.pressure = 0.0;
    }

    /// Thickness ≥ 0, fractions ≥ 0, and a non-empty cell's fractions sum
    /// to one within `tol`.
    pub fn is_valid_within(&self, tol: f64) -> bool {
        let negative = |v: f64| v.is_nan() || v < 0.0;
        if negative(self.thickness) || self.fractions.iter().any(|&f| negative(f)) {
            return false;
        }
        if self.thickness == 0.0 {
            return true;
        }
        let sum: f64 = self.fractions.iter().sum();
        (sum - 1.0).abs() <= tol
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_within(FRACTION_TOLERANCE)
    }

    /// Split off `t` of thickness with the parent's fraction vector.
    ///
    /// `t` is capped at the available thickness.  Original thickness is
    /// divided in the same proportion.
    pub fn split(&mut self, t: f64) -> SedimentCell {
        let t = t.clamp(0.0, self.thickness);
        let mut out = self.clone();
        if t >= self.thickness {
            self.thickness = 0.0;
            self.original_thickness = 0.0;
            return out;
        }
        let ratio = t / self.thickness;
        out.thickness = t;
        out.original_thickness = self.original_thickness * ratio;
        self.thickness -= t;
        self.original_thickness -= out.original_thickness;
        out
    }

    /// Remove up to `target_thickness` of sediment with composition
    /// `fractions`, writing it into `out` (which is overwritten).
    ///
    /// The amount of grain type `n` removed is `target·fractions[n]`, limited
    /// by what the cell holds.  Both cells stay valid and
    /// `before = self + out` holds exactly per grain type.
    pub fn separate(
        &mut self,
        fractions: &[f64],
        target_thickness: f64,
        out: &mut SedimentCell,
    ) -> Result<(), CellError> {
        let n = self.n_types();
        if fractions.len() != n {
            return Err(CellError::FractionCount { expected: n, found: fractions.len() });
        }
        if out.n_types() != n {
            return Err(CellError::GrainTypeMismatch(n, out.n_types()));
        }
        out.clear();
        out.age = self.age;
        out.facies = self.facies;
        out.pressure = self.pressure;
        let target = target_thickness.max(0.0);
        if self.thickness <= 0.0 || target == 0.0 {
            return Ok(());
        }

        let mut removed = vec![0.0; n];
        for i in 0..n {
            let available = self.thickness * self.fractions[i];
            removed[i] = (target * fractions[i].max(0.0)).min(available);
        }
        let t_out: f64 = removed.iter().sum();
        if t_out <= 0.0 {
            return Ok(());
        }
        let remaining: Vec<f64> = (0..n)
            .map(|i| (self.thickness * self.fractions[i] - removed[i]).max(0.0))
            .collect();
        let t_left: f64 = remaining.iter().sum();

        let ratio = t_out / self.thickness;
        out.original_thickness = self.original_thickness * ratio;
        out.thickness = t_out;
        out.fractions = removed.iter().map(|r| r / t_out).collect();

        self.original_thickness -= out.original_thickness;
        if t_left > 0.0 {
            self.fractions = remaining.iter().map(|r| r / t_left).collect();
            self.thickness = t_left;
        } else {
            self.fractions.iter_mut().for_each(|f| *f = 0.0);
            self.thickness = 0.0;
            self.original_thickness = 0.0;
        }
        Ok(())
    }

    /// Merge `other` into `self`.
    ///
    /// Thickness and original thickness add; fractions and age become the
    /// thickness-weighted means (1 m at age 1 plus 2 m at age 4 gives 3 m at
    /// age 3).  Pressure takes the weighted mean; facies flags are OR-ed.
    pub fn add(&mut self, other: &SedimentCell) -> Result<(), CellError> {
        if other.n_types() != self.n_types() {
            return Err(CellError::GrainTypeMismatch(self.n_types(), other.n_types()));
        }
        if other.thickness <= 0.0 {
            return Ok(());
        }
        let t_total = self.thickness + other.thickness;
        let (wa, wb) = (self.thickness / t_total, other.thickness / t_total);
        for (f, g) in self.fractions.iter_mut().zip(&other.fractions) {
            *f = *f * wa + g * wb;
        }
        self.age = self.age * wa + other.age * wb;
        self.pressure = self.pressure * wa + other.pressure * wb;
        self.facies |= other.facies;
        self.thickness = t_total;
        self.original_thickness += other.original_thickness;
        Ok(())
    }

    /// Bulk mass per unit area (kg/m^2) at deposition density.
    pub fn mass(&self, table: &SedimentTable) -> f64 {
        self.original_thickness * table.solid_density(&self.fractions)
    }

    /// Mean grain size (microns).
    pub fn grain_size(&self, table: &SedimentTable) -> f64 {
        table.grain_size(&self.fractions)
    }

    /// Current bulk density, accounting for compaction.
    pub fn density(&self, table: &SedimentTable) -> f64 {
        if self.thickness <= 0.0 {
            return 0.0;
        }
        let solids = self.original_thickness * table.solid_density(&self.fractions);
        let porosity = self.porosity(table);
        solids / self.thickness + porosity * crate::sediment::RHO_SEA_WATER
    }

    /// Current porosity implied by the compaction ratio.
    pub fn porosity(&self, table: &SedimentTable) -> f64 {
        if self.thickness <= 0.0 {
            return 0.0;
        }
        let p0 = table.porosity_max(&self.fractions);
        (1.0 - (1.0 - p0) * self.original_thickness / self.thickness).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn cell(t: f64, f: &[f64]) -> SedimentCell {
        SedimentCell::new_sized(f.len(), t, f).unwrap()
    }

    #[test]
    fn zero_types_is_an_error() {
        assert_eq!(SedimentCell::new(0).unwrap_err(), CellError::NoGrainTypes);
    }

    #[test]
    fn new_cell_is_empty_and_valid() {
        let c = SedimentCell::new(3).unwrap();
        assert!(c.is_empty());
        assert!(c.is_valid());
        assert_eq!(c.fractions(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn new_sized_does_not_renormalize() {
        let c = cell(1.0, &[0.2, 0.2]);
        assert_eq!(c.fractions(), &[0.2, 0.2]);
        assert!(!c.is_valid());
        let mut c = c;
        c.normalize_fractions();
        assert!(c.is_valid());
    }

    #[test]
    fn resize_clamps_at_zero_and_keeps_original() {
        let mut c = cell(2.0, &[1.0]);
        c.resize(-3.0);
        assert_eq!(c.thickness(), 0.0);
        assert_eq!(c.original_thickness(), 2.0);
    }

    #[test]
    fn compaction_never_thickens() {
        let mut c = cell(2.0, &[1.0]);
        assert!(c.compact(1.5));
        assert_eq!(c.thickness(), 1.5);
        assert!(!c.compact(1.8), "growth must be refused");
        assert_eq!(c.thickness(), 1.5);
        assert_eq!(c.original_thickness(), 2.0);
    }

    #[test]
    fn add_uses_thickness_weighted_age() {
        let mut a = cell(1.0, &[1.0, 0.0]);
        a.age = 1.0;
        let mut b = cell(2.0, &[0.0, 1.0]);
        b.age = 4.0;
        a.add(&b).unwrap();
        assert_abs_diff_eq!(a.thickness(), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.age, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.fractions()[0], 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a.fractions()[1], 2.0 / 3.0, epsilon = 1e-12);
        assert!(a.is_valid());
    }

    #[test]
    fn add_into_empty_cell_copies_other() {
        let mut a = SedimentCell::new(2).unwrap();
        let mut b = cell(0.5, &[0.25, 0.75]);
        b.age = 9.0;
        b.facies = Facies::PLUME;
        a.add(&b).unwrap();
        assert_eq!(a.fractions(), b.fractions());
        assert_eq!(a.age, 9.0);
        assert_eq!(a.facies, Facies::PLUME);
    }

    #[test]
    fn separate_then_add_restores_thickness() {
        let parent = cell(3.0, &[0.5, 0.3, 0.2]);
        for (target, f) in [
            (1.0, [0.5, 0.3, 0.2]),
            (2.0, [1.0, 0.0, 0.0]),
            (10.0, [0.1, 0.1, 0.8]),
        ] {
            let mut a = parent.clone();
            let mut out = SedimentCell::new(3).unwrap();
            a.separate(&f, target, &mut out).unwrap();
            assert!(a.is_valid_within(1e-12), "remainder invalid: {a:?}");
            assert!(out.is_valid_within(1e-12), "split-off invalid: {out:?}");
            assert_relative_eq!(a.thickness() + out.thickness(), 3.0, max_relative = 1e-12);
            a.add(&out).unwrap();
            assert_relative_eq!(a.thickness(), 3.0, max_relative = 1e-12);
            for i in 0..3 {
                assert_abs_diff_eq!(a.fractions()[i], parent.fractions()[i], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn separate_matching_fractions_keeps_composition() {
        let mut a = cell(2.0, &[0.6, 0.4]);
        let mut out = SedimentCell::new(2).unwrap();
        a.separate(&[0.6, 0.4], 0.5, &mut out).unwrap();
        assert_abs_diff_eq!(out.thickness(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(out.fractions()[0], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(a.fractions()[0], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(a.thickness(), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn split_preserves_fractions_and_total() {
        let mut a = cell(4.0, &[0.1, 0.9]);
        let b = a.split(1.5);
        assert_abs_diff_eq!(a.thickness() + b.thickness(), 4.0, epsilon = 1e-12);
        assert_eq!(a.fractions(), b.fractions());
        assert_abs_diff_eq!(a.original_thickness() + b.original_thickness(), 4.0, epsilon = 1e-12);
        let c = a.split(100.0);
        assert_abs_diff_eq!(c.thickness(), 2.5, epsilon = 1e-12);
        assert!(a.is_empty());
    }

    #[test]
    fn mismatched_types_rejected() {
        let mut a = cell(1.0, &[1.0]);
        let b = cell(1.0, &[0.5, 0.5]);
        assert_eq!(a.add(&b).unwrap_err(), CellError::GrainTypeMismatch(1, 2));
    }

    #[test]
    fn porosity_drops_after_compaction() {
        let table = SedimentTable::default();
        let mut c = cell(1.0, &[1.0, 0.0, 0.0]);
        let p0 = c.porosity(&table);
        assert_abs_diff_eq!(p0, table.types[0].porosity_max(), epsilon = 1e-12);
        let m0 = c.mass(&table);
        c.compact(0.8);
        assert!(c.porosity(&table) < p0);
        assert_abs_diff_eq!(c.mass(&table), m0, epsilon = 1e-9);
    }
}
