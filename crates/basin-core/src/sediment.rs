//! Sediment-type table: grain properties that turn cell fractions into bulk
//! density, porosity, and compaction behaviour.

use serde::{Deserialize, Serialize};

use crate::config::{Group, KeyFile};
use crate::error::ConfigError;

/// Density of sea water (kg/m^3).
pub const RHO_SEA_WATER: f64 = 1028.0;
/// Gravitational acceleration (m/s^2).
pub const GRAVITY: f64 = 9.81;

/// One grain type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SedimentType {
    /// Grain size (microns).
    pub grain_size: f64,
    /// Grain density (kg/m^3).
    pub rho_grain: f64,
    /// Saturated bulk density at deposition (kg/m^3).
    pub rho_sat: f64,
    /// Void ratio at maximum compaction.
    pub void_min: f64,
    /// Exponential compaction coefficient (1/Pa).
    pub compaction: f64,
}

impl SedimentType {
    /// Porosity at deposition, from the saturated density.
    pub fn porosity_max(&self) -> f64 {
        ((self.rho_grain - self.rho_sat) / (self.rho_grain - RHO_SEA_WATER)).clamp(0.0, 0.99)
    }

    /// Porosity at maximum compaction.
    pub fn porosity_min(&self) -> f64 {
        (self.void_min / (1.0 + self.void_min)).clamp(0.0, self.porosity_max())
    }

    /// Porosity under effective stress `sigma` (Pa).
    pub fn porosity_at(&self, sigma: f64) -> f64 {
        let (p0, pm) = (self.porosity_max(), self.porosity_min());
        pm + (p0 - pm) * (-self.compaction * sigma.max(0.0)).exp()
    }

    fn from_group(g: &Group) -> Result<Self, ConfigError> {
        let t = Self {
            grain_size: g.get("grain size (microns)")?,
            rho_grain: g.get("grain density (kg/m^3)")?,
            rho_sat: g.get("saturated density (kg/m^3)")?,
            void_min: g.get("minimum void ratio")?,
            compaction: g.get_or("compaction coefficient (1/Pa)", 0.0)?,
        };
        if t.rho_grain <= RHO_SEA_WATER || t.rho_sat > t.rho_grain {
            return Err(ConfigError::BadValue {
                group: g.name.clone(),
                key: "saturated density (kg/m^3)".into(),
                value: t.rho_sat.to_string(),
                reason: "densities must satisfy water < saturated <= grain".into(),
            });
        }
        Ok(t)
    }
}

/// Ordered table of grain types; index 0 is the bedload (coarsest) type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SedimentTable {
    pub types: Vec<SedimentType>,
}

impl Default for SedimentTable {
    /// Sand, silt, clay.
    fn default() -> Self {
        Self {
            types: vec![
                SedimentType {
                    grain_size: 200.0,
                    rho_grain: 2650.0,
                    rho_sat: 1850.0,
                    void_min: 0.30,
                    compaction: 1.0e-8,
                },
                SedimentType {
                    grain_size: 30.0,
                    rho_grain: 2650.0,
                    rho_sat: 1600.0,
                    void_min: 0.20,
                    compaction: 3.0e-8,
                },
                SedimentType {
                    grain_size: 2.0,
                    rho_grain: 2650.0,
                    rho_sat: 1400.0,
                    void_min: 0.10,
                    compaction: 5.0e-8,
                },
            ],
        }
    }
}

impl SedimentTable {
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Every `[ sediment ]` group of a key-file, in order.
    pub fn from_key_file(kf: &KeyFile) -> Result<Self, ConfigError> {
        let types: Vec<SedimentType> = kf
            .groups_named("sediment")
            .map(SedimentType::from_group)
            .collect::<Result<_, _>>()?;
        if types.is_empty() {
            return Err(ConfigError::MissingGroup { group: "sediment".into() });
        }
        Ok(Self { types })
    }

    fn weighted(&self, fractions: &[f64], f: impl Fn(&SedimentType) -> f64) -> f64 {
        self.types.iter().zip(fractions).map(|(t, &w)| f(t) * w).sum()
    }

    /// Fraction-weighted saturated bulk density.
    pub fn bulk_density(&self, fractions: &[f64]) -> f64 {
        self.weighted(fractions, |t| t.rho_sat)
    }

    pub fn porosity_max(&self, fractions: &[f64]) -> f64 {
        self.weighted(fractions, SedimentType::porosity_max)
    }

    pub fn porosity_at(&self, fractions: &[f64], sigma: f64) -> f64 {
        self.weighted(fractions, |t| t.porosity_at(sigma))
    }

    /// Mean grain size in microns.
    pub fn grain_size(&self, fractions: &[f64]) -> f64 {
        self.weighted(fractions, |t| t.grain_size)
    }

    /// Density of solids per unit of uncompacted thickness (kg/m^3).
    pub fn solid_density(&self, fractions: &[f64]) -> f64 {
        self.weighted(fractions, |t| t.rho_grain * (1.0 - t.porosity_max()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn porosity_decreases_with_load() {
        let table = SedimentTable::default();
        for t in &table.types {
            let p0 = t.porosity_at(0.0);
            let p1 = t.porosity_at(1.0e6);
            let p2 = t.porosity_at(1.0e9);
            assert!((p0 - t.porosity_max()).abs() < 1e-12);
            assert!(p1 < p0 && p2 < p1, "porosity not decreasing: {p0} {p1} {p2}");
            assert!(p2 >= t.porosity_min() - 1e-12);
        }
    }

    #[test]
    fn loads_sediment_groups() {
        let kf = KeyFile::parse(
            "[ sediment ]\ngrain size (microns): 150\ngrain density (kg/m^3): 2650\n\
             saturated density (kg/m^3): 1900\nminimum void ratio: 0.3\n",
        )
        .unwrap();
        let table = SedimentTable::from_key_file(&kf).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.types[0].grain_size, 150.0);
        assert_eq!(table.types[0].compaction, 0.0);
    }

    #[test]
    fn rejects_saturated_denser_than_grain() {
        let kf = KeyFile::parse(
            "[ sediment ]\ngrain size (microns): 150\ngrain density (kg/m^3): 2000\n\
             saturated density (kg/m^3): 2100\nminimum void ratio: 0.3\n",
        )
        .unwrap();
        assert!(SedimentTable::from_key_file(&kf).is_err());
    }
}
