//! River hydrology record: the scalars used for merge/split weighting and
//! deposition volume.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydroRecord {
    /// Mean flow velocity (m/s).
    pub velocity: f64,
    /// Channel width (m).
    pub width: f64,
    /// Channel depth (m).
    pub depth: f64,
    /// Bedload flux (kg/s), delivered as the coarsest grain type.
    pub bedload: f64,
    /// Suspended concentration per grain type (kg/m^3).
    pub conc: Vec<f64>,
}

impl Default for HydroRecord {
    fn default() -> Self {
        Self {
            velocity: 1.0,
            width: 100.0,
            depth: 5.0,
            bedload: 0.0,
            conc: vec![0.1, 0.2, 0.2],
        }
    }
}

impl HydroRecord {
    /// Water discharge q = u·w·d (m^3/s).
    pub fn discharge(&self) -> f64 {
        self.velocity * self.width * self.depth
    }

    /// Width that carries discharge `q` at this record's velocity and depth.
    /// Zero when velocity or depth is zero.
    pub fn width_for_discharge(&self, q: f64) -> f64 {
        let ud = self.velocity * self.depth;
        if ud > 0.0 { q / ud } else { 0.0 }
    }

    /// Mass flux of each grain type (kg/s), bedload added to type 0.
    pub fn sediment_flux(&self) -> Vec<f64> {
        let q = self.discharge();
        let mut flux: Vec<f64> = self.conc.iter().map(|c| c * q).collect();
        if let Some(first) = flux.first_mut() {
            *first += self.bedload;
        }
        flux
    }

    /// Fold `other` into `self`: discharge adds, velocity and depth stay,
    /// width grows to carry the total.  Bedload adds; concentrations are
    /// discharge-weighted so the sediment flux is conserved.
    pub fn absorb(&mut self, other: &HydroRecord) {
        let q_self = self.discharge();
        let q_other = other.discharge();
        let q_total = q_self + q_other;
        let n = self.conc.len().max(other.conc.len());
        let mut conc = vec![0.0; n];
        if q_total > 0.0 {
            for (i, c) in conc.iter_mut().enumerate() {
                let a = self.conc.get(i).copied().unwrap_or(0.0);
                let b = other.conc.get(i).copied().unwrap_or(0.0);
                *c = (a * q_self + b * q_other) / q_total;
            }
        }
        self.conc = conc;
        self.bedload += other.bedload;
        self.width = self.width_for_discharge(q_total);
    }

    /// Element-wise mean of two records; width is left at zero for the
    /// caller to set.
    pub fn midpoint(a: &HydroRecord, b: &HydroRecord) -> HydroRecord {
        let n = a.conc.len().max(b.conc.len());
        let conc = (0..n)
            .map(|i| {
                let x = a.conc.get(i).copied().unwrap_or(0.0);
                let y = b.conc.get(i).copied().unwrap_or(0.0);
                0.5 * (x + y)
            })
            .collect();
        HydroRecord {
            velocity: 0.5 * (a.velocity + b.velocity),
            width: 0.0,
            depth: 0.5 * (a.depth + b.depth),
            bedload: 0.5 * (a.bedload + b.bedload),
            conc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rec(u: f64, w: f64, d: f64) -> HydroRecord {
        HydroRecord { velocity: u, width: w, depth: d, bedload: 1.0, conc: vec![0.2, 0.4] }
    }

    #[test]
    fn absorb_conserves_discharge_and_flux() {
        let mut a = rec(1.0, 100.0, 5.0);
        let b = HydroRecord { conc: vec![1.0, 0.0], ..rec(2.0, 50.0, 2.0) };
        let q = a.discharge() + b.discharge();
        let flux_a = a.sediment_flux();
        let flux_b = b.sediment_flux();
        a.absorb(&b);
        assert_relative_eq!(a.discharge(), q, max_relative = 1e-12);
        assert_relative_eq!(a.width, q / (1.0 * 5.0), max_relative = 1e-12);
        let flux = a.sediment_flux();
        for i in 0..2 {
            assert_relative_eq!(flux[i], flux_a[i] + flux_b[i], max_relative = 1e-12);
        }
    }

    #[test]
    fn zero_velocity_gives_zero_width() {
        let r = rec(0.0, 10.0, 1.0);
        assert_eq!(r.width_for_discharge(100.0), 0.0);
    }
}
