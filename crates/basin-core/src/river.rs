//! Rivers and the arena that owns them.
//!
//! A `River` is a path descriptor pivoting about a fixed hinge.  The cube
//! owns every attached river in a `RiverArena`; callers hold `RiverId`
//! handles (slot index + generation), so a handle to a river removed by a
//! merge is detected as stale rather than silently aliasing a new river.

use serde::{Deserialize, Serialize};

use crate::angle::normalize_angle;
use crate::avulsion::{AvulsionParams, AvulsionState};
use crate::cell::SedimentCell;
use crate::config::RiverConfig;
use crate::error::RiverError;
use crate::hydro::HydroRecord;

/// Ticks at a hard angle limit before a warning is logged.
pub const PINNED_WARN_TICKS: usize = 50;

// ── Handle ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RiverId {
    index: u32,
    generation: u32,
}

impl RiverId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl std::fmt::Display for RiverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

// ── River ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct River {
    pub name: String,
    /// Fixed pivot (i, j).
    pub hinge: (usize, usize),
    angle: f64,
    angle_min: f64,
    angle_max: f64,
    pub hydro: HydroRecord,
    pub parent: Option<RiverId>,
    pub left: Option<RiverId>,
    pub right: Option<RiverId>,
    mouth: Option<(usize, usize)>,
    avulsion: AvulsionState,
    /// Sediment clipped at the mouth last tick, re-deposited next tick.
    pub carryover: Option<SedimentCell>,
    pinned_ticks: usize,
}

impl River {
    /// `angle`, `angle_min`, `angle_max` in radians.  Bounds are normalized
    /// and must satisfy `min ≤ max` afterwards (a sector may not straddle
    /// ±π); the starting angle is clamped into them.
    pub fn new(
        hinge: (usize, usize),
        angle: f64,
        angle_min: f64,
        angle_max: f64,
        hydro: HydroRecord,
        avulsion: AvulsionState,
    ) -> Result<Self, RiverError> {
        let (min, max) = checked_bounds(angle_min, angle_max)?;
        Ok(Self {
            name: String::new(),
            hinge,
            angle: normalize_angle(angle).clamp(min, max),
            angle_min: min,
            angle_max: max,
            hydro,
            parent: None,
            left: None,
            right: None,
            mouth: None,
            avulsion,
            carryover: None,
            pinned_ticks: 0,
        })
    }

    pub fn from_config(cfg: &RiverConfig) -> Result<Self, RiverError> {
        let avulsion = AvulsionState::new(cfg.seed, cfg.std_dev, cfg.can_branch)?;
        let start = cfg
            .angle_start
            .unwrap_or(0.5 * (cfg.angle_min + cfg.angle_max));
        Self::new(cfg.hinge, start, cfg.angle_min, cfg.angle_max, cfg.hydro.clone(), avulsion)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.angle_min, self.angle_max)
    }

    /// Set the heading, normalized and clamped into the bounds.  The cached
    /// mouth is invalidated.
    pub fn set_angle(&mut self, angle: f64) {
        self.angle = normalize_angle(angle).clamp(self.angle_min, self.angle_max);
        self.mouth = None;
    }

    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), RiverError> {
        let (min, max) = checked_bounds(min, max)?;
        self.angle_min = min;
        self.angle_max = max;
        self.angle = self.angle.clamp(min, max);
        self.mouth = None;
        Ok(())
    }

    /// Cached mouth from the last `find_river_mouth`.
    pub fn mouth(&self) -> Option<(usize, usize)> {
        self.mouth
    }

    pub(crate) fn set_mouth(&mut self, mouth: Option<(usize, usize)>) {
        self.mouth = mouth;
    }

    pub fn discharge(&self) -> f64 {
        self.hydro.discharge()
    }

    pub fn has_children(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }

    pub fn can_branch(&self) -> bool {
        self.avulsion.can_branch
    }

    pub fn avulsion(&self) -> &AvulsionState {
        &self.avulsion
    }

    pub fn avulsion_mut(&mut self) -> &mut AvulsionState {
        &mut self.avulsion
    }

    /// Consecutive ticks the angle has sat on a hard limit.
    pub fn pinned_ticks(&self) -> usize {
        self.pinned_ticks
    }

    /// One avulsion step: Gaussian perturbation, then clamp into the bounds.
    /// Returns the new angle.  The mouth must be re-located afterwards.
    pub fn step_avulsion(&mut self) -> f64 {
        let raw = self.avulsion.next_angle(self.angle);
        let clamped = raw.clamp(self.angle_min, self.angle_max);
        if clamped != raw {
            self.pinned_ticks += 1;
            if self.pinned_ticks == PINNED_WARN_TICKS {
                tracing::warn!(
                    river = %self.name,
                    angle_deg = clamped.to_degrees(),
                    ticks = self.pinned_ticks,
                    "river pinned at angle limit"
                );
            }
        } else {
            self.pinned_ticks = 0;
        }
        self.angle = clamped;
        self.mouth = None;
        clamped
    }

    /// New river sharing this one's hinge and bounds, with an independent
    /// generator forked from this river's.
    pub(crate) fn spawn_branch(&mut self, angle: f64, hydro: HydroRecord) -> River {
        let avulsion = self.avulsion.fork();
        River {
            name: format!("{}.b", self.name),
            hinge: self.hinge,
            angle: normalize_angle(angle).clamp(self.angle_min, self.angle_max),
            angle_min: self.angle_min,
            angle_max: self.angle_max,
            hydro,
            parent: None,
            left: None,
            right: None,
            mouth: None,
            avulsion,
            carryover: None,
            pinned_ticks: 0,
        }
    }
}

fn checked_bounds(min: f64, max: f64) -> Result<(f64, f64), RiverError> {
    let (min, max) = (normalize_angle(min), normalize_angle(max));
    if min > max {
        return Err(RiverError::InvertedBounds { min, max });
    }
    Ok((min, max))
}

/// Serializable view of a river for snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiverSnapshot {
    pub id: RiverId,
    pub name: String,
    pub hinge: (usize, usize),
    pub angle: f64,
    pub angle_min: f64,
    pub angle_max: f64,
    pub mouth: Option<(usize, usize)>,
    pub hydro: HydroRecord,
    pub parent: Option<RiverId>,
    pub left: Option<RiverId>,
    pub right: Option<RiverId>,
    pub avulsion: AvulsionParams,
}

impl RiverSnapshot {
    pub fn of(id: RiverId, r: &River) -> Self {
        Self {
            id,
            name: r.name.clone(),
            hinge: r.hinge,
            angle: r.angle,
            angle_min: r.angle_min,
            angle_max: r.angle_max,
            mouth: r.mouth,
            hydro: r.hydro.clone(),
            parent: r.parent,
            left: r.left,
            right: r.right,
            avulsion: AvulsionParams::from(&r.avulsion),
        }
    }
}

// ── Arena ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    river: Option<River>,
}

/// Generational arena of rivers.  Freed slots are reused with a bumped
/// generation.
#[derive(Debug, Clone, Default)]
pub struct RiverArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl RiverArena {
    pub fn insert(&mut self, river: River) -> RiverId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.river = Some(river);
            return RiverId { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, river: Some(river) });
        RiverId { index, generation: 0 }
    }

    pub fn remove(&mut self, id: RiverId) -> Option<River> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        let river = slot.river.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(river)
    }

    pub fn get(&self, id: RiverId) -> Option<&River> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.river.as_ref()
    }

    pub fn get_mut(&mut self, id: RiverId) -> Option<&mut River> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        slot.river.as_mut()
    }

    pub fn contains(&self, id: RiverId) -> bool {
        self.get(id).is_some()
    }

    /// Live handles in slot order.
    pub fn ids(&self) -> Vec<RiverId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.river.is_some())
            .map(|(i, s)| RiverId { index: i as u32, generation: s.generation })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.river.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (RiverId, &River)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.river
                .as_ref()
                .map(|r| (RiverId { index: i as u32, generation: s.generation }, r))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RiverId, &mut River)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.river
                .as_mut()
                .map(move |r| (RiverId { index: i as u32, generation }, r))
        })
    }
}
