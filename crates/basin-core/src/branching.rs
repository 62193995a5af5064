//! Merge/split engine over the rivers attached to a cube.
//!
//! Only trunk rivers with no children that are allowed to branch take part;
//! a bifurcated tree is left alone.  Both passes sort by current angle, with
//! the handle as a tie-break so results never depend on arena order.  Both
//! repeat until stable, so calling either twice in a row changes nothing.

use crate::angle::angle_distance;
use crate::config::SimulationConfig;
use crate::cube::SedimentCube;
use crate::hydro::HydroRecord;
use crate::river::RiverId;

/// Rivers eligible for merge/split, sorted by angle.
fn sorted_candidates(cube: &SedimentCube) -> Vec<(RiverId, f64)> {
    let mut v: Vec<(RiverId, f64)> = cube
        .rivers()
        .iter()
        .filter(|(_, r)| r.parent.is_none() && !r.has_children() && r.can_branch())
        .map(|(id, r)| (id, r.angle()))
        .collect();
    v.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    v
}

/// Fold every pair of angle-neighbours closer than `eps` (radians) into one
/// river.  Neighbours wrap around: the last and first rivers in angle order
/// are compared across ±π too.  The higher-discharge river survives (the
/// first of the pair in sweep order on a tie) and takes the other's
/// discharge as extra width.  Passes repeat until no pair is within `eps`,
/// so a second call is a no-op.
///
/// Returns the number of rivers removed.
pub fn merge_rivers(cube: &mut SedimentCube, eps: f64) -> usize {
    let mut removed = 0;
    loop {
        let sorted = sorted_candidates(cube);
        let wrap = match sorted.as_slice() {
            [first, .., last] if sorted.len() > 2 => Some((*last, *first)),
            _ => None,
        };
        let pair = sorted
            .windows(2)
            .map(|w| (w[0], w[1]))
            .chain(wrap)
            .find(|(a, b)| angle_distance(a.1, b.1) < eps)
            .map(|(a, b)| (a.0, b.0));
        let Some((prev, cur)) = pair else { break };

        let q_prev = cube.river(prev).map_or(0.0, |r| r.discharge());
        let q_cur = cube.river(cur).map_or(0.0, |r| r.discharge());
        let (keep, drop) = if q_cur > q_prev { (cur, prev) } else { (prev, cur) };

        let Ok(loser) = cube.remove_river(drop) else { break };
        if let Some(survivor) = cube.river_mut(keep) {
            survivor.hydro.absorb(&loser.hydro);
            if let Some(extra) = loser.carryover {
                match survivor.carryover.as_mut() {
                    Some(c) => {
                        if let Err(err) = c.add(&extra) {
                            tracing::warn!(%err, "carry-over dropped on merge");
                        }
                    }
                    None => survivor.carryover = Some(extra),
                }
            }
            survivor.set_mouth(None);
            tracing::debug!(
                survivor = %keep,
                removed = %drop,
                width = survivor.hydro.width,
                "rivers merged"
            );
        }
        removed += 1;
    }
    removed
}

/// One side of a gap: a real river or a wall at a global angle limit.
#[derive(Debug, Clone)]
struct Edge {
    id: Option<RiverId>,
    angle: f64,
    hydro: HydroRecord,
}

/// Insert new rivers until no gap between angle-neighbours is wider than
/// `cfg.split_threshold`, counting the global limits
/// `cfg.angle_min`/`cfg.angle_max` as zero-width walls.
///
/// Each new river sits at its gap's midpoint with midpoint hydrology and
/// carries `f·(q1 + q2)` of discharge; each real neighbour keeps `1 − f` of
/// its width, so total discharge is unchanged.  A new river forks its
/// generator from the higher-discharge real neighbour, shares that river's
/// hinge, and is bounded by the global limits.  Gaps are halved pass by
/// pass, so a second call finds nothing to split.  Returns the handles of
/// the new rivers.
pub fn create_rivers(cube: &mut SedimentCube, cfg: &SimulationConfig) -> Vec<RiverId> {
    if cfg.split_threshold.is_nan() || cfg.split_threshold <= 0.0 {
        tracing::warn!(threshold = cfg.split_threshold, "split threshold not positive; no rivers created");
        return Vec::new();
    }
    let mut created = Vec::new();
    loop {
        let pass = split_pass(cube, cfg);
        if pass.is_empty() {
            return created;
        }
        created.extend(pass);
    }
}

/// One sweep over the current gaps; splits each gap wider than the
/// threshold once.
fn split_pass(cube: &mut SedimentCube, cfg: &SimulationConfig) -> Vec<RiverId> {
    let sorted = sorted_candidates(cube);
    if sorted.is_empty() {
        return Vec::new();
    }
    let f = cfg.split_fraction.clamp(0.0, 1.0);

    let mut edges: Vec<Edge> = Vec::with_capacity(sorted.len() + 2);
    for &(id, angle) in &sorted {
        if let Some(r) = cube.river(id) {
            edges.push(Edge { id: Some(id), angle, hydro: r.hydro.clone() });
        }
    }
    let wall = |angle: f64, like: &HydroRecord| Edge {
        id: None,
        angle,
        hydro: HydroRecord { width: 0.0, ..like.clone() },
    };
    let (Some(first), Some(last)) = (edges.first().cloned(), edges.last().cloned()) else {
        return Vec::new();
    };
    edges.insert(0, wall(cfg.angle_min, &first.hydro));
    edges.push(wall(cfg.angle_max, &last.hydro));

    let mut created = Vec::new();
    for w in edges.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if b.angle - a.angle <= cfg.split_threshold {
            continue;
        }
        // A river bordering two gaps has already given up width to the first.
        let live = |e: &Edge| match e.id.and_then(|id| cube.river(id)) {
            Some(r) => r.hydro.clone(),
            None => e.hydro.clone(),
        };
        let (ha, hb) = (live(a), live(b));
        let q_total = ha.discharge() + hb.discharge();
        let mut hydro = HydroRecord::midpoint(&ha, &hb);
        hydro.width = f * hydro.width_for_discharge(q_total);
        if hydro.width <= 0.0 {
            continue;
        }

        let parent = match (a.id, b.id) {
            (Some(x), Some(y)) => {
                if hb.discharge() > ha.discharge() { y } else { x }
            }
            (Some(x), None) | (None, Some(x)) => x,
            (None, None) => continue,
        };
        let angle = 0.5 * (a.angle + b.angle);
        let Some(parent_river) = cube.river_mut(parent) else { continue };
        let mut branch = parent_river.spawn_branch(angle, hydro);
        if let Err(err) = branch.set_bounds(cfg.angle_min, cfg.angle_max) {
            tracing::warn!(%err, "global angle limits rejected; branch keeps parent limits");
        }
        branch.set_angle(angle);

        for id in [a.id, b.id].into_iter().flatten() {
            if let Some(r) = cube.river_mut(id) {
                r.hydro.width *= 1.0 - f;
            }
        }
        match cube.add_trunk(branch) {
            Ok(id) => {
                tracing::debug!(river = %id, angle_deg = angle.to_degrees(), "river created");
                created.push(id);
            }
            Err(err) => tracing::warn!(%err, "new river rejected"),
        }
    }
    created
}
