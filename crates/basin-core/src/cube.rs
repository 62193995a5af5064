//! Sediment cube: an `nx × ny` grid of columns plus sea level and the
//! rivers whose mouths live on it.
//!
//! Index convention: `i` runs along-shore (0..nx), `j` cross-shore (0..ny).
//! Columns are stored row-major with index `i * ny + j`.  A river angle of
//! 0 points along +i, π/2 along +j.

use crate::bathymetry::Bathymetry;
use crate::cell::SedimentCell;
use crate::column::SedimentColumn;
use crate::error::{CellError, RiverError};
use crate::river::{River, RiverArena, RiverId, RiverSnapshot};
use crate::sediment::SedimentTable;

#[derive(Debug, Clone)]
pub struct SedimentCube {
    nx: usize,
    ny: usize,
    /// Along-shore spacing (m).
    pub x_res: f64,
    /// Cross-shore spacing (m).
    pub y_res: f64,
    pub z_res: f64,
    sea_level: f64,
    n_types: usize,
    columns: Vec<SedimentColumn>,
    rivers: RiverArena,
    /// Model time of the most recent tick (s).
    pub time: f64,
}

impl SedimentCube {
    /// Flat cube with every column base at `base_height`.
    pub fn new(
        nx: usize,
        ny: usize,
        x_res: f64,
        y_res: f64,
        z_res: f64,
        n_types: usize,
        base_height: f64,
    ) -> Result<Self, CellError> {
        Self::from_bathymetry(&Bathymetry::new(nx, ny, base_height), x_res, y_res, z_res, n_types)
    }

    /// Column bases taken from a bathymetry grid.
    pub fn from_bathymetry(
        bathy: &Bathymetry,
        x_res: f64,
        y_res: f64,
        z_res: f64,
        n_types: usize,
    ) -> Result<Self, CellError> {
        let (nx, ny) = (bathy.nx, bathy.ny);
        let mut columns = Vec::with_capacity(nx * ny);
        for i in 0..nx {
            for j in 0..ny {
                let col = SedimentColumn::new(n_types, bathy.get(i, j), z_res)?
                    .with_position(i as f64 * x_res, j as f64 * y_res);
                columns.push(col);
            }
        }
        Ok(Self {
            nx,
            ny,
            x_res,
            y_res,
            z_res,
            sea_level: 0.0,
            n_types,
            columns,
            rivers: RiverArena::default(),
            time: 0.0,
        })
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn n_types(&self) -> usize {
        self.n_types
    }

    pub fn sea_level(&self) -> f64 {
        self.sea_level
    }

    /// Changing sea level moves the shoreline; cached mouths are dropped.
    pub fn set_sea_level(&mut self, sea_level: f64) {
        self.sea_level = sea_level;
        for (_, r) in self.rivers.iter_mut() {
            r.set_mouth(None);
        }
    }

    #[inline]
    fn idx(&self, i: usize, j: usize) -> usize {
        i * self.ny + j
    }

    /// `(i, j)` as unsigned indices when inside the grid.
    pub fn in_bounds(&self, i: isize, j: isize) -> Option<(usize, usize)> {
        if i < 0 || j < 0 || i as usize >= self.nx || j as usize >= self.ny {
            None
        } else {
            Some((i as usize, j as usize))
        }
    }

    pub fn column(&self, i: usize, j: usize) -> Option<&SedimentColumn> {
        if i >= self.nx || j >= self.ny {
            return None;
        }
        self.columns.get(self.idx(i, j))
    }

    pub fn column_mut(&mut self, i: usize, j: usize) -> Option<&mut SedimentColumn> {
        if i >= self.nx || j >= self.ny {
            return None;
        }
        let k = self.idx(i, j);
        self.columns.get_mut(k)
    }

    pub fn columns(&self) -> &[SedimentColumn] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [SedimentColumn] {
        &mut self.columns
    }

    /// Sea level minus surface elevation; `None` outside the grid.
    pub fn water_depth(&self, i: usize, j: usize) -> Option<f64> {
        self.column(i, j).map(|c| c.water_depth(self.sea_level))
    }

    pub fn top_height(&self, i: usize, j: usize) -> Option<f64> {
        self.column(i, j).map(SedimentColumn::top_height)
    }

    /// Row-major water depths.
    pub fn water_depth_grid(&self) -> Vec<f64> {
        self.columns.iter().map(|c| c.water_depth(self.sea_level)).collect()
    }

    pub fn total_thickness(&self) -> f64 {
        self.columns.iter().map(SedimentColumn::thickness).sum()
    }

    /// Total sediment mass (kg) over the grid.
    pub fn total_mass(&self, table: &SedimentTable) -> f64 {
        let area = self.x_res * self.y_res;
        self.columns.iter().map(|c| c.sediment_mass(table)).sum::<f64>() * area
    }

    /// Push a cell onto column `(i, j)`.
    pub fn add_cell(&mut self, i: usize, j: usize, cell: SedimentCell) -> Result<(), CellError> {
        let (index, len) = (i * self.ny + j, self.columns.len());
        let col = self.column_mut(i, j).ok_or(CellError::OutOfRange { index, len })?;
        col.add_cell(cell)
    }

    // ── Rivers ────────────────────────────────────────────────────────────────

    /// Attach a river as a trunk.  The cube owns the attached river from here
    /// on; its mouth is not located until `find_river_mouth`.
    pub fn add_trunk(&mut self, river: River) -> Result<RiverId, RiverError> {
        let (hi, hj) = river.hinge;
        if hi >= self.nx || hj >= self.ny {
            return Err(RiverError::HingeOutside(hi, hj));
        }
        let mut river = river;
        river.parent = None;
        river.set_mouth(None);
        let id = self.rivers.insert(river);
        tracing::debug!(river = %id, hinge = ?(hi, hj), "river attached");
        Ok(id)
    }

    /// Attach a river and locate its mouth immediately.
    pub fn add_river_mouth(&mut self, river: River) -> Result<RiverId, RiverError> {
        let id = self.add_trunk(river)?;
        self.find_river_mouth(id)?;
        Ok(id)
    }

    /// Detach a river and its whole branch subtree.
    pub fn remove_river(&mut self, id: RiverId) -> Result<River, RiverError> {
        let river = self
            .rivers
            .remove(id)
            .ok_or_else(|| RiverError::StaleHandle(id.to_string()))?;
        for child in [river.left, river.right].into_iter().flatten() {
            let _ = self.remove_river(child);
        }
        if let Some(parent) = river.parent.and_then(|p| self.rivers.get_mut(p)) {
            if parent.left == Some(id) {
                parent.left = None;
            }
            if parent.right == Some(id) {
                parent.right = None;
            }
        }
        Ok(river)
    }

    pub fn river(&self, id: RiverId) -> Option<&River> {
        self.rivers.get(id)
    }

    pub fn river_mut(&mut self, id: RiverId) -> Option<&mut River> {
        self.rivers.get_mut(id)
    }

    pub fn rivers(&self) -> &RiverArena {
        &self.rivers
    }

    pub fn n_rivers(&self) -> usize {
        self.rivers.len()
    }

    pub fn river_ids(&self) -> Vec<RiverId> {
        self.rivers.ids()
    }

    /// Rivers with no children: the ones whose mouths receive sediment.
    pub fn leaf_ids(&self) -> Vec<RiverId> {
        self.rivers
            .iter()
            .filter(|(_, r)| !r.has_children())
            .map(|(id, _)| id)
            .collect()
    }

    /// Leaves of the branch tree rooted at `id` (the river itself if it has
    /// no children).
    pub fn leaves(&self, id: RiverId) -> Vec<RiverId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let Some(r) = self.rivers.get(cur) else { continue };
            if r.has_children() {
                stack.extend(r.right);
                stack.extend(r.left);
            } else {
                out.push(cur);
            }
        }
        out
    }

    /// Split a river into `left` and `right` children that share its hinge,
    /// each taking half its width, with angles offset by ∓`delta`.  Only a
    /// leaf can be split; bifurcate one of its `leaves` instead.
    pub fn bifurcate(&mut self, id: RiverId, delta: f64) -> Result<(RiverId, RiverId), RiverError> {
        let parent = self
            .rivers
            .get_mut(id)
            .ok_or_else(|| RiverError::StaleHandle(id.to_string()))?;
        if parent.has_children() {
            return Err(RiverError::AlreadyBranched(parent.name.clone()));
        }
        let mut hydro = parent.hydro.clone();
        hydro.width *= 0.5;
        let angle = parent.angle();
        let mut left = parent.spawn_branch(angle - delta, hydro.clone());
        let mut right = parent.spawn_branch(angle + delta, hydro);
        left.name = format!("{}.l", parent.name);
        right.name = format!("{}.r", parent.name);
        left.parent = Some(id);
        right.parent = Some(id);
        let l = self.rivers.insert(left);
        let r = self.rivers.insert(right);
        if let Some(parent) = self.rivers.get_mut(id) {
            parent.left = Some(l);
            parent.right = Some(r);
            parent.set_mouth(None);
        }
        Ok((l, r))
    }

    /// Ray-cast from the river's hinge along its angle and cache the first
    /// column with `water_depth ≥ 0`.  `None` when the ray leaves the grid
    /// before reaching water.
    pub fn find_river_mouth(&mut self, id: RiverId) -> Result<Option<(usize, usize)>, RiverError> {
        let (hinge, angle) = {
            let r = self
                .rivers
                .get(id)
                .ok_or_else(|| RiverError::StaleHandle(id.to_string()))?;
            (r.hinge, r.angle())
        };
        let mouth = self.cast_to_shore(hinge, angle);
        if mouth.is_none() {
            tracing::warn!(river = %id, angle_deg = angle.to_degrees(), "mouth ray left the grid");
        }
        if let Some(r) = self.rivers.get_mut(id) {
            r.set_mouth(mouth);
        }
        Ok(mouth)
    }

    /// Re-locate every leaf river's mouth.  Returns how many were found.
    pub fn find_all_river_mouths(&mut self) -> usize {
        let mut found = 0;
        for id in self.leaf_ids() {
            if let Ok(Some(_)) = self.find_river_mouth(id) {
                found += 1;
            }
        }
        found
    }

    /// First column along the ray with `water_depth ≥ 0`.
    pub fn cast_to_shore(&self, hinge: (usize, usize), angle: f64) -> Option<(usize, usize)> {
        self.ray_path(hinge, angle)
            .into_iter()
            .find(|&(i, j)| self.columns[self.idx(i, j)].water_depth(self.sea_level) >= 0.0)
    }

    /// Grid traversal (Amanatides–Woo) from the centre of `hinge`: every
    /// column the ray passes through, in order, up to the grid edge.  Empty
    /// when the hinge is off the grid.
    pub fn ray_path(&self, hinge: (usize, usize), angle: f64) -> Vec<(usize, usize)> {
        let (hi, hj) = hinge;
        let mut path = Vec::new();
        if self.column(hi, hj).is_none() {
            return path;
        }

        // Direction in index space.
        let (mut dx, mut dy) = (angle.cos() / self.x_res, angle.sin() / self.y_res);
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 || !len.is_finite() {
            return path;
        }
        dx /= len;
        dy /= len;
        const EPS: f64 = 1e-12;
        if dx.abs() < EPS {
            dx = 0.0;
        }
        if dy.abs() < EPS {
            dy = 0.0;
        }

        let step_i: isize = if dx > 0.0 { 1 } else { -1 };
        let step_j: isize = if dy > 0.0 { 1 } else { -1 };
        let t_delta_i = if dx != 0.0 { 1.0 / dx.abs() } else { f64::INFINITY };
        let t_delta_j = if dy != 0.0 { 1.0 / dy.abs() } else { f64::INFINITY };
        let mut t_max_i = 0.5 * t_delta_i;
        let mut t_max_j = 0.5 * t_delta_j;

        let (mut i, mut j) = (hi as isize, hj as isize);
        let max_steps = self.nx + self.ny + 2;
        for _ in 0..max_steps {
            let Some(cell) = self.in_bounds(i, j) else { break };
            path.push(cell);
            if t_max_i < t_max_j {
                i += step_i;
                t_max_i += t_delta_i;
            } else {
                j += step_j;
                t_max_j += t_delta_j;
            }
        }
        path
    }

    /// Step every river's angle by one random-walk increment.  Mouths are
    /// invalidated and must be re-located.
    pub fn avulse_rivers(&mut self) -> Vec<(RiverId, f64)> {
        self.rivers
            .iter_mut()
            .map(|(id, r)| (id, r.step_avulsion()))
            .collect()
    }

    /// Serializable view of every attached river.
    pub fn river_snapshots(&self) -> Vec<RiverSnapshot> {
        self.rivers.iter().map(|(id, r)| RiverSnapshot::of(id, r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::deg_to_rad;
    use crate::avulsion::AvulsionState;
    use crate::hydro::HydroRecord;
    use approx::assert_abs_diff_eq;

    fn shelf_cube(nx: usize, ny: usize, shore: usize) -> SedimentCube {
        let bathy = Bathymetry::sloping_shelf(nx, ny, 100.0, shore, 0.01);
        SedimentCube::from_bathymetry(&bathy, 100.0, 100.0, 1.0, 3).unwrap()
    }

    fn river_at(hinge: (usize, usize), angle_deg: f64) -> River {
        River::new(
            hinge,
            deg_to_rad(angle_deg),
            deg_to_rad(60.0),
            deg_to_rad(120.0),
            HydroRecord::default(),
            AvulsionState::new(1945, deg_to_rad(0.75), false).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn mouth_is_first_wet_row_along_the_ray() {
        let mut cube = shelf_cube(40, 30, 8);
        for angle in [60.0, 75.0, 90.0, 105.0, 120.0] {
            let id = cube.add_trunk(river_at((20, 0), angle)).unwrap();
            let (mi, mj) = cube.find_river_mouth(id).unwrap().expect("mouth inside grid");
            let first_wet = (0..cube.ny())
                .find(|&j| cube.water_depth(mi, j).unwrap() >= 0.0)
                .unwrap();
            assert_eq!(mj, first_wet, "angle {angle}: mouth row mismatch");
            assert_eq!(cube.river(id).unwrap().mouth(), Some((mi, mj)));
        }
    }

    #[test]
    fn straight_offshore_ray_keeps_hinge_column() {
        let mut cube = shelf_cube(10, 10, 4);
        let id = cube.add_river_mouth(river_at((5, 0), 90.0)).unwrap();
        assert_eq!(cube.river(id).unwrap().mouth(), Some((5, 4)));
    }

    #[test]
    fn ray_leaving_grid_gives_no_mouth() {
        // All land: the ray must exit.
        let bathy = Bathymetry::new(10, 10, 5.0);
        let mut cube = SedimentCube::from_bathymetry(&bathy, 100.0, 100.0, 1.0, 3).unwrap();
        let id = cube.add_trunk(river_at((5, 0), 70.0)).unwrap();
        assert_eq!(cube.find_river_mouth(id).unwrap(), None);
    }

    #[test]
    fn submerged_hinge_is_its_own_mouth() {
        let mut cube = shelf_cube(10, 10, 0);
        let id = cube.add_river_mouth(river_at((3, 2), 90.0)).unwrap();
        assert_eq!(cube.river(id).unwrap().mouth(), Some((3, 2)));
    }

    #[test]
    fn hinge_outside_rejected() {
        let mut cube = shelf_cube(4, 4, 1);
        assert_eq!(
            cube.add_trunk(river_at((9, 0), 90.0)).unwrap_err(),
            RiverError::HingeOutside(9, 0)
        );
    }

    #[test]
    fn deposition_raises_surface_and_moves_shore() {
        let mut cube = shelf_cube(5, 10, 4);
        let depth = cube.water_depth(2, 4).unwrap();
        assert!(depth > 0.0);
        let cell = SedimentCell::new_sized(3, depth + 0.1, &[1.0, 0.0, 0.0]).unwrap();
        cube.add_cell(2, 4, cell).unwrap();
        assert!(cube.water_depth(2, 4).unwrap() < 0.0);
        let id = cube.add_river_mouth(river_at((2, 0), 90.0)).unwrap();
        assert_eq!(cube.river(id).unwrap().mouth(), Some((2, 5)));
    }

    #[test]
    fn bifurcate_builds_leaf_pair() {
        let mut cube = shelf_cube(10, 10, 4);
        let trunk = cube.add_trunk(river_at((5, 0), 90.0)).unwrap();
        let width = cube.river(trunk).unwrap().hydro.width;
        let (l, r) = cube.bifurcate(trunk, deg_to_rad(10.0)).unwrap();
        assert_eq!(cube.leaves(trunk), vec![l, r]);
        assert_eq!(cube.leaf_ids().len(), 2);
        assert!(cube.river(l).unwrap().angle() < cube.river(r).unwrap().angle());
        assert_eq!(cube.river(l).unwrap().hydro.width, 0.5 * width);

        cube.remove_river(trunk).unwrap();
        assert_eq!(cube.n_rivers(), 0, "children go with the trunk");
    }

    #[test]
    fn branched_river_cannot_be_bifurcated_again() {
        let mut cube = shelf_cube(10, 10, 4);
        let trunk = cube.add_trunk(river_at((5, 0), 90.0)).unwrap();
        let width = cube.river(trunk).unwrap().hydro.width;
        let (l, r) = cube.bifurcate(trunk, 0.1).unwrap();

        assert!(matches!(
            cube.bifurcate(trunk, 0.1),
            Err(RiverError::AlreadyBranched(_))
        ));
        assert_eq!(cube.n_rivers(), 3, "failed split adds nothing");
        assert_eq!(cube.leaves(trunk), vec![l, r]);

        // Splitting a leaf deepens the tree without orphaning anything.
        let (ll, lr) = cube.bifurcate(l, 0.05).unwrap();
        assert_eq!(cube.leaves(trunk), vec![ll, lr, r]);
        assert_eq!(cube.leaf_ids().len(), 3);
        let leaf_width: f64 = cube.leaf_ids().iter().map(|&id| cube.river(id).unwrap().hydro.width).sum();
        assert_abs_diff_eq!(leaf_width, width, epsilon = 1e-9);

        cube.remove_river(trunk).unwrap();
        assert_eq!(cube.n_rivers(), 0);
    }

    #[test]
    fn ray_path_runs_from_hinge_to_grid_edge() {
        let cube = shelf_cube(10, 10, 4);
        let path = cube.ray_path((5, 0), deg_to_rad(90.0));
        assert_eq!(path.len(), 10);
        assert_eq!(path.first(), Some(&(5, 0)));
        assert_eq!(path.last(), Some(&(5, 9)));
        assert!(cube.ray_path((11, 0), 0.0).is_empty());

        let diagonal = cube.ray_path((0, 0), deg_to_rad(45.0));
        for pair in diagonal.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let step = (b.0 as isize - a.0 as isize).abs() + (b.1 as isize - a.1 as isize).abs();
            assert_eq!(step, 1, "consecutive columns share an edge");
        }
    }

    #[test]
    fn sea_level_rise_drops_cached_mouths() {
        let mut cube = shelf_cube(10, 10, 4);
        let id = cube.add_river_mouth(river_at((5, 0), 90.0)).unwrap();
        cube.set_sea_level(50.0);
        assert_eq!(cube.river(id).unwrap().mouth(), None);
        assert_eq!(cube.find_river_mouth(id).unwrap(), Some((5, 0)));
    }
}
