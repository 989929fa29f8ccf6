//! Finite-difference wave height field.
//!
//! [`HeightField`] advances the damped 2-D wave equation
//!
//! ```text
//! d²h/dt² = c² (d²h/dx² + d²h/dz²) - µ dh/dt
//! ```
//!
//! over a fixed grid using the explicit three-level scheme
//!
//! ```text
//! h[n+1] = k1 h[n-1] + k2 h[n] + k3 (sum of the four neighbours of h[n])
//! ```
//!
//! Two position buffers hold `h[n-1]` ("previous") and `h[n]` ("current").
//! An update overwrites the previous buffer in place with `h[n+1]` and then
//! swaps the two, so no third buffer is ever allocated.
//!
//! # Boundary policy
//!
//! The stencil needs all four neighbours, so the outermost ring of nodes is
//! never updated and stays at its resting height for the lifetime of the
//! field.
//!
//! # Parallelism
//!
//! Both passes of an update (heights, then normals/tangents) are split by
//! row with rayon. Each row writes only its own cells and reads from a buffer
//! nobody writes during the pass, so the result is bit-for-bit identical to a
//! serial run.
//!
//! # Example
//!
//! ```
//! use waves_sim::HeightField;
//!
//! let mut field = HeightField::new(5, 5, 1.0, 0.25, 4.0, 0.2).unwrap();
//! field.disturb(2, 2, 1.0);
//! assert_eq!(field.position(12).y, 1.0);
//!
//! // Less than one time step accumulated: nothing moves yet.
//! assert!(!field.step(0.1));
//! assert!(field.step(0.15));
//! ```

use glam::Vec3;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{SimError, SimResult};
use crate::grid::WaveVertex;

/// A simulated wave surface.
///
/// Grid topology (rows, columns, spatial step) is fixed at construction.
/// Only heights, normals and tangents change afterwards; the x and z
/// coordinates of every node are immutable.
#[derive(Clone, Debug)]
pub struct HeightField {
    rows: usize,
    cols: usize,
    spatial_step: f32,
    time_step: f32,
    k1: f32,
    k2: f32,
    k3: f32,
    /// Time carried over between calls to [`step`](Self::step).
    accumulated: f32,
    steps: u64,
    previous: Vec<Vec3>,
    current: Vec<Vec3>,
    normals: Vec<Vec3>,
    tangents: Vec<Vec3>,
}

impl HeightField {
    /// Creates a flat height field centered at the origin.
    ///
    /// # Arguments
    ///
    /// * `rows` - Number of grid rows (along -z)
    /// * `cols` - Number of grid columns (along +x)
    /// * `dx` - Distance between neighbouring nodes
    /// * `dt` - Simulation time step in seconds
    /// * `speed` - Wave propagation speed
    /// * `damping` - Damping coefficient
    ///
    /// # Errors
    ///
    /// Returns [`SimError::GridTooSmall`] if either dimension is 2 or less and
    /// [`SimError::InvalidStep`] if `dx` or `dt` is not positive.
    pub fn new(
        rows: usize,
        cols: usize,
        dx: f32,
        dt: f32,
        speed: f32,
        damping: f32,
    ) -> SimResult<Self> {
        if rows <= 2 || cols <= 2 {
            return Err(SimError::GridTooSmall { rows, cols });
        }
        if !(dx > 0.0) {
            return Err(SimError::InvalidStep {
                name: "spatial step",
                value: dx,
            });
        }
        if !(dt > 0.0) {
            return Err(SimError::InvalidStep {
                name: "time step",
                value: dt,
            });
        }

        let d = damping * dt + 2.0;
        let e = (speed * speed) * (dt * dt) / (dx * dx);
        let k1 = (damping * dt - 2.0) / d;
        let k2 = (4.0 - 8.0 * e) / d;
        let k3 = (2.0 * e) / d;

        let half_width = (cols - 1) as f32 * dx * 0.5;
        let half_depth = (rows - 1) as f32 * dx * 0.5;

        let mut positions = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            let z = half_depth - i as f32 * dx;
            for j in 0..cols {
                let x = -half_width + j as f32 * dx;
                positions.push(Vec3::new(x, 0.0, z));
            }
        }

        let field = Self {
            rows,
            cols,
            spatial_step: dx,
            time_step: dt,
            k1,
            k2,
            k3,
            accumulated: 0.0,
            steps: 0,
            previous: positions.clone(),
            current: positions,
            normals: vec![Vec3::Y; rows * cols],
            tangents: vec![Vec3::X; rows * cols],
        };

        let limit = field.max_stable_speed(damping);
        if speed > limit {
            warn!(
                "Wave speed {} exceeds the stability limit {:.3} for dx={} dt={}; the simulation will diverge",
                speed, limit, dx, dt
            );
        }

        debug!(
            "Created {}x{} height field (dx={}, dt={}, k1={:.4}, k2={:.4}, k3={:.4})",
            rows, cols, dx, dt, k1, k2, k3
        );

        Ok(field)
    }

    /// Largest wave speed for which the explicit scheme stays bounded with
    /// this grid's spatial and time step.
    pub fn max_stable_speed(&self, damping: f32) -> f32 {
        self.spatial_step / (2.0 * self.time_step) * (damping * self.time_step + 2.0).sqrt()
    }

    /// Accumulates `elapsed` seconds and performs at most one update.
    ///
    /// An update happens once the accumulated time reaches the time step.
    /// One time step is then subtracted and any excess carries over to the
    /// next call; a single call never runs more than one update, however
    /// much time has built up.
    ///
    /// Returns `true` if an update was performed.
    pub fn step(&mut self, elapsed: f32) -> bool {
        self.accumulated += elapsed;
        if self.accumulated < self.time_step {
            return false;
        }
        self.accumulated -= self.time_step;

        self.update_heights();
        std::mem::swap(&mut self.previous, &mut self.current);
        self.update_normals();

        self.steps += 1;
        true
    }

    /// Writes `h[n+1]` for every interior node into the previous buffer.
    fn update_heights(&mut self) {
        let cols = self.cols;
        let (k1, k2, k3) = (self.k1, self.k2, self.k3);
        let current = &self.current;

        self.previous
            .par_chunks_mut(cols)
            .enumerate()
            .skip(1)
            .take(self.rows - 2)
            .for_each(|(i, prev_row)| {
                let row = i * cols;
                for j in 1..cols - 1 {
                    let neighbours = current[row + cols + j].y
                        + current[row - cols + j].y
                        + current[row + j + 1].y
                        + current[row + j - 1].y;
                    prev_row[j].y = k1 * prev_row[j].y + k2 * current[row + j].y + k3 * neighbours;
                }
            });
    }

    /// Recomputes interior normals and tangents from central differences.
    fn update_normals(&mut self) {
        let cols = self.cols;
        let two_dx = 2.0 * self.spatial_step;
        let current = &self.current;

        self.normals
            .par_chunks_mut(cols)
            .zip(self.tangents.par_chunks_mut(cols))
            .enumerate()
            .skip(1)
            .take(self.rows - 2)
            .for_each(|(i, (normal_row, tangent_row))| {
                let row = i * cols;
                for j in 1..cols - 1 {
                    let l = current[row + j - 1].y;
                    let r = current[row + j + 1].y;
                    let t = current[row - cols + j].y;
                    let b = current[row + cols + j].y;

                    normal_row[j] = Vec3::new(-r + l, two_dx, b - t).normalize();
                    tangent_row[j] = Vec3::new(two_dx, r - l, 0.0).normalize();
                }
            });
    }

    /// Adds a point impulse at node (`i`, `j`).
    ///
    /// The node's height rises by `magnitude` and each of its four axis
    /// neighbours by `magnitude / 2`. Normals are not refreshed until the
    /// next update.
    ///
    /// # Panics
    ///
    /// Panics unless `1 < i < rows - 2` and `1 < j < cols - 2`; the
    /// neighbours of a disturbed node must themselves be interior.
    pub fn disturb(&mut self, i: usize, j: usize, magnitude: f32) {
        assert!(
            i > 1 && i < self.rows - 2,
            "disturb row {} outside 2..{}",
            i,
            self.rows - 2
        );
        assert!(
            j > 1 && j < self.cols - 2,
            "disturb column {} outside 2..{}",
            j,
            self.cols - 2
        );

        let half = 0.5 * magnitude;
        let center = i * self.cols + j;

        self.current[center].y += magnitude;
        self.current[center + 1].y += half;
        self.current[center - 1].y += half;
        self.current[center + self.cols].y += half;
        self.current[center - self.cols].y += half;
    }

    /// Fills `vertices` with the current surface for upload.
    ///
    /// Texture coordinates span `[0, 1]` across the grid.
    ///
    /// # Panics
    ///
    /// Panics if `vertices.len()` differs from [`vertex_count`](Self::vertex_count).
    pub fn write_vertices(&self, vertices: &mut [WaveVertex]) {
        assert_eq!(
            vertices.len(),
            self.vertex_count(),
            "vertex slice does not match the grid"
        );

        let width = self.width();
        let depth = self.depth();
        for ((vertex, position), normal) in vertices
            .iter_mut()
            .zip(&self.current)
            .zip(&self.normals)
        {
            *vertex = WaveVertex::new(
                *position,
                *normal,
                glam::Vec2::new(0.5 + position.x / width, 0.5 - position.z / depth),
            );
        }
    }

    /// Flattened index of node (`row`, `col`).
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Current position of the node at flattened index `i`.
    #[inline]
    pub fn position(&self, i: usize) -> Vec3 {
        self.current[i]
    }

    /// Current normal of the node at flattened index `i`.
    #[inline]
    pub fn normal(&self, i: usize) -> Vec3 {
        self.normals[i]
    }

    /// Current unit tangent in the +x direction at flattened index `i`.
    #[inline]
    pub fn tangent_x(&self, i: usize) -> Vec3 {
        self.tangents[i]
    }

    /// All current positions, row-major.
    pub fn positions(&self) -> &[Vec3] {
        &self.current
    }

    /// All normals, row-major.
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// All tangents, row-major.
    pub fn tangents(&self) -> &[Vec3] {
        &self.tangents
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        (self.rows - 1) * (self.cols - 1) * 2
    }

    /// Extent along x.
    #[inline]
    pub fn width(&self) -> f32 {
        self.cols as f32 * self.spatial_step
    }

    /// Extent along z.
    #[inline]
    pub fn depth(&self) -> f32 {
        self.rows as f32 * self.spatial_step
    }

    #[inline]
    pub fn spatial_step(&self) -> f32 {
        self.spatial_step
    }

    #[inline]
    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    /// Number of updates performed so far.
    #[inline]
    pub fn steps_taken(&self) -> u64 {
        self.steps
    }

    /// Update coefficients `(k1, k2, k3)`.
    #[inline]
    pub fn coefficients(&self) -> (f32, f32, f32) {
        (self.k1, self.k2, self.k3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_field() -> HeightField {
        HeightField::new(5, 5, 1.0, 0.25, 4.0, 0.2).unwrap()
    }

    #[test]
    fn test_rejects_degenerate_grids() {
        assert_eq!(
            HeightField::new(2, 5, 1.0, 0.1, 1.0, 0.0).unwrap_err(),
            SimError::GridTooSmall { rows: 2, cols: 5 }
        );
        assert!(matches!(
            HeightField::new(5, 1, 1.0, 0.1, 1.0, 0.0),
            Err(SimError::GridTooSmall { .. })
        ));
        assert!(matches!(
            HeightField::new(5, 5, 0.0, 0.1, 1.0, 0.0),
            Err(SimError::InvalidStep {
                name: "spatial step",
                ..
            })
        ));
        assert!(matches!(
            HeightField::new(5, 5, 1.0, -0.1, 1.0, 0.0),
            Err(SimError::InvalidStep {
                name: "time step",
                ..
            })
        ));
    }

    #[test]
    fn test_coefficients() {
        let field = small_field();
        let (k1, k2, k3) = field.coefficients();
        // d = 0.2 * 0.25 + 2 = 2.05, e = 16 * 0.0625 / 1 = 1
        assert!((k1 - (0.05 - 2.0) / 2.05).abs() < 1e-6);
        assert!((k2 - (4.0 - 8.0) / 2.05).abs() < 1e-6);
        assert!((k3 - 2.0 / 2.05).abs() < 1e-6);
    }

    #[test]
    fn test_grid_is_centered_and_flat() {
        let field = small_field();
        assert_eq!(field.position(12), Vec3::ZERO);
        assert_eq!(field.position(0), Vec3::new(-2.0, 0.0, 2.0));
        assert_eq!(field.position(24), Vec3::new(2.0, 0.0, -2.0));
        assert!(field.normals().iter().all(|n| *n == Vec3::Y));
        assert!(field.tangents().iter().all(|t| *t == Vec3::X));
    }

    #[test]
    fn test_metadata() {
        let field = HeightField::new(4, 6, 0.5, 0.1, 1.0, 0.1).unwrap();
        assert_eq!(field.row_count(), 4);
        assert_eq!(field.column_count(), 6);
        assert_eq!(field.vertex_count(), 24);
        assert_eq!(field.triangle_count(), 3 * 5 * 2);
        assert_eq!(field.width(), 3.0);
        assert_eq!(field.depth(), 2.0);
        assert_eq!(field.index(2, 3), 15);
    }

    #[test]
    fn test_disturb_raises_node_and_neighbours() {
        let mut field = small_field();
        field.disturb(2, 2, 1.0);

        assert_eq!(field.position(12).y, 1.0);
        for i in [7, 17, 11, 13] {
            assert_eq!(field.position(i).y, 0.5, "neighbour {}", i);
        }
        for i in (0..25).filter(|i| ![7, 11, 12, 13, 17].contains(i)) {
            assert_eq!(field.position(i).y, 0.0, "node {}", i);
        }
    }

    #[test]
    #[should_panic(expected = "disturb row")]
    fn test_disturb_rejects_edge_rows() {
        let mut field = small_field();
        field.disturb(1, 2, 1.0);
    }

    #[test]
    #[should_panic(expected = "disturb column")]
    fn test_disturb_rejects_edge_columns() {
        let mut field = small_field();
        field.disturb(2, 3, 1.0);
    }

    #[test]
    fn test_step_waits_for_full_time_step() {
        let mut field = small_field();
        field.disturb(2, 2, 1.0);
        let before = field.positions().to_vec();

        assert!(!field.step(0.125));
        assert!(!field.step(0.0625));
        assert_eq!(field.positions(), before.as_slice());
        assert_eq!(field.steps_taken(), 0);

        assert!(field.step(0.0625));
        assert_eq!(field.steps_taken(), 1);
        assert_ne!(field.positions(), before.as_slice());
    }

    #[test]
    fn test_step_runs_once_and_keeps_remainder() {
        let mut field = small_field();
        // Two and a half steps' worth of time in one call.
        assert!(field.step(0.625));
        assert_eq!(field.steps_taken(), 1);
        // The carried 0.375 is still at least one step.
        assert!(field.step(0.0));
        assert_eq!(field.steps_taken(), 2);
        // 0.125 left over; not enough for a third.
        assert!(!field.step(0.0));
        assert_eq!(field.steps_taken(), 2);
    }

    #[test]
    fn test_single_update_matches_stencil() {
        let mut field = small_field();
        field.disturb(2, 2, 1.0);
        field.step(0.25);

        let (_, k2, k3) = field.coefficients();
        // Corner-adjacent interior node (1, 1): own height 0, two raised
        // neighbours at 0.5 each.
        assert!((field.position(6).y - k3).abs() < 1e-6);
        // Center: k2 * 1 + k3 * (4 * 0.5)
        assert!((field.position(12).y - (k2 + 2.0 * k3)).abs() < 1e-6);
    }

    #[test]
    fn test_flat_field_stays_flat() {
        let mut field = small_field();
        for _ in 0..10 {
            field.step(0.25);
        }
        assert!(field.positions().iter().all(|p| p.y == 0.0));
        assert!(field.normals().iter().all(|n| *n == Vec3::Y));
        assert!(field.tangents().iter().all(|t| *t == Vec3::X));
    }

    #[test]
    fn test_normals_tilt_away_from_crest() {
        let mut field = HeightField::new(9, 9, 1.0, 0.03, 4.0, 0.2).unwrap();
        field.disturb(4, 4, 1.0);
        field.step(0.03);

        // West of the crest the surface rises to the east, so the normal
        // leans toward -x; the tangent climbs.
        let west = field.index(4, 3);
        assert!(field.normal(west).x < 0.0);
        assert!(field.tangent_x(west).y > 0.0);

        let east = field.index(4, 5);
        assert!(field.normal(east).x > 0.0);

        for n in field.normals() {
            assert!((n.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_boundary_is_fixed() {
        let mut field = HeightField::new(8, 10, 1.0, 0.03, 4.0, 0.2).unwrap();
        field.disturb(2, 2, 3.0);
        field.disturb(5, 7, -2.0);
        for _ in 0..50 {
            field.step(0.03);
        }

        for row in 0..field.row_count() {
            for col in 0..field.column_count() {
                let on_edge = row == 0
                    || col == 0
                    || row == field.row_count() - 1
                    || col == field.column_count() - 1;
                if on_edge {
                    let i = field.index(row, col);
                    assert_eq!(field.position(i).y, 0.0);
                    assert_eq!(field.normal(i), Vec3::Y);
                    assert_eq!(field.tangent_x(i), Vec3::X);
                }
            }
        }
    }

    #[test]
    fn test_write_vertices() {
        let mut field = small_field();
        field.disturb(2, 2, 1.0);
        let mut vertices = vec![WaveVertex::default(); field.vertex_count()];
        field.write_vertices(&mut vertices);

        assert_eq!(vertices[12].position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(vertices[12].normal, Vec3::Y);
        assert_eq!(vertices[12].tex_coord, glam::Vec2::new(0.5, 0.5));
        // Row 0 is the far (+z) edge, which maps to the low v end.
        assert!(vertices[0].tex_coord.y < 0.5);
        assert!(vertices[0].tex_coord.x < 0.5);
    }

    #[test]
    #[should_panic(expected = "vertex slice")]
    fn test_write_vertices_rejects_wrong_length() {
        let field = small_field();
        let mut vertices = vec![WaveVertex::default(); 3];
        field.write_vertices(&mut vertices);
    }

    #[test]
    fn test_stability_limit() {
        let field = HeightField::new(8, 8, 1.0, 0.03, 4.0, 0.2).unwrap();
        assert!(field.max_stable_speed(0.2) > 4.0);

        let field = small_field();
        assert!(field.max_stable_speed(0.2) < 4.0);
    }
}
