use std::sync::mpsc::Receiver;

use glam::Vec2;

use crate::cell::{Axis, CellType, Neighbor};
use crate::grid::{Grid, GridError};
use crate::Renderer;

/// Tunable parameters of the solver.
#[derive(Debug, Clone)]
pub struct SolverParams {
    /// Simulated duration of one frame, in time units.
    pub frame_dt: f32,
    /// CFL coefficient bounding each substep. Larger values trade
    /// stability for speed.
    pub cfl_coefficient: f32,
    /// Uniform body force applied per unit time, in cells per time
    /// squared.
    pub gravity: Vec2,
    /// Iteration cap for the pressure relaxation.
    pub num_pressure_iters: usize,
    /// Early-exit threshold for the pressure relaxation.
    pub pressure_tolerance: f32,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            frame_dt: 1.0 / 30.0,
            cfl_coefficient: 2.0,
            gravity: Vec2::new(0.0, -0.098),
            num_pressure_iters: 200,
            pressure_tolerance: 1e-5,
        }
    }
}

/// Advances a 2D incompressible-fluid approximation on a MAC grid.
///
/// One call to [`advance_frame`](FluidSolver::advance_frame) fully
/// simulates a frame as a sequence of CFL-bounded substeps, each running
/// semi-Lagrangian advection, body-force application, pressure
/// projection, solid-boundary enforcement and tracer-particle advection.
/// The finished frame is handed read-only to a [`Renderer`] via
/// [`draw`](FluidSolver::draw).
#[derive(Debug)]
pub struct FluidSolver {
    width: f32,
    height: f32,
    params: SolverParams,
    /// The grid holding the current field; replaced wholesale on reset.
    pub grid: Grid,
    /// Massless tracer particle positions. Visualization only; particles
    /// never feed back into the grid.
    pub particles: Vec<Vec2>,
    frame_ready: bool,
    /// Reset requests injected by the owning application, drained only
    /// between frames.
    reset_requests: Option<Receiver<()>>,
}

impl FluidSolver {
    pub fn new(width: f32, height: f32, params: SolverParams) -> Result<FluidSolver, GridError> {
        let mut solver = FluidSolver {
            width,
            height,
            params,
            grid: Grid::new(width, height)?,
            particles: Vec::new(),
            frame_ready: false,
            reset_requests: None,
        };
        solver.reset();

        Ok(solver)
    }

    /// Like [`new`](FluidSolver::new), but subscribes the solver to a
    /// channel of reset requests. Requests are applied at the start of
    /// the next frame, never mid-substep.
    pub fn with_reset_channel(
        width: f32,
        height: f32,
        params: SolverParams,
        reset_requests: Receiver<()>,
    ) -> Result<FluidSolver, GridError> {
        let mut solver = FluidSolver::new(width, height, params)?;
        solver.reset_requests = Some(reset_requests);

        Ok(solver)
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }

    #[inline]
    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    /// Discards all particles and rebuilds the grid with a deterministic
    /// placeholder initial condition: every cell fluid at unit pressure,
    /// a pseudo-periodic sinusoidal velocity field, and a regular 4x4
    /// lattice of tracer particles per cell. The ready flag is cleared.
    pub fn reset(&mut self) {
        // Dimensions were validated when the solver was constructed.
        let mut grid = Grid::new(self.width, self.height)
            .expect("solver dimensions were validated at construction");

        self.particles.clear();

        for col in 0..grid.cols() {
            for row in 0..grid.rows() {
                let (x, y) = (col as f32, row as f32);

                let cell = grid.cell_mut(col, row);
                cell.cell_type = CellType::Fluid;
                cell.pressure = 1.0;
                // Arbitrary pseudo-periodic field; sin() keeps the
                // components in [-1, 1] and the constants just decorrelate
                // the samples.
                cell.velocity[Axis::X as usize] = (x * 45.215 + y * 88.154_68).sin() / 2.0;
                cell.velocity[Axis::Y as usize] = (x * 2.548 + y * 121.121_5).sin() / 2.0;

                for i in 0..4 {
                    for j in 0..4 {
                        self.particles.push(Vec2::new(
                            x + 0.2 * (i + 1) as f32,
                            y + 0.2 * (j + 1) as f32,
                        ));
                    }
                }
            }
        }

        self.grid = grid;
        self.frame_ready = false;
    }

    /// Advances one frame of simulation time as a sequence of CFL-bounded
    /// substeps, then marks the frame ready for presentation. Any pending
    /// reset request is applied first, so a reset never tears down a grid
    /// that a substep is indexing.
    pub fn advance_frame(&mut self) {
        self.apply_pending_reset();
        self.advance_substeps(|_, _| {});
        self.frame_ready = true;
    }

    /// Runs the CFL-bounded substep loop for one frame, reporting each
    /// chosen substep size together with the max velocity magnitude it
    /// was bounded by.
    fn advance_substeps(&mut self, mut on_substep: impl FnMut(f32, f32)) {
        let mut remaining = self.params.frame_dt;
        while remaining > 0.0 {
            let max_velocity = self.grid.max_velocity().length();
            let dt = substep_dt(max_velocity, remaining, self.params.cfl_coefficient);

            self.advance_time_step(dt);
            on_substep(dt, max_velocity);
            remaining -= dt;
        }
    }

    /// Hands the current grid and particles to the renderer if a newly
    /// advanced frame is ready, then clears the ready flag. Otherwise a
    /// no-op; the previous frame's visual state persists externally.
    pub fn draw<R: Renderer>(&mut self, renderer: &mut R) {
        if self.frame_ready {
            renderer.draw_grid(&self.grid, &self.particles);
            self.frame_ready = false;
        }
    }

    fn apply_pending_reset(&mut self) {
        let requested = self
            .reset_requests
            .as_ref()
            .is_some_and(|rx| rx.try_recv().is_ok());

        if requested {
            // Collapse any queued requests into a single reset.
            if let Some(rx) = &self.reset_requests {
                while rx.try_recv().is_ok() {}
            }
            self.reset();
        }
    }

    fn advance_time_step(&mut self, dt: f32) {
        self.advect_velocity(dt);
        self.apply_body_force(self.params.gravity * dt);
        self.project_pressure(dt);
        self.enforce_boundaries();
        self.move_particles(dt);
    }

    /// Semi-Lagrangian advection. Every staggered sample traces backward
    /// through the current field for `dt`, samples the old field at the
    /// clamped source position and stages the result. Staged values are
    /// committed only after every sample has been computed, so the whole
    /// sweep reads one consistent snapshot of the old field.
    fn advect_velocity(&mut self, dt: f32) {
        for col in 0..self.grid.cols() {
            for row in 0..self.grid.rows() {
                let x_face = Vec2::new(col as f32, row as f32 + 0.5);
                let y_face = Vec2::new(col as f32 + 0.5, row as f32);

                let x_src = self.clamp_to_domain(x_face - self.grid.velocity(x_face) * dt);
                let y_src = self.clamp_to_domain(y_face - self.grid.velocity(y_face) * dt);

                let staged = [self.grid.velocity(x_src).x, self.grid.velocity(y_src).y];
                self.grid.cell_mut(col, row).staged_velocity = staged;
            }
        }

        for cell in self.grid.iter_mut() {
            cell.commit_staged_velocity();
        }
    }

    /// Adds a uniform velocity to every cell, both components,
    /// unconditionally (no mass weighting).
    fn apply_body_force(&mut self, velocity: Vec2) {
        for cell in self.grid.iter_mut() {
            cell.velocity[Axis::X as usize] += velocity.x;
            cell.velocity[Axis::Y as usize] += velocity.y;
        }
    }

    /// Pressure projection: solves the discrete Poisson system over the
    /// fluid cells, then applies the resulting pressure impulses to the
    /// staggered faces to drive the divergence toward zero.
    fn project_pressure(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }

        self.solve_pressure(dt);
        self.apply_pressure_gradient(dt);
    }

    /// Gauss-Seidel relaxation of the pressure Poisson equation.
    ///
    /// The pressure field is defined so that `dt * pressure` is the face
    /// impulse applied afterwards, so the right-hand side carries a
    /// `1 / dt` factor. Solid cells do not participate; a fluid cell's
    /// equation drops the pressure term of each solid neighbor. The
    /// iteration cap bounds execution time; when the sweep has not
    /// converged by then the best available approximation is used, and
    /// later projections damp the leftover divergence.
    fn solve_pressure(&mut self, dt: f32) {
        let cols = self.grid.cols();
        let rows = self.grid.rows();

        let mut rhs = vec![0.0f32; self.grid.len()];
        for col in 0..cols {
            for row in 0..rows {
                if self.grid.cell(col, row).cell_type == CellType::Fluid {
                    rhs[self.grid.idx(col, row)] = -self.grid.divergence(col, row) / dt;
                }
            }
        }

        for cell in self.grid.iter_mut() {
            cell.pressure = 0.0;
        }

        for _iter in 0..self.params.num_pressure_iters {
            let mut max_delta = 0.0f32;

            for col in 0..cols {
                for row in 0..rows {
                    if self.grid.cell(col, row).cell_type != CellType::Fluid {
                        continue;
                    }

                    let mut sum = 0.0f32;
                    let mut diagonal = 0.0f32;

                    for (dc, dr) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
                        let nc = col as i64 + dc;
                        let nr = row as i64 + dr;
                        if nc < 0 || nr < 0 || nc >= cols as i64 || nr >= rows as i64 {
                            continue;
                        }

                        diagonal += 1.0;
                        let neighbor = self.grid.cell(nc as usize, nr as usize);
                        if neighbor.cell_type == CellType::Fluid {
                            sum += neighbor.pressure;
                        }
                    }

                    if diagonal == 0.0 {
                        continue;
                    }

                    let p = (sum + rhs[self.grid.idx(col, row)]) / diagonal;
                    let cell = self.grid.cell_mut(col, row);
                    max_delta = max_delta.max((p - cell.pressure).abs());
                    cell.pressure = p;
                }
            }

            if max_delta < self.params.pressure_tolerance {
                break;
            }
        }
    }

    /// Applies the pressure impulses to the staggered faces. Each fluid
    /// cell subtracts `dt * pressure` from its own two faces and pushes
    /// the equal and opposite amount onto its forward neighbors' matching
    /// faces, so a uniform pressure field exerts zero net force.
    /// Contributions to a missing neighbor are skipped.
    fn apply_pressure_gradient(&mut self, dt: f32) {
        for i in 0..self.grid.len() {
            let cell = self.grid.cell_at(i);
            if cell.cell_type != CellType::Fluid {
                continue;
            }

            let impulse = dt * cell.pressure;
            let pos_x = cell.neighbor(Neighbor::PosX);
            let pos_y = cell.neighbor(Neighbor::PosY);

            let cell = self.grid.cell_at_mut(i);
            cell.velocity[Axis::X as usize] -= impulse;
            cell.velocity[Axis::Y as usize] -= impulse;

            if let Some(n) = pos_x {
                self.grid.cell_at_mut(n).velocity[Axis::X as usize] += impulse;
            }
            if let Some(n) = pos_y {
                self.grid.cell_at_mut(n).velocity[Axis::Y as usize] += impulse;
            }
        }
    }

    /// Zeroes every wall-normal velocity component on the outer walls and
    /// classifies the outer ring of cells as solid, so no flow crosses
    /// the domain boundary regardless of upstream numerical error.
    fn enforce_boundaries(&mut self) {
        let cols = self.grid.cols();
        let rows = self.grid.rows();

        for col in 0..cols {
            let bottom = self.grid.cell_mut(col, 0);
            bottom.velocity[Axis::Y as usize] = 0.0;
            bottom.cell_type = CellType::Solid;

            let top = self.grid.cell_mut(col, rows - 1);
            top.velocity = [0.0; 2];
            top.cell_type = CellType::Solid;
        }

        for row in 0..rows {
            let left = self.grid.cell_mut(0, row);
            left.velocity[Axis::X as usize] = 0.0;
            left.cell_type = CellType::Solid;

            let right = self.grid.cell_mut(cols - 1, row);
            right.velocity = [0.0; 2];
            right.cell_type = CellType::Solid;
        }
    }

    /// Advances every tracer particle through the interpolated field.
    fn move_particles(&mut self, dt: f32) {
        for p in &mut self.particles {
            *p += self.grid.velocity(*p) * dt;
        }
    }

    fn clamp_to_domain(&self, p: Vec2) -> Vec2 {
        p.clamp(Vec2::ZERO, Vec2::new(self.width, self.height))
    }
}

/// CFL-bounded substep size. A near-zero max velocity clamps to the
/// remaining frame time instead of dividing by zero, and a substep never
/// exceeds the remaining frame time.
fn substep_dt(max_velocity: f32, remaining: f32, cfl_coefficient: f32) -> f32 {
    if max_velocity <= f32::EPSILON {
        remaining
    } else {
        (cfl_coefficient / max_velocity).min(remaining)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    fn solver(width: f32, height: f32) -> FluidSolver {
        FluidSolver::new(width, height, SolverParams::default()).unwrap()
    }

    /// Zeroes the whole field so tests can build exact scenarios.
    fn still(solver: &mut FluidSolver) {
        for cell in solver.grid.iter_mut() {
            cell.velocity = [0.0; 2];
            cell.staged_velocity = [0.0; 2];
            cell.pressure = 0.0;
        }
    }

    struct RecordingRenderer {
        frames: usize,
        particles_seen: usize,
    }

    impl Renderer for RecordingRenderer {
        fn draw_grid(&mut self, _grid: &Grid, particles: &[Vec2]) {
            self.frames += 1;
            self.particles_seen = particles.len();
        }
    }

    #[test]
    fn construction_rejects_bad_dimensions() {
        assert!(FluidSolver::new(0.0, 4.0, SolverParams::default()).is_err());
        assert!(FluidSolver::new(4.0, -2.0, SolverParams::default()).is_err());
    }

    #[test]
    fn reset_seeds_all_fluid_at_unit_pressure() {
        let solver = solver(4.0, 4.0);

        for cell in solver.grid.iter() {
            assert_eq!(cell.cell_type, CellType::Fluid);
            assert_eq!(cell.pressure, 1.0);
        }

        // A 4x4 lattice of tracers per cell.
        assert_eq!(solver.particles.len(), solver.grid.len() * 16);
        assert!(!solver.frame_ready());
    }

    #[test]
    fn reset_is_idempotent() {
        let mut a = solver(5.0, 3.0);
        a.advance_frame();
        a.reset();

        let b = solver(5.0, 3.0);

        for (x, y) in a.grid.iter().zip(b.grid.iter()) {
            assert_eq!(x, y);
        }
        assert_eq!(a.particles, b.particles);
        assert!(!a.frame_ready());
    }

    #[test]
    fn substep_respects_cfl_bound() {
        // Near-zero velocity clamps to the remaining frame time.
        assert_eq!(substep_dt(0.0, 0.5, 2.0), 0.5);
        assert_eq!(substep_dt(f32::EPSILON / 2.0, 0.25, 2.0), 0.25);

        // The CFL bound caps the step when velocity is large.
        assert_eq!(substep_dt(8.0, 0.5, 2.0), 0.25);

        // The remaining frame time caps the step otherwise.
        assert_eq!(substep_dt(1.0, 0.1, 2.0), 0.1);
    }

    #[test]
    fn frame_substeps_sum_to_frame_duration() {
        // A small CFL coefficient forces several substeps per frame on
        // the seeded field.
        let params = SolverParams {
            cfl_coefficient: 0.005,
            ..SolverParams::default()
        };
        let frame_dt = params.frame_dt;
        let cfl = params.cfl_coefficient;
        let mut solver = FluidSolver::new(6.0, 6.0, params).unwrap();

        let mut substeps = Vec::new();
        solver.advance_substeps(|dt, max_velocity| substeps.push((dt, max_velocity)));

        assert!(substeps.len() > 1);

        let total: f32 = substeps.iter().map(|&(dt, _)| dt).sum();
        assert!((total - frame_dt).abs() < 1e-5);

        for &(dt, max_velocity) in &substeps {
            assert!(dt > 0.0);
            assert!(dt <= frame_dt);
            if max_velocity > f32::EPSILON {
                assert!(dt <= cfl / max_velocity * (1.0 + 1e-6));
            }
        }

        // The public entry point runs the same loop and flags the frame.
        solver.advance_frame();
        assert!(solver.frame_ready());
    }

    #[test]
    fn advance_frame_marks_ready_and_draw_clears_it() {
        let mut solver = solver(4.0, 4.0);
        let mut renderer = RecordingRenderer { frames: 0, particles_seen: 0 };

        solver.draw(&mut renderer);
        assert_eq!(renderer.frames, 0);

        solver.advance_frame();
        assert!(solver.frame_ready());

        solver.draw(&mut renderer);
        assert_eq!(renderer.frames, 1);
        assert_eq!(renderer.particles_seen, solver.particles.len());
        assert!(!solver.frame_ready());

        // No new frame, so no redraw.
        solver.draw(&mut renderer);
        assert_eq!(renderer.frames, 1);
    }

    #[test]
    fn body_force_lowers_every_y_velocity() {
        let mut solver = solver(4.0, 4.0);
        still(&mut solver);

        let dt = 1.0 / 30.0;
        solver.advect_velocity(dt);
        let before: Vec<f32> = solver
            .grid
            .iter()
            .map(|c| c.velocity[Axis::Y as usize])
            .collect();

        solver.apply_body_force(Vec2::new(0.0, -0.098) * dt);

        for (cell, y0) in solver.grid.iter().zip(before) {
            assert!(cell.velocity[Axis::Y as usize] < y0);
        }
    }

    #[test]
    fn advection_commits_a_consistent_snapshot() {
        let mut solver = solver(4.0, 4.0);
        still(&mut solver);

        // A still field advects into a still field.
        solver.advect_velocity(0.5);
        for cell in solver.grid.iter() {
            assert_eq!(cell.velocity, [0.0; 2]);
        }

        // A uniform field advects into itself.
        for cell in solver.grid.iter_mut() {
            cell.velocity = [0.25, -0.25];
        }
        solver.advect_velocity(0.1);
        for cell in solver.grid.iter() {
            assert!((cell.velocity[0] - 0.25).abs() < 1e-6);
            assert!((cell.velocity[1] + 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn projection_drives_divergence_below_tolerance() {
        let params = SolverParams {
            num_pressure_iters: 2000,
            pressure_tolerance: 1e-7,
            ..SolverParams::default()
        };
        let mut solver = FluidSolver::new(8.0, 8.0, params).unwrap();
        still(&mut solver);
        solver.enforce_boundaries();

        // An arbitrary divergent interior field.
        for col in 1..solver.grid.cols() - 1 {
            for row in 1..solver.grid.rows() - 1 {
                let cell = solver.grid.cell_mut(col, row);
                cell.velocity[Axis::X as usize] = 0.1 * col as f32 - 0.03 * row as f32;
                cell.velocity[Axis::Y as usize] = 0.07 * row as f32 + 0.02 * col as f32;
            }
        }

        solver.project_pressure(1.0);

        for col in 1..solver.grid.cols() - 1 {
            for row in 1..solver.grid.rows() - 1 {
                if solver.grid.cell(col, row).cell_type != CellType::Fluid {
                    continue;
                }
                assert!(
                    solver.grid.divergence(col, row).abs() < 1e-4,
                    "divergence at ({col}, {row}) = {}",
                    solver.grid.divergence(col, row)
                );
            }
        }
    }

    #[test]
    fn uniform_pressure_exerts_no_interior_force() {
        let mut solver = solver(5.0, 5.0);
        still(&mut solver);

        for cell in solver.grid.iter_mut() {
            cell.pressure = 3.0;
        }
        solver.apply_pressure_gradient(0.1);

        // Interior faces receive equal and opposite contributions.
        for col in 1..solver.grid.cols() - 1 {
            for row in 1..solver.grid.rows() - 1 {
                let v = solver.grid.cell(col, row).velocity;
                assert!(v[0].abs() < 1e-6 && v[1].abs() < 1e-6);
            }
        }
    }

    #[test]
    fn boundaries_are_sealed_and_solid() {
        let mut solver = solver(5.0, 4.0);
        solver.enforce_boundaries();

        let cols = solver.grid.cols();
        let rows = solver.grid.rows();

        for col in 0..cols {
            assert_eq!(solver.grid.cell(col, 0).velocity[Axis::Y as usize], 0.0);
            assert_eq!(solver.grid.cell(col, rows - 1).velocity, [0.0; 2]);
            assert_eq!(solver.grid.cell(col, 0).cell_type, CellType::Solid);
            assert_eq!(solver.grid.cell(col, rows - 1).cell_type, CellType::Solid);
        }

        for row in 0..rows {
            assert_eq!(solver.grid.cell(0, row).velocity[Axis::X as usize], 0.0);
            assert_eq!(solver.grid.cell(cols - 1, row).velocity, [0.0; 2]);
            assert_eq!(solver.grid.cell(0, row).cell_type, CellType::Solid);
            assert_eq!(solver.grid.cell(cols - 1, row).cell_type, CellType::Solid);
        }

        // Interior cells keep their classification and velocity.
        assert_eq!(solver.grid.cell(2, 2).cell_type, CellType::Fluid);
    }

    #[test]
    fn particle_at_rest_in_still_field_stays_put() {
        let params = SolverParams {
            gravity: Vec2::ZERO,
            ..SolverParams::default()
        };
        let mut solver = FluidSolver::new(4.0, 4.0, params).unwrap();
        still(&mut solver);

        solver.particles.clear();
        solver.particles.push(Vec2::new(1.5, 1.5));

        solver.advance_frame();

        assert_eq!(solver.particles[0], Vec2::new(1.5, 1.5));
    }

    #[test]
    fn particles_follow_the_interpolated_field() {
        let mut solver = solver(4.0, 4.0);
        still(&mut solver);

        for cell in solver.grid.iter_mut() {
            cell.velocity = [1.0, 0.0];
        }

        solver.particles.clear();
        solver.particles.push(Vec2::new(1.5, 1.5));
        solver.move_particles(0.25);

        assert!((solver.particles[0].x - 1.75).abs() < 1e-6);
        assert_eq!(solver.particles[0].y, 1.5);
    }

    #[test]
    fn pending_reset_is_applied_between_frames() {
        let (tx, rx) = mpsc::channel();
        let mut solver =
            FluidSolver::with_reset_channel(4.0, 4.0, SolverParams::default(), rx).unwrap();

        solver.particles.clear();
        tx.send(()).unwrap();
        tx.send(()).unwrap();

        solver.advance_frame();

        // The reset reseeded the particle lattice before the frame ran.
        assert_eq!(solver.particles.len(), solver.grid.len() * 16);
    }

    #[test]
    fn frame_advances_without_a_reset_channel() {
        let mut solver = solver(4.0, 4.0);
        solver.particles.clear();

        solver.advance_frame();

        assert!(solver.frame_ready());
        assert!(solver.particles.is_empty());
    }
}
