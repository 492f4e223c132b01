use glam::Vec2;

pub mod cell;
pub mod grid;
pub mod solver;

pub use cell::{Axis, Cell, CellType, Neighbor};
pub use grid::{Grid, GridError};
pub use solver::{FluidSolver, SolverParams};

/// Presentation collaborator. Receives read-only access to the finished
/// frame's grid and tracer particles; it must not feed anything back
/// into the solver.
pub trait Renderer {
    fn draw_grid(&mut self, grid: &Grid, particles: &[Vec2]);
}
