/// Axis of a staggered velocity component.
///
/// In a MAC grid each velocity component is sampled normal to a different
/// face of the containing cell, so cells store the components individually
/// instead of as a single `Vec2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Sampled at the cell's negative-X face.
    X = 0,
    /// Sampled at the cell's negative-Y face.
    Y = 1,
}

/// Forward neighbor slots of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Neighbor {
    PosX = 0,
    PosY = 1,
    PosXy = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CellType {
    #[default]
    Fluid,
    Solid,
}

/// A single sample point of the staggered grid.
#[derive(Debug, Default, PartialEq)]
pub struct Cell {
    /// Pressure, sampled at the center of this cell.
    pub pressure: f32,
    /// Velocity components, sampled at the negative-X and negative-Y faces.
    pub velocity: [f32; 2],
    /// Write buffer for velocity sweeps that must read a consistent
    /// snapshot of the old field while producing the new one.
    pub staged_velocity: [f32; 2],
    /// Whether the cell holds fluid or is part of a solid wall.
    pub cell_type: CellType,
    /// Flat indices of the +X, +Y and +X+Y neighbors in the owning grid's
    /// backing storage, `None` past the grid edge. Set once by the grid at
    /// construction; never mutated by the cell itself.
    pub neighbors: [Option<usize>; 3],
}

impl Clone for Cell {
    /// Duplicates the value fields only. Neighbor links are specific to
    /// the storage the cell sits in and must be rebuilt by the owning
    /// grid.
    fn clone(&self) -> Self {
        Cell {
            pressure: self.pressure,
            velocity: self.velocity,
            staged_velocity: self.staged_velocity,
            cell_type: self.cell_type,
            neighbors: [None; 3],
        }
    }
}

impl Cell {
    #[inline]
    pub fn neighbor(&self, n: Neighbor) -> Option<usize> {
        self.neighbors[n as usize]
    }

    /// True only if none of the forward neighbor links fall outside the
    /// grid, letting bulk sweeps skip edge-of-grid special cases.
    #[inline]
    pub fn all_neighbors(&self) -> bool {
        self.neighbors.iter().all(|n| n.is_some())
    }

    /// Realizes the staged velocity as the cell's current velocity. The
    /// staged values themselves are left untouched.
    pub fn commit_staged_velocity(&mut self) {
        self.velocity = self.staged_velocity;
    }
}
