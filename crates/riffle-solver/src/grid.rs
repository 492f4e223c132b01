use glam::Vec2;
use ndarray::Array2;
use thiserror::Error;

use crate::cell::{Axis, Cell, Neighbor};

#[derive(Debug, Error)]
pub enum GridError {
    #[error("invalid grid dimensions {width}x{height}: both must be positive and finite")]
    InvalidDimension { width: f32, height: f32 },
}

/// A 2D MAC grid of [`Cell`]s.
///
/// Pressure lives at cell centers; each velocity component lives on the
/// cell's negative face along its axis, so the X component of cell
/// `(col, row)` is sampled at `(col, row + 0.5)` and the Y component at
/// `(col + 0.5, row)`. Cell spacing is one unit in both directions.
#[derive(Debug)]
pub struct Grid {
    /// Size of the simulation domain, in cell units.
    width: f32,
    height: f32,
    cols: usize,
    rows: usize,
    /// Cells addressed by `(col, row)`. The row index varies fastest in
    /// memory, so the flat index space the neighbor links point into is
    /// `col * rows + row`.
    cells: Array2<Cell>,
}

impl Grid {
    pub fn new(width: f32, height: f32) -> Result<Grid, GridError> {
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(GridError::InvalidDimension { width, height });
        }

        let cols = width.ceil() as usize;
        let rows = height.ceil() as usize;

        let mut grid = Grid {
            width,
            height,
            cols,
            rows,
            cells: Array2::default((cols, rows)),
        };
        grid.link_neighbors();

        Ok(grid)
    }

    /// Wires every cell's forward neighbor links. Links exiting the grid
    /// stay `None`.
    fn link_neighbors(&mut self) {
        for col in 0..self.cols {
            for row in 0..self.rows {
                let pos_x = (col + 1 < self.cols).then(|| self.idx(col + 1, row));
                let pos_y = (row + 1 < self.rows).then(|| self.idx(col, row + 1));
                let pos_xy = (col + 1 < self.cols && row + 1 < self.rows)
                    .then(|| self.idx(col + 1, row + 1));

                self.cells[(col, row)].neighbors = [pos_x, pos_y, pos_xy];
            }
        }
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
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of cells in the grid.
    #[inline]
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    /// Flat index of cell `(col, row)`; the index space the neighbor
    /// links live in.
    #[inline]
    pub fn idx(&self, col: usize, row: usize) -> usize {
        col * self.rows + row
    }

    #[inline]
    pub fn cell(&self, col: usize, row: usize) -> &Cell {
        &self.cells[(col, row)]
    }

    #[inline]
    pub fn cell_mut(&mut self, col: usize, row: usize) -> &mut Cell {
        &mut self.cells[(col, row)]
    }

    #[inline]
    pub fn cell_at(&self, i: usize) -> &Cell {
        &self.cells[(i / self.rows, i % self.rows)]
    }

    #[inline]
    pub fn cell_at_mut(&mut self, i: usize) -> &mut Cell {
        &mut self.cells[(i / self.rows, i % self.rows)]
    }

    /// Cells in flat index order.
    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Cells in flat index order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut()
    }

    /// Bilinearly interpolated velocity at an arbitrary position.
    ///
    /// The position is clamped into the domain first, so any finite input
    /// is safe; there is no extrapolation past the grid bounds. Each
    /// component is interpolated from its own four surrounding staggered
    /// samples and is exact at the sample points.
    pub fn velocity(&self, position: Vec2) -> Vec2 {
        let p = position.clamp(Vec2::ZERO, Vec2::new(self.width, self.height));

        Vec2::new(
            self.sample_component(p, Axis::X),
            self.sample_component(p, Axis::Y),
        )
    }

    fn sample_component(&self, p: Vec2, axis: Axis) -> f32 {
        // Offset of this component's sample lattice from the cell origin.
        let (ox, oy) = match axis {
            Axis::X => (0.0, 0.5),
            Axis::Y => (0.5, 0.0),
        };

        let fx = p.x - ox;
        let fy = p.y - oy;

        let c0 = (fx.floor().max(0.0) as usize).min(self.cols - 1);
        let r0 = (fy.floor().max(0.0) as usize).min(self.rows - 1);
        let c1 = (c0 + 1).min(self.cols - 1);
        let r1 = (r0 + 1).min(self.rows - 1);

        let tx = (fx - c0 as f32).clamp(0.0, 1.0);
        let ty = (fy - r0 as f32).clamp(0.0, 1.0);

        let k = axis as usize;
        let v00 = self.cells[(c0, r0)].velocity[k];
        let v10 = self.cells[(c1, r0)].velocity[k];
        let v01 = self.cells[(c0, r1)].velocity[k];
        let v11 = self.cells[(c1, r1)].velocity[k];

        (v00 * (1.0 - tx) + v10 * tx) * (1.0 - ty) + (v01 * (1.0 - tx) + v11 * tx) * ty
    }

    /// Discrete divergence at a cell: net outflow across its faces, with
    /// unit cell spacing. A face whose forward neighbor is missing
    /// contributes nothing (no flow through the outer walls).
    pub fn divergence(&self, col: usize, row: usize) -> f32 {
        let cell = self.cell(col, row);
        let mut div = 0.0;

        if let Some(i) = cell.neighbor(Neighbor::PosX) {
            div += self.cell_at(i).velocity[Axis::X as usize] - cell.velocity[Axis::X as usize];
        }
        if let Some(i) = cell.neighbor(Neighbor::PosY) {
            div += self.cell_at(i).velocity[Axis::Y as usize] - cell.velocity[Axis::Y as usize];
        }

        div
    }

    /// The stored cell velocity of greatest magnitude, used to bound the
    /// simulation time step. Zero when every cell is at rest; callers
    /// must guard against dividing by a zero magnitude.
    pub fn max_velocity(&self) -> Vec2 {
        let mut max = Vec2::ZERO;

        for cell in self.cells.iter() {
            let v = Vec2::new(cell.velocity[0], cell.velocity[1]);
            if v.length_squared() > max.length_squared() {
                max = v;
            }
        }

        max
    }
}

impl Clone for Grid {
    /// Cell clones drop their neighbor links, so a cloned grid relinks
    /// them against its own storage.
    fn clone(&self) -> Self {
        let mut grid = Grid {
            width: self.width,
            height: self.height,
            cols: self.cols,
            rows: self.rows,
            cells: self.cells.clone(),
        };
        grid.link_neighbors();
        grid
    }
}
