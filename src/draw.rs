use glam::Vec2;
use riffle_solver::{Grid, Renderer};

const SHADES: &[u8] = b" .:-=+*#%@";

/// Terminal view of the simulation: one glyph per cell, shaded by how
/// many tracer particles currently sit inside it.
pub struct AsciiRenderer {
    frame: usize,
}

impl AsciiRenderer {
    pub fn new() -> AsciiRenderer {
        AsciiRenderer { frame: 0 }
    }
}

impl Default for AsciiRenderer {
    fn default() -> Self {
        AsciiRenderer::new()
    }
}

impl Renderer for AsciiRenderer {
    fn draw_grid(&mut self, grid: &Grid, particles: &[Vec2]) {
        let mut counts = vec![0usize; grid.len()];
        for p in particles {
            let col = (p.x.floor().max(0.0) as usize).min(grid.cols() - 1);
            let row = (p.y.floor().max(0.0) as usize).min(grid.rows() - 1);
            counts[grid.idx(col, row)] += 1;
        }

        let mut out = String::with_capacity((grid.cols() + 1) * grid.rows());
        for row in (0..grid.rows()).rev() {
            for col in 0..grid.cols() {
                let shade = counts[grid.idx(col, row)].min(SHADES.len() - 1);
                out.push(SHADES[shade] as char);
            }
            out.push('\n');
        }

        println!("frame {}", self.frame);
        print!("{out}");
        self.frame += 1;
    }
}
