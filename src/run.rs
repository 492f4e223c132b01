use indicatif::{ProgressBar, ProgressIterator, ProgressStyle};
use riffle_solver::{FluidSolver, GridError, SolverParams};

use crate::draw::AsciiRenderer;

pub fn run(width: f32, height: f32, frames: u64, quiet: bool) -> Result<(), GridError> {
    let mut solver = FluidSolver::new(width, height, SolverParams::default())?;

    if quiet {
        let bar_template =
            "Running Simulation {spinner:.green} [{elapsed}] [{bar:50.white/white}] {pos}/{len} ({eta})";
        let style = ProgressStyle::with_template(bar_template)
            .expect("progress template is well formed")
            .progress_chars("=> ")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        let progress = ProgressBar::new(frames).with_style(style);

        for _frame in (0..frames).progress_with(progress) {
            solver.advance_frame();
        }
    } else {
        let mut renderer = AsciiRenderer::new();

        for _frame in 0..frames {
            solver.advance_frame();
            solver.draw(&mut renderer);
        }
    }

    Ok(())
}
