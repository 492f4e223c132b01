use clap::Parser;

mod draw;
mod run;

#[derive(Parser)]
#[command(about = "2D MAC-grid fluid simulation with tracer particles")]
struct Args {
    /// Width of the simulation domain, in cells.
    #[arg(long, default_value_t = 48.0)]
    width: f32,

    /// Height of the simulation domain, in cells.
    #[arg(long, default_value_t = 24.0)]
    height: f32,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Skip the terminal rendering and only show progress.
    #[arg(long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(err) = run::run(args.width, args.height, args.frames, args.quiet) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
