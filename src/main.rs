use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use voxel_particle_core::settings::SimulationSettings;
use voxel_particle_core::{init_logger, run_with, HostOptions};

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON settings file; written back when `s` is pressed
    #[arg(long, short = 's')]
    settings: Option<PathBuf>,

    /// Number of particles
    #[arg(long, short = 'n')]
    particles: Option<u32>,

    /// Voxel resolution along the longest axis at level 0
    #[arg(long)]
    resolution: Option<u32>,

    /// Level of detail; each level halves the resolution
    #[arg(long)]
    level: Option<u32>,

    /// Resample the mesh every N frames
    #[arg(long)]
    sample_interval: Option<u32>,

    /// Trigger grid transitions and flow bursts on timers
    #[arg(long)]
    demo: bool,
}

impl Args {
    fn apply(&self, settings: &mut SimulationSettings) {
        if let Some(count) = self.particles {
            settings.particle.count = count;
        }
        if let Some(resolution) = self.resolution {
            settings.voxel.base_resolution = resolution;
        }
        if let Some(level) = self.level {
            settings.voxel.level = level;
        }
        if let Some(interval) = self.sample_interval {
            settings.voxel.sample_interval = interval;
        }
    }
}


fn main() -> ExitCode {
    let args = Args::parse();
    init_logger();

    let mut settings = match &args.settings {
        Some(path) => match SimulationSettings::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                log::error!("{}: {}", path.display(), err);
                return ExitCode::FAILURE;
            }
        },
        None => SimulationSettings::default(),
    };
    args.apply(&mut settings);

    run_with(HostOptions {
        settings: settings.sanitized(),
        settings_path: args.settings,
        demo: args.demo,
    });
    ExitCode::SUCCESS
}
