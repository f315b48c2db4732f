// Command-line configuration
// Defaults reproduce the reference look of each demo; every knob is optional.

use clap::{Parser, ValueEnum};

use crate::engine::Demo;

/// Where the flocking kernel's velocity and position passes execute.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlockBackend {
    /// Compute shaders, one invocation per agent.
    Gpu,
    /// Plain loops over the double-buffered fields, positions uploaded each frame.
    Cpu,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "procgen_gallery", version, about = "Real-time procedural visualizations: life, boids, fractal")]
pub struct Config {
    /// Which engine to mount
    #[arg(value_enum, default_value_t = Demo::Fractal)]
    pub demo: Demo,

    /// Initial window width in logical pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Initial window height in logical pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Cellular automaton generation interval in milliseconds
    #[arg(long, default_value_t = 33)]
    pub tick_ms: u64,

    /// Radius (in cells) of the randomly seeded disc at the grid center
    #[arg(long, default_value_t = 150)]
    pub seed_radius: i32,

    /// Radius (in cells) of the paint brush
    #[arg(long, default_value_t = 10)]
    pub brush_radius: i32,

    /// Screen pixels per grid row; sets the grid resolution at mount
    #[arg(long, default_value_t = 3.5)]
    pub cell_px: f32,

    /// Side of the square agent layout; the flock has flock_width² agents
    #[arg(long, default_value_t = 16, value_parser = clap::value_parser!(u32).range(2..=16))]
    pub flock_width: u32,

    #[arg(long, value_enum, default_value_t = FlockBackend::Gpu)]
    pub flock_backend: FlockBackend,

    /// Escape-time iteration cap
    #[arg(long, default_value_t = 1000)]
    pub max_iterations: u32,

    /// RNG seed for reproducible runs (entropy when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Show the stats overlay at start (F3 toggles)
    #[arg(long)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            demo: Demo::Fractal,
            width: 1280,
            height: 720,
            tick_ms: 33,
            seed_radius: 150,
            brush_radius: 10,
            cell_px: 3.5,
            flock_width: 16,
            flock_backend: FlockBackend::Gpu,
            max_iterations: 1000,
            seed: None,
            debug: false,
        }
    }
}

impl Config {
    pub fn rng(&self) -> rand::rngs::StdRng {
        use rand::SeedableRng;
        match self.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_parsed_defaults() {
        let parsed = Config::parse_from(["procgen_gallery"]);
        let default = Config::default();
        assert_eq!(parsed.demo, default.demo);
        assert_eq!(parsed.tick_ms, default.tick_ms);
        assert_eq!(parsed.flock_width, default.flock_width);
        assert_eq!(parsed.flock_backend, default.flock_backend);
        assert_eq!(parsed.max_iterations, default.max_iterations);
    }

    #[test]
    fn parses_demo_and_backend() {
        let parsed = Config::parse_from(["procgen_gallery", "boids", "--flock-backend", "cpu", "--seed", "7"]);
        assert_eq!(parsed.demo, Demo::Boids);
        assert_eq!(parsed.flock_backend, FlockBackend::Cpu);
        assert_eq!(parsed.seed, Some(7));
    }

    #[test]
    fn rejects_oversized_flock() {
        assert!(Config::try_parse_from(["procgen_gallery", "--flock-width", "17"]).is_err());
    }
}
