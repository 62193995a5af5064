/// Standalone river-avulsion driver.
///
/// Runs rivers over a sediment cube (or, with `--lite`, a single bounded
/// random walk) and prints per-tick river angles or the final water-depth
/// grid to stdout.  Diagnostics go to stderr.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use basin_core::avulsion::lite_walk;
use basin_core::hydro::HydroRecord;
use basin_core::output::{write_angle_line, write_angle_series, write_depth_grid, write_snapshot};
use basin_core::simulation::default_shelf;
use basin_core::{
    Bathymetry, DepositionPolicy, KeyFile, RiverConfig, RunControl, SedimentTable, Simulation,
    SimulationConfig,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutType {
    /// One line of river angles (degrees) per tick.
    Angle,
    /// Final water-depth grid, one row per along-shore column.
    Depth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Deposition {
    /// Every river deposits `--deposit-thickness` per tick.
    Fixed,
    /// `--deposit-thickness` per tick shared between rivers at random.
    RandomSplit,
    /// Load from each river's sediment flux over the time step.
    Hydrology,
}

#[derive(Parser, Debug)]
#[command(name = "avulsion", about = "Bounded random-walk river avulsion over a sediment cube")]
struct Args {
    /// Number of ticks to run
    #[arg(long, default_value = "100")]
    n_times: usize,

    /// Per-tick standard deviation of the angle walk (degrees)
    #[arg(long, default_value = "0.75")]
    std_dev: f64,

    /// Minimum river angle (degrees)
    #[arg(long, default_value = "60")]
    min: f64,

    /// Maximum river angle (degrees)
    #[arg(long, default_value = "120")]
    max: f64,

    /// Starting angle (degrees); mid-range when omitted
    #[arg(long)]
    start: Option<f64>,

    /// Seed for the random number generator
    #[arg(long, default_value = "1945")]
    seed: u64,

    /// Log level 0..=4 (error, warn, info, debug, trace); RUST_LOG wins when set
    #[arg(long, default_value = "1")]
    verbose: u8,

    /// Run a single scalar random walk instead of the cube model
    #[arg(long)]
    lite: bool,

    /// Columns along shore (ignored with --bathy-file)
    #[arg(long)]
    nx: Option<usize>,

    /// Columns cross shore (ignored with --bathy-file)
    #[arg(long)]
    ny: Option<usize>,

    /// Rivers to create from the command-line settings
    #[arg(long, default_value = "1")]
    n_rivers: usize,

    /// Key-file with `[ river ]` groups and an optional `[ simulation ]` group
    #[arg(long)]
    river_file: Option<PathBuf>,

    /// What to print on stdout
    #[arg(long, value_enum, default_value = "angle")]
    out_type: OutType,

    /// `;`-delimited bathymetry grid; a sloping shelf is used when omitted
    #[arg(long)]
    bathy_file: Option<PathBuf>,

    /// Key-file with one `[ sediment ]` group per grain type
    #[arg(long)]
    sed_file: Option<PathBuf>,

    /// Write a JSON snapshot of the final cube here
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Deposition policy; overrides the river file's `[ simulation ]` group
    #[arg(long, value_enum)]
    deposition: Option<Deposition>,

    /// Thickness per tick (m) for the fixed and random-split policies
    #[arg(long, default_value = "1.0")]
    deposit_thickness: f64,

    /// Stop cleanly after the current tick once this file exists
    #[arg(long)]
    stop_file: Option<PathBuf>,
}

impl Args {
    fn deposition_policy(&self) -> Option<DepositionPolicy> {
        let thickness = self.deposit_thickness;
        self.deposition.map(|d| match d {
            Deposition::Fixed => DepositionPolicy::Fixed { thickness },
            Deposition::RandomSplit => DepositionPolicy::RandomSplit { thickness },
            Deposition::Hydrology => DepositionPolicy::Hydrology,
        })
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

// ── Setup ────────────────────────────────────────────────────────────────────

/// Simulation settings plus the rivers to attach.
fn load_rivers(args: &Args) -> Result<(SimulationConfig, Vec<RiverConfig>)> {
    if let Some(path) = &args.river_file {
        let kf = KeyFile::from_file(path)
            .with_context(|| format!("reading river file {}", path.display()))?;
        let cfg = SimulationConfig::from_key_file(&kf)
            .with_context(|| format!("simulation settings in {}", path.display()))?;
        let rivers = RiverConfig::all_from_key_file(&kf)
            .with_context(|| format!("river settings in {}", path.display()))?;
        return Ok((cfg, rivers));
    }

    let mut cfg = SimulationConfig::default();
    if let Some(nx) = args.nx {
        cfg.nx = nx;
    }
    if let Some(ny) = args.ny {
        cfg.ny = ny;
    }
    let rivers = (0..args.n_rivers)
        .map(|k| RiverConfig {
            std_dev: args.std_dev.to_radians(),
            angle_min: args.min.to_radians(),
            angle_max: args.max.to_radians(),
            angle_start: args.start.map(f64::to_radians),
            hinge: ((k + 1) * cfg.nx / (args.n_rivers + 1), 0),
            seed: args.seed.wrapping_add(k as u64),
            can_branch: false,
            hydro: HydroRecord::default(),
        })
        .collect();
    Ok((cfg, rivers))
}

fn run_lite(args: &Args, out: &mut impl Write) -> Result<()> {
    if args.min > args.max {
        bail!("--min ({}) must not exceed --max ({})", args.min, args.max);
    }
    let start = args.start.unwrap_or(0.5 * (args.min + args.max));
    let angles = lite_walk(
        args.seed,
        start.to_radians(),
        args.std_dev.to_radians(),
        args.min.to_radians(),
        args.max.to_radians(),
        args.n_times,
    );
    write_angle_series(out, &angles)?;
    Ok(())
}

fn run_cube(args: &Args, out: &mut impl Write) -> Result<()> {
    let (mut cfg, rivers) = load_rivers(args)?;
    if args.deposit_thickness < 0.0 {
        bail!("--deposit-thickness must not be negative");
    }
    if let Some(policy) = args.deposition_policy() {
        cfg.deposition = policy;
    }

    let bathy = match &args.bathy_file {
        Some(path) => Bathymetry::from_file(path)
            .with_context(|| format!("reading bathymetry {}", path.display()))?,
        None => default_shelf(&cfg),
    };
    cfg.nx = bathy.nx;
    cfg.ny = bathy.ny;

    let table = match &args.sed_file {
        Some(path) => {
            let kf = KeyFile::from_file(path)
                .with_context(|| format!("reading sediment file {}", path.display()))?;
            SedimentTable::from_key_file(&kf)
                .with_context(|| format!("sediment types in {}", path.display()))?
        }
        None => SedimentTable::default(),
    };

    let mut sim = Simulation::new(cfg, table, &bathy)?;
    for (k, river) in rivers.iter().enumerate() {
        sim.add_river(river).with_context(|| format!("attaching river {k}"))?;
    }
    tracing::info!(rivers = sim.cube.n_rivers(), ticks = args.n_times, "run.start");

    let control = RunControl::new();
    let out_type = args.out_type;
    let stop_file = args.stop_file.as_deref();
    let ran = sim.run(args.n_times, &control, |sim, _| {
        if out_type == OutType::Angle {
            write_angle_line(&mut *out, &sim.cube)?;
        }
        if stop_file.is_some_and(|p| p.exists()) {
            tracing::info!(tick = sim.ticks(), "stop file found");
            control.request_stop();
        }
        Ok(())
    })?;

    if out_type == OutType::Depth {
        write_depth_grid(out, &sim.cube)?;
    }
    if let Some(path) = &args.snapshot {
        let file = File::create(path)
            .with_context(|| format!("creating snapshot {}", path.display()))?;
        write_snapshot(BufWriter::new(file), &sim.cube)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
    }
    tracing::info!(ticks = ran, rivers = sim.cube.n_rivers(), "run.done");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if args.lite {
        run_lite(&args, &mut out)?;
    } else {
        run_cube(&args, &mut out)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn deposition_flag_selects_policy() {
        let args = Args::parse_from([
            "avulsion",
            "--deposition",
            "random-split",
            "--deposit-thickness",
            "2.5",
        ]);
        assert_eq!(
            args.deposition_policy(),
            Some(DepositionPolicy::RandomSplit { thickness: 2.5 })
        );
        let args = Args::parse_from(["avulsion", "--deposition", "hydrology"]);
        assert_eq!(args.deposition_policy(), Some(DepositionPolicy::Hydrology));
        assert_eq!(Args::parse_from(["avulsion"]).deposition_policy(), None);
    }

    #[test]
    fn stop_file_ends_the_run_early() {
        let dir = std::env::temp_dir().join(format!("avulsion-stop-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let stop = dir.join("stop");
        std::fs::write(&stop, b"").unwrap();
        let mut argv: Vec<OsString> = ["avulsion", "--n-times", "20", "--nx", "10", "--ny", "9"]
            .into_iter()
            .map(OsString::from)
            .collect();
        argv.push("--stop-file".into());
        argv.push(stop.clone().into_os_string());
        let args = Args::parse_from(argv);
        let mut out = Vec::new();
        run_cube(&args, &mut out).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        let lines = String::from_utf8(out).unwrap().lines().count();
        assert_eq!(lines, 1, "one tick runs before the stop file is seen");
    }
}
