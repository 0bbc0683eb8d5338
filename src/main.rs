use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use log::{info, warn};
use tarmac::{
    PlaybackSpeed, RateLimiter, ReplayConfig, ReplayEngine, TarmacError,
    geometry::speed_gradient,
    load_circuit, load_session_archive,
    replay::FrameView,
    telemetry::Roster,
};
use uom::si::length::kilometer;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a recorded session back in real time
    Replay {
        #[arg(short, long)]
        archive: PathBuf,

        #[arg(short, long)]
        circuit: PathBuf,

        /// Feature to use when the circuit file holds several layouts
        #[arg(short, long)]
        name: Option<String>,

        /// 1, 2, 5, 10 or 30
        #[arg(short, long)]
        speed: Option<PlaybackSpeed>,

        /// Start at this fraction of the session
        #[arg(short, long)]
        from: Option<f64>,

        /// Minimum time between two printed frames
        #[arg(long, default_value_t = 1000)]
        print_every_ms: u64,
    },
    /// Print the frame at one point of the session as JSON
    Snapshot {
        #[arg(short, long)]
        archive: PathBuf,

        #[arg(short, long)]
        circuit: PathBuf,

        #[arg(short, long)]
        name: Option<String>,

        /// Fraction of the session, 0 to 1
        #[arg(long, default_value_t = 1.0)]
        at: f64,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show circuit statistics, sectors and the curvature gradient
    Inspect {
        #[arg(short, long)]
        circuit: PathBuf,

        #[arg(short, long)]
        name: Option<String>,

        /// Sample the stretch between two lap fractions, e.g. `--zone 0.9 0.1`
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        zone: Option<Vec<f64>>,
    },
}

fn load_config() -> ReplayConfig {
    match ReplayConfig::from_local_file() {
        Ok(Some(config)) => config,
        Ok(None) => {
            let config = ReplayConfig::default();
            // leave a file behind for the user to edit
            if let Err(e) = config.save() {
                warn!("Could not write default config: {}", e);
            }
            config
        }
        Err(e) => {
            warn!("Ignoring config file: {}", e);
            ReplayConfig::default()
        }
    }
}

fn load_engine(
    archive: &Path,
    circuit: &Path,
    name: Option<&str>,
    config: &ReplayConfig,
) -> Result<ReplayEngine, TarmacError> {
    let archive = load_session_archive(archive)?;
    let circuit = load_circuit(circuit, name)?;
    Ok(ReplayEngine::new(archive, circuit.polyline).with_gap_top_k(config.gap_series_top_k))
}

fn validate_fraction(field: &str, value: f64) -> Result<f64, TarmacError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(TarmacError::InvalidUserInput {
            field: field.to_string(),
            reason: format!("{value} is not between 0 and 1"),
        })
    }
}

fn print_frame(view: &FrameView, roster: &Roster) {
    let code = |driver: &u32| {
        roster
            .get(driver)
            .map(|d| d.name_acronym.clone())
            .unwrap_or_else(|| driver.to_string())
    };
    let mut order: Vec<(&u32, &u32)> = view.ranks.iter().collect();
    order.sort_by_key(|(driver, position)| (**position, **driver));
    let running_order = order
        .iter()
        .take(5)
        .map(|(driver, _)| {
            let driver = *driver;
            match view.position_deltas.get(driver).copied().unwrap_or(0) {
                0 => code(driver),
                g if g > 0 => format!("{}(+{g})", code(driver)),
                g => format!("{}({g})", code(driver)),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let flag = view
        .race_control
        .as_ref()
        .and_then(|e| e.flag.as_deref())
        .unwrap_or("-");
    println!(
        "{:>6.1}% lap {:>3} {:<7} {}",
        view.progress * 100.0,
        view.aggregates.lap.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string()),
        flag,
        running_order
    );
}

fn replay(
    archive: &Path,
    circuit: &Path,
    name: Option<&str>,
    speed: Option<PlaybackSpeed>,
    from: Option<f64>,
    print_every: Duration,
) -> Result<(), TarmacError> {
    let config = load_config();
    let mut engine = load_engine(archive, circuit, name, &config)?;
    let roster = engine.archive().roster();

    let controller = engine.controller_mut();
    controller.set_speed(speed.unwrap_or(config.default_speed));
    controller.toggle_replay();
    if let Some(from) = from {
        controller.scrub(validate_fraction("from", from)?);
    }
    controller.play();

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Exiting...");
        handler_flag.store(false, Ordering::SeqCst);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| TarmacError::RuntimeError { source: e })?;

    runtime.block_on(async {
        let mut frames = tokio::time::interval(Duration::from_millis(config.frame_interval_ms.max(1)));
        let mut printer = RateLimiter::new(print_every);
        loop {
            frames.tick().await;
            if !running.load(Ordering::SeqCst) {
                info!("Replay interrupted");
                break;
            }
            let now = Instant::now();
            let view = engine.frame(now);
            let finished = !engine.controller().is_ticking();
            if printer.acquire(now) || finished {
                print_frame(&view, &roster);
            }
            if finished {
                info!("Replay finished in mode {:?}", view.mode);
                break;
            }
        }
    });
    Ok(())
}

fn snapshot(
    archive: &Path,
    circuit: &Path,
    name: Option<&str>,
    at: f64,
    output: Option<&Path>,
) -> Result<(), TarmacError> {
    let config = load_config();
    let mut engine = load_engine(archive, circuit, name, &config)?;
    engine.controller_mut().toggle_replay();
    engine.controller_mut().scrub(validate_fraction("at", at)?);
    let view = engine.view();

    match output {
        Some(path) => {
            let file = File::create(path).map_err(|e| TarmacError::SnapshotWriteError { source: e })?;
            serde_json::to_writer_pretty(file, &view)
                .map_err(|e| TarmacError::SnapshotSerializeError { source: e })?;
            info!("Wrote snapshot at {:.1}% to {:?}", view.progress * 100.0, path);
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &view)
                .map_err(|e| TarmacError::SnapshotSerializeError { source: e })?;
            writeln!(stdout).map_err(|e| TarmacError::SnapshotWriteError { source: e })?;
        }
    }
    Ok(())
}

fn inspect(circuit: &Path, name: Option<&str>, zone: Option<&[f64]>) -> Result<(), TarmacError> {
    let config = load_config();
    let circuit = load_circuit(circuit, name)?;
    let stats = circuit.stats();
    let polyline = &circuit.polyline;

    println!("{}", circuit.name);
    println!("  length      {:.3} km", stats.length.get::<kilometer>());
    println!("  points      {}", stats.coordinate_count);
    println!("  centroid    {:.5}, {:.5}", stats.centroid.lng, stats.centroid.lat);
    println!(
        "  bbox        {:.5}, {:.5} .. {:.5}, {:.5}",
        stats.bbox[0], stats.bbox[1], stats.bbox[2], stats.bbox[3]
    );
    if polyline.is_degenerate() {
        warn!("{} has no length, every car will sit on one point", circuit.name);
    }
    let [s1, s2] = polyline.sector_boundaries();
    let [a, b, c] = polyline.sectors().map(|sector| sector.len());
    println!("  sectors     0 | {:.3} | {:.3} | 1  ({} / {} / {} points)", s1, s2, a, b, c);

    let stops = speed_gradient(polyline.coords(), polyline.cumulative_distances(), &config.gradient);
    let slowest = stops.iter().max_by(|a, b| a.intensity.total_cmp(&b.intensity));
    println!("  gradient    {} stops", stops.len());
    if let Some(stop) = slowest {
        println!("  tightest    {:.3} ({})", stop.offset, stop.color.to_hex());
    }

    if let Some([start, end]) = zone {
        let start = validate_fraction("zone", *start)?;
        let end = validate_fraction("zone", *end)?;
        let points = polyline.extract_sub_line(start, end, config.sub_line_samples);
        println!("  zone        {} points from {:.3} to {:.3}", points.len(), start, end);
        for point in points {
            println!("    {:.6}, {:.6}", point.lng, point.lat);
        }
    }
    Ok(())
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    let result = match &cli.command {
        Commands::Replay {
            archive,
            circuit,
            name,
            speed,
            from,
            print_every_ms,
        } => replay(
            archive,
            circuit,
            name.as_deref(),
            *speed,
            *from,
            Duration::from_millis(*print_every_ms),
        ),
        Commands::Snapshot {
            archive,
            circuit,
            name,
            at,
            output,
        } => snapshot(archive, circuit, name.as_deref(), *at, output.as_deref()),
        Commands::Inspect { circuit, name, zone } => {
            inspect(circuit, name.as_deref(), zone.as_deref())
        }
    };
    if let Err(e) = result {
        eprintln!("Error: {}", snafu::Report::from_error(e));
        std::process::exit(1);
    }
}
