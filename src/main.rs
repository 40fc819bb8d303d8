use beacon_wayfinding::algorithms::calibration::{
    CalibrationEngine, CalibrationState, MeasurementInput, MeasurementOutcome, TrackingReadiness,
};
use beacon_wayfinding::algorithms::coordinates::{CalibrationContext, CoordinateTransform};
use beacon_wayfinding::algorithms::geometry::{bearing, horizontal, rotate_compass};
use beacon_wayfinding::algorithms::triangulation::TriangulationSolver;
use beacon_wayfinding::core::{
    Beacon, BeaconCategory, BeaconSighting, CalibrationData, NavigationPath, RigidAlignment, TrackingSample,
};
use beacon_wayfinding::external::{
    BeaconFilter, EchoDescriptionGenerator, FloorplanStore, InMemoryFloorplan, ScriptedTrackingSource,
    StraightLinePlanner, TracingNarrator,
};
use beacon_wayfinding::navigation::{
    NavigationEvent, NavigationProgressEngine, NavigationSession, OutputFormat, ProgressFormatter,
};
use beacon_wayfinding::processing::kalman::PositionSmoother;
use beacon_wayfinding::processing::matcher::{resolve, resolve_beacon, MatchResult};
use beacon_wayfinding::utils::config::{TransformConfig, WayfindingConfig};
use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::{Vector2, Vector3};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Where the simulated user really stands, and how the tracking frame is
/// really rotated against the floorplan
const TRUE_POSITION: Vector2<f64> = Vector2::new(1.0, 2.0);
const TRUE_HEADING_OFFSET: f64 = 0.6;

/// Indoor wayfinding demo on a simulated building
///
/// Enable debug logging to see every tick decision:
///   RUST_LOG=debug wayfinding-demo navigate --to fridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON); defaults apply for anything omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Floorplan file (JSON); a built-in three-room building otherwise
    #[arg(short, long)]
    floorplan: Option<PathBuf>,

    /// Progress report format
    #[arg(long, value_enum, default_value = "compact")]
    format: FormatArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate a position from simulated beacon sightings
    Locate,
    /// Run the calibration procedure with simulated aims
    Calibrate,
    /// Calibrate, then walk a simulated user to a destination
    Navigate {
        /// Destination name, matched loosely
        #[arg(short, long, default_value = "fridge")]
        to: String,
    },
    /// Match a spoken destination name against the floorplan
    Resolve { query: String },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Text,
    Compact,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Compact => OutputFormat::Compact,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

fn demo_floorplan() -> InMemoryFloorplan {
    let mut plan = InMemoryFloorplan::new();
    plan.add_room("hall", "Hall");
    plan.add_room("kitchen", "Kitchen");
    plan.add_room("lab", "Lab");

    let beacons = [
        ("h1", "Reception Desk", 2.0, 6.0, "hall", BeaconCategory::Landmark),
        ("h2", "Coat Rack", -3.0, 1.0, "hall", BeaconCategory::Furniture),
        ("h3", "Notice Board", 6.0, -2.0, "hall", BeaconCategory::Landmark),
        ("h4", "Bench", -2.0, 7.0, "hall", BeaconCategory::Furniture),
        ("k1", "Fridge", 16.0, 8.0, "kitchen", BeaconCategory::Destination),
        ("k2", "Coffee Machine", 14.0, 2.0, "kitchen", BeaconCategory::Destination),
        ("k3", "Sink", 17.0, 4.0, "kitchen", BeaconCategory::Furniture),
        ("l1", "Oscilloscope", 4.0, 18.0, "lab", BeaconCategory::Destination),
        ("l2", "Workbench", 0.0, 16.0, "lab", BeaconCategory::Furniture),
    ];
    for (id, name, x, y, room, category) in beacons {
        plan.add_beacon(Beacon::new(id, name, Vector3::new(x, y, 1.2), room, category));
    }

    plan.add_doorway("d1", "Kitchen Door", Vector3::new(10.0, 4.0, 0.0), "hall", "kitchen");
    plan.add_doorway("d2", "Lab Door", Vector3::new(2.0, 12.0, 0.0), "hall", "lab");
    plan
}

/// Ground truth of the simulation: map frame to the device's tracking frame
fn simulated_truth() -> CoordinateTransform {
    CoordinateTransform::new(
        RigidAlignment::new(TRUE_POSITION, TRUE_HEADING_OFFSET),
        TransformConfig::default(),
    )
}

fn locate_demo(config: &WayfindingConfig, floorplan: &InMemoryFloorplan) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== POSITION ESTIMATE DEMO ===");
    let solver = TriangulationSolver::new(config.triangulation.clone());
    let heading = 0.3;
    let visible = floorplan.beacons_in_room("hall");

    let sightings_at = |position: Vector2<f64>| -> Vec<BeaconSighting> {
        visible
            .iter()
            .filter_map(|b| {
                let to_beacon = horizontal(&b.position) - position;
                let direction_map = to_beacon.try_normalize(1e-9)?;
                let local = rotate_compass(&direction_map, -heading);
                Some(
                    BeaconSighting::new(b.id.clone(), b.position, Vector3::new(local.x, local.y, 0.0), 0.9)
                        .with_distance(to_beacon.norm()),
                )
            })
            .collect()
    };

    let estimate = solver.estimate(&sightings_at(TRUE_POSITION), heading)?;
    println!(
        "Single fix: ({:.2}, {:.2}) via {:?}, confidence {:.2}",
        estimate.position.x, estimate.position.y, estimate.method, estimate.confidence
    );

    // A slow walk east; the smoother follows the raw fixes
    let mut smoother = PositionSmoother::new();
    for step in 0..10u64 {
        let truth = TRUE_POSITION + Vector2::new(0.3 * step as f64, 0.0);
        match solver.estimate_at(&sightings_at(truth), heading, step * 300) {
            Ok(raw) => {
                let smoothed = smoother.update(&raw);
                println!(
                    "t={:>4} ms  raw ({:.2}, {:.2})  smoothed ({:.2}, {:.2})",
                    step * 300,
                    raw.position.x,
                    raw.position.y,
                    smoothed.position.x,
                    smoothed.position.y
                );
            }
            Err(e) => warn!(error = %e, "estimate skipped"),
        }
    }
    Ok(())
}

/// Walk through the calibration procedure, aiming perfectly at each beacon
fn calibrate_demo(config: &WayfindingConfig, floorplan: &InMemoryFloorplan) -> Option<CalibrationData> {
    println!("=== CALIBRATION DEMO ===");
    let truth = simulated_truth();
    let mut engine = CalibrationEngine::new(config.calibration.clone());
    let now = Instant::now();
    engine.begin(now);

    let origin = TrackingSample::new(Vector3::zeros(), 0.0);
    if engine.poll_tracking(Some(&origin), now) == TrackingReadiness::Waiting {
        warn!("tracking is not ready");
        return None;
    }
    if let Err(e) = engine.start_measuring(floorplan, TRUE_POSITION) {
        println!("Calibration failed: {}", e);
        if let Some(hint) = e.user_guidance() {
            println!("{}", hint);
        }
        return None;
    }

    while let Some(beacon) = engine.current_candidate().cloned() {
        let beacon_tracking = truth.map_to_tracking(&horizontal(&beacon.position));
        let heading_tracking = bearing(&Vector2::zeros(), &beacon_tracking);
        let input = MeasurementInput {
            device_heading_map: truth.tracking_heading_to_map(heading_tracking),
            sample: TrackingSample::new(Vector3::zeros(), heading_tracking),
            observed_direction_local: Vector3::new(0.0, 1.0, 0.0),
            distance: Some(beacon_tracking.norm()),
        };
        match engine.confirm_measurement(input) {
            Ok(MeasurementOutcome::Recorded { alignment }) => {
                println!("Aimed at {:<16} alignment {:.2}", beacon.name, alignment)
            }
            Ok(MeasurementOutcome::NotAligned { alignment }) => {
                println!("Missed {:<16} alignment {:.2}, skipping", beacon.name, alignment);
                if engine.skip_current().is_err() {
                    break;
                }
            }
            Err(e) => {
                println!("Calibration failed: {}", e);
                return None;
            }
        }
    }

    match engine.state() {
        CalibrationState::Completed(data) => {
            println!(
                "Calibrated: user at ({:.2}, {:.2}), heading offset {:.1} deg, residual {:.3} m",
                data.user_position_map.x,
                data.user_position_map.y,
                data.heading_map_to_tracking.to_degrees(),
                data.residual_error
            );
            Some(data.clone())
        }
        other => {
            println!("Calibration ended in state {}", other.name());
            None
        }
    }
}

/// Tracking frames for a user walking the route at `step` meters per frame
fn walk_route(path: &NavigationPath, truth: &CoordinateTransform, step: f64) -> ScriptedTrackingSource {
    let mut source = ScriptedTrackingSource::default();
    let waypoints = path.waypoints();
    for leg in waypoints.windows(2) {
        let (from, to) = (leg[0].position_2d(), leg[1].position_2d());
        let heading = truth.map_heading_to_tracking(bearing(&from, &to));
        let frames = ((to - from).norm() / step).ceil().max(1.0) as usize;
        for i in 0..frames {
            let point = from + (to - from) * (i as f64 / frames as f64);
            let tracked = truth.map_to_tracking(&point);
            source.push(TrackingSample::new(Vector3::new(tracked.x, tracked.y, 0.0), heading));
        }
    }
    if let Some(last) = waypoints.last() {
        let tracked = truth.map_to_tracking(&last.position_2d());
        for _ in 0..20 {
            source.push(TrackingSample::new(Vector3::new(tracked.x, tracked.y, 0.0), 0.0));
        }
    }
    source
}

async fn navigate_demo(
    config: &WayfindingConfig,
    floorplan: Arc<InMemoryFloorplan>,
    destination: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let candidates = floorplan.beacons(&BeaconFilter::usable());
    let Some(target) = resolve_beacon(destination, &candidates).cloned() else {
        println!("No single destination matches \"{}\"", destination);
        return Ok(());
    };

    let Some(calibration) = calibrate_demo(config, &floorplan) else {
        return Ok(());
    };
    let context = CalibrationContext::with_calibration(calibration);
    let Some(transform) = context.transform(config.transform.clone()) else {
        println!("Not calibrated, cannot navigate");
        return Ok(());
    };

    println!("=== NAVIGATION DEMO ===");
    let planner = Arc::new(StraightLinePlanner::new(floorplan.clone()));
    let start = transform.tracking_to_map_3d(&Vector3::zeros());
    let mut engine = NavigationProgressEngine::new(config.navigation.clone(), transform, floorplan, planner);
    if let Err(e) = engine.select_destination(&target, start) {
        println!("{}", e);
        if let Some(hint) = e.user_guidance() {
            println!("{}", hint);
        }
        return Ok(());
    }

    let step = config.navigation.walking_speed_mps * config.navigation.tick_interval().as_secs_f64();
    let tracking = match engine.path() {
        Some(path) => walk_route(path, &simulated_truth(), step),
        None => ScriptedTrackingSource::default(),
    };
    info!(frames = tracking.remaining(), destination = %target.name, "starting simulated walk");

    let (session, mut events, handle) = NavigationSession::new(engine, tracking, Arc::new(TracingNarrator));
    let session = session.with_description_generator(Arc::new(EchoDescriptionGenerator::default()));

    let formatter = ProgressFormatter::new(format);
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let NavigationEvent::Arrived { .. } = event {
                if let Some(progress) = handle.progress() {
                    match formatter.format(&progress) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!(error = %e, "progress formatting failed"),
                    }
                }
            }
        }
    });

    let engine = session.run().await;
    reporter.await?;
    println!("Finished: {}", engine.state());
    Ok(())
}

fn resolve_demo(floorplan: &InMemoryFloorplan, query: &str) {
    match resolve(query, &floorplan.beacons(&BeaconFilter::usable())) {
        MatchResult::Success(name) => println!("\"{}\" -> {}", query, name),
        MatchResult::Ambiguous(names) => println!("\"{}\" could be: {}", query, names.join(", ")),
        MatchResult::NotFound => println!("\"{}\" matches nothing", query),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => WayfindingConfig::from_file(path)?,
        None => WayfindingConfig::default(),
    };
    let floorplan = match &args.floorplan {
        Some(path) => InMemoryFloorplan::from_file(path)?,
        None => demo_floorplan(),
    };

    match args.command {
        Command::Locate => locate_demo(&config, &floorplan)?,
        Command::Calibrate => {
            calibrate_demo(&config, &floorplan);
        }
        Command::Navigate { to } => {
            navigate_demo(&config, Arc::new(floorplan), &to, args.format.into()).await?
        }
        Command::Resolve { query } => resolve_demo(&floorplan, &query),
    }
    Ok(())
}
