//! Main swerve executable entry point.
//!
//! # Architecture
//!
//! The executable plans a trajectory through a route of waypoints and then follows it with the
//! reference controller against a simulated drivetrain:
//!
//!     - Initialise the session, logging and parameters
//!     - Plan the trajectory through the route
//!     - Main loop:
//!         - Simulation step
//!         - Reference control processing, which runs the wheel setpoint generator
//!         - Archiving of the status report
//!
//! The route file is read from the parameters directory, `demo_route.toml` by default or the
//! first command line argument if given.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;

// Internal
use swerve_lib::{
    ext::{Clock, PoseSource, SessionClock},
    geom::{Pose, Waypoint},
    kinodynamics::{self, SwerveKinodynamics},
    ref_ctrl::{self, ControlInputs, ReferenceController},
    setpoint_gen,
    sim::SimDrive,
    timing::TimedPose,
    trajectory::{PlannerParams, TrajectoryMaker},
};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.02;

/// Number of cycles to keep running after the trajectory has been completed, letting the
/// feedback settle on the final pose.
const SETTLE_CYCLES: u64 = 50;

/// Maximum number of cycles before giving up on the trajectory.
const MAX_CYCLES: u64 = 10_000;

/// Default route file.
const DEFAULT_ROUTE: &str = "demo_route.toml";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A route to drive.
#[derive(Debug, Deserialize)]
struct Route {
    waypoints: Vec<Waypoint>,
}

/// One trajectory point as archived.
#[derive(Debug, Serialize)]
struct TrajectoryRecord {
    time_s: f64,
    distance_m: f64,
    x_m: f64,
    y_m: f64,
    heading_rad: f64,
    curvature_m: f64,
    velocity_ms: f64,
    accel_ms2: f64,
}

/// The simulated vehicle state as archived.
#[derive(Debug, Serialize)]
struct SimRecord {
    time_s: f64,
    x_m: f64,
    y_m: f64,
    heading_rad: f64,
    vx_ms: f64,
    vy_ms: f64,
    omega_rads: f64,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session =
        Session::new("swerve_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Swerve Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let kino_params: kinodynamics::Params =
        util::params::load("kinodynamics.toml").wrap_err("Could not load kinodynamics params")?;
    let kino = SwerveKinodynamics::new(kino_params).wrap_err("Invalid kinodynamics params")?;

    let setpoint_gen_params: setpoint_gen::Params = util::params::load("setpoint_gen.toml")
        .wrap_err("Could not load setpoint generator params")?;

    let ref_ctrl_params: ref_ctrl::Params =
        util::params::load("ref_ctrl.toml").wrap_err("Could not load reference control params")?;

    let planner_params: PlannerParams = util::params::load("traj_planner.toml")
        .wrap_err("Could not load trajectory planner params")?;

    let route_file = env::args().nth(1).unwrap_or_else(|| DEFAULT_ROUTE.to_string());
    let route: Route = util::params::load(&route_file)
        .wrap_err_with(|| format!("Could not load the route from {}", route_file))?;

    info!("Parameters loaded");

    // ---- PLANNING ----

    let maker = TrajectoryMaker::new(&kino, &planner_params)
        .wrap_err("Could not create the trajectory maker")?;

    let trajectory = Arc::new(
        maker
            .through(&route.waypoints, 0.0, 0.0)
            .wrap_err("Could not plan a trajectory through the route")?,
    );

    info!(
        "Planned a {:.3} s trajectory through {} waypoints ({} points)",
        trajectory.duration_s(),
        route.waypoints.len(),
        trajectory.len()
    );

    let mut arch_traj = Archiver::from_path(&session, "trajectory.csv")
        .map_err(|e| eyre!("Could not create the trajectory archive: {}", e))?;
    for point in trajectory.points() {
        arch_traj
            .serialise(TrajectoryRecord::from(point))
            .map_err(|e| eyre!("Could not archive the trajectory: {}", e))?;
    }

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let start_pose = trajectory
        .first()
        .map(|p| p.pose.pose)
        .unwrap_or_else(Pose::default);
    let mut sim = SimDrive::new(kino, start_pose);

    let mut ctrl = ReferenceController::init(ref_ctrl::InitData {
        params: ref_ctrl_params,
        generator: setpoint_gen::InitData {
            kino,
            params: setpoint_gen_params,
        },
        trajectory: trajectory.clone(),
        inputs: ControlInputs::capture(&sim, &sim, &sim),
    })
    .wrap_err("Failed to initialise reference control")?;

    let mut arch_report = Archiver::from_path(&session, "ref_ctrl/status_report.csv")
        .map_err(|e| eyre!("Could not create the status report archive: {}", e))?;
    let mut arch_sim = Archiver::from_path(&session, "sim/state.csv")
        .map_err(|e| eyre!("Could not create the sim archive: {}", e))?;

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut num_cycles: u64 = 0;
    let mut settle_cycles: u64 = 0;

    while settle_cycles < SETTLE_CYCLES {
        if num_cycles >= MAX_CYCLES {
            warn!(
                "Trajectory not completed after {} cycles, stopping",
                MAX_CYCLES
            );
            break;
        }

        // ---- SIMULATION ----

        sim.step(CYCLE_PERIOD_S);

        // ---- REFERENCE CONTROL ----

        let report = ctrl.execute(&mut sim);

        if !report.safe {
            warn!("Cycle {} was not safe, nothing was actuated", num_cycles);
        }

        // ---- WRITE ARCHIVES ----

        if let Err(e) = arch_report.serialise(report) {
            warn!("Could not archive the status report: {}", e);
        }
        if let Err(e) = arch_sim.serialise(SimRecord::from(&sim)) {
            warn!("Could not archive the sim state: {}", e);
        }

        // ---- CYCLE MANAGEMENT ----

        if ctrl.is_done() {
            if settle_cycles == 0 {
                info!(
                    "Trajectory completed after {} cycles ({:.3} s)",
                    num_cycles + 1,
                    sim.time_s()
                );
            }
            settle_cycles += 1;
        }

        num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    let report = ctrl.report();
    info!(
        "Final position error {:.4} m, heading error {:.4} rad",
        report.position_error_m, report.heading_error_rad
    );

    info!(
        "End of execution after {:.3} s of simulated time ({:.3} s wall time)",
        sim.time_s(),
        SessionClock.now()
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl From<&TimedPose> for TrajectoryRecord {
    fn from(point: &TimedPose) -> Self {
        Self {
            time_s: point.time_s,
            distance_m: point.distance_m,
            x_m: point.pose.pose.x(),
            y_m: point.pose.pose.y(),
            heading_rad: point.pose.pose.heading_rad,
            curvature_m: point.pose.curvature_m(),
            velocity_ms: point.velocity_ms,
            accel_ms2: point.accel_ms2,
        }
    }
}

impl From<&SimDrive> for SimRecord {
    fn from(sim: &SimDrive) -> Self {
        let state = sim.current_state();

        Self {
            time_s: sim.time_s(),
            x_m: state.pose.x(),
            y_m: state.pose.y(),
            heading_rad: state.pose.heading_rad,
            vx_ms: state.velocity.x_ms,
            vy_ms: state.velocity.y_ms,
            omega_rads: state.velocity.theta_rads,
        }
    }
}
