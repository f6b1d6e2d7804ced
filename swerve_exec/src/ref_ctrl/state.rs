//! Implementations for the ReferenceController state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, trace};
use serde::Serialize;
use std::sync::Arc;

// Internal
use super::{wheels_aligned, FullStateController, Params, RefCtrlError};
use crate::ext::{Clock, PoseSource, SwerveActuators};
use crate::geom::{PlanarVelocity, SwerveModel};
use crate::kinodynamics::{WheelSetpoint, NUM_WHEELS};
use crate::setpoint_gen::{self, WheelSetpointGenerator};
use crate::trajectory::{Trajectory, TrajectoryIter};
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Reference control module state
#[derive(Debug, Clone)]
pub struct ReferenceController {
    params: Params,

    controller: FullStateController,

    generator: WheelSetpointGenerator,

    cursor: TrajectoryIter,

    mode: RefCtrlMode,

    /// Time of the previous cycle.
    prev_time_s: Option<f64>,

    /// Whether the actuators reported their profiles done on the last cycle.
    profile_done: bool,

    report: StatusReport,
}

/// Data needed to start following a trajectory.
#[derive(Debug, Clone)]
pub struct InitData {
    pub params: Params,

    pub generator: setpoint_gen::InitData,

    pub trajectory: Arc<Trajectory>,

    /// Snapshot of the vehicle when the controller is started.
    pub inputs: ControlInputs,
}

/// A snapshot of everything the controller reads in one cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlInputs {
    /// Units: seconds
    pub now_s: f64,

    pub state: SwerveModel,

    /// Units: radians
    pub measured_angles_rad: [f64; NUM_WHEELS],

    pub profile_done: bool,
}

/// Output of one reference control cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputData {
    pub setpoints: [WheelSetpoint; NUM_WHEELS],
}

/// Status report for reference control processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    pub mode: RefCtrlMode,

    /// True once the wheels have been aligned with the trajectory.
    pub aligned: bool,

    /// Time of the cursor along the trajectory.
    ///
    /// Units: seconds
    pub cursor_time_s: f64,

    pub ref_x_m: f64,
    pub ref_y_m: f64,
    pub ref_heading_rad: f64,

    /// Distance from the measured position to the reference position.
    ///
    /// Units: meters
    pub position_error_m: f64,

    /// Units: radians
    pub heading_error_rad: f64,

    /// Fraction of the desired wheel velocity change achieved by the setpoint generator.
    pub limiter_s: f64,

    /// False if the cycle was rejected and nothing was actuated.
    pub safe: bool,

    pub done: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The possible modes of reference control.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum RefCtrlMode {
    /// Steering the wheels to the direction of travel without driving, the cursor is held.
    Steering,

    /// Following the trajectory.
    Driving,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for RefCtrlMode {
    fn default() -> Self {
        RefCtrlMode::Steering
    }
}

impl ControlInputs {
    /// Take one snapshot of the clock, pose source and actuators.
    pub fn capture<P, C, A>(pose_source: &P, clock: &C, actuators: &A) -> Self
    where
        P: PoseSource + ?Sized,
        C: Clock + ?Sized,
        A: SwerveActuators + ?Sized,
    {
        Self {
            now_s: clock.now(),
            state: pose_source.current_state(),
            measured_angles_rad: actuators.measured_angles(),
            profile_done: actuators.profile_done(),
        }
    }
}

impl State for ReferenceController {
    type InitData = InitData;
    type InitError = RefCtrlError;

    type InputData = ControlInputs;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = RefCtrlError;

    /// Start following the trajectory.
    ///
    /// The controller starts in driving mode if the wheels are already aligned with the first
    /// motion of the trajectory, otherwise it starts by steering them.
    fn init(init_data: Self::InitData) -> Result<Self, Self::InitError> {
        let params = init_data.params;
        validate_params(&params)?;

        if init_data.trajectory.is_empty() {
            return Err(RefCtrlError::EmptyTrajectory);
        }

        let mut generator = WheelSetpointGenerator::init(init_data.generator)?;
        generator.reset(&init_data.inputs.measured_angles_rad);

        let inputs = &init_data.inputs;

        let mut ctrl = Self {
            params,
            controller: FullStateController::new(&params),
            generator,
            cursor: TrajectoryIter::new(init_data.trajectory),
            mode: RefCtrlMode::Steering,
            prev_time_s: Some(inputs.now_s).filter(|t| t.is_finite()),
            profile_done: inputs.profile_done,
            report: StatusReport::default(),
        };

        let next_body = ctrl.preview_body_velocity(inputs.state.pose.heading_rad);
        if ctrl.aligned(&next_body, &inputs.measured_angles_rad) {
            ctrl.mode = RefCtrlMode::Driving;
        }

        debug!(
            "Following a {:.3} s trajectory, starting in {:?} mode",
            ctrl.cursor.trajectory().duration_s(),
            ctrl.mode
        );

        Ok(ctrl)
    }

    /// Run one cycle of reference control on a snapshot of the vehicle.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.profile_done = input_data.profile_done;

        if !input_data.state.is_finite() || !input_data.now_s.is_finite() {
            self.report.safe = false;
            self.report.done = self.is_done();

            return Err(RefCtrlError::InvalidState {
                now_s: input_data.now_s,
                state: input_data.state,
            });
        }

        let dt_s = match self.prev_time_s {
            Some(t) => (input_data.now_s - t).max(0.0),
            None => 0.0,
        };

        let heading_rad = input_data.state.pose.heading_rad;
        let mut advance_s = dt_s;
        let mut mode = self.mode;

        // ---- STEERING ----

        if mode == RefCtrlMode::Steering {
            let next_body = self.preview_body_velocity(heading_rad);

            if self.aligned(&next_body, &input_data.measured_angles_rad) {
                mode = RefCtrlMode::Driving;

                // The cursor was held while steering, so start from where it was
                advance_s = 0.0;
            } else {
                let setpoints = self.generator.steer_at_rest(&next_body);
                self.prev_time_s = Some(input_data.now_s);
                let report = self.build_report(&input_data.state, 1.0, None);

                trace!("Steering at rest to {:?}", setpoints);

                self.report = report;
                return Ok((OutputData { setpoints }, report));
            }
        }

        // ---- DRIVING ----

        // The cursor, time base and mode are only committed once the setpoints are made
        let mut cursor = self.cursor.clone();
        let current = cursor
            .advance(advance_s)
            .ok_or(RefCtrlError::EmptyTrajectory)?;
        let next = cursor
            .preview(self.params.cycle_period_s)
            .ok_or(RefCtrlError::EmptyTrajectory)?;

        let output = self.controller.calculate(
            &input_data.state,
            &SwerveModel::from_timed_pose(&current),
            &SwerveModel::from_timed_pose(&next),
        );

        let gen_input = setpoint_gen::InputData {
            body_velocity: output.velocity.to_body(heading_rad),
            dt_s: if dt_s > 0.0 {
                dt_s
            } else {
                self.params.cycle_period_s
            },
        };

        let (setpoints, gen_report) = match self.generator.proc(&gen_input) {
            Ok(o) => o,
            Err(e) => {
                self.report.safe = false;
                return Err(e.into());
            }
        };

        if mode != self.mode {
            debug!(
                "Wheels aligned at {:.3} s, following the trajectory",
                input_data.now_s
            );
        }

        self.cursor = cursor;
        self.prev_time_s = Some(input_data.now_s);
        self.mode = mode;

        let report = self.build_report(
            &input_data.state,
            gen_report.s,
            Some(output.heading_error_rad),
        );

        trace!(
            "Reference at {:.3} s: x = {:.3} m, y = {:.3} m, demand {:?}",
            report.cursor_time_s,
            report.ref_x_m,
            report.ref_y_m,
            output.velocity
        );

        self.report = report;
        Ok((OutputData { setpoints }, report))
    }
}

impl ReferenceController {
    /// Run one cycle against the drivetrain: snapshot it, process and apply the setpoints.
    ///
    /// Rejected cycles are logged and nothing is applied, the returned report is then flagged
    /// as unsafe.
    pub fn execute<D>(&mut self, drive: &mut D) -> StatusReport
    where
        D: PoseSource + Clock + SwerveActuators,
    {
        let inputs = ControlInputs::capture(&*drive, &*drive, &*drive);

        match self.proc(&inputs) {
            Ok((output, report)) => {
                drive.apply_wheel_setpoints(&output.setpoints);
                report
            }
            Err(e) => {
                error!("Reference control cycle rejected: {}", e);
                self.report.safe = false;
                self.report
            }
        }
    }

    /// True once the trajectory has been followed to the end, and if configured once the
    /// actuators have finished their profiles.
    pub fn is_done(&self) -> bool {
        self.cursor.is_done() && (!self.params.profile_done_check || self.profile_done)
    }

    /// Alias of [`ReferenceController::is_done`] for schedulers.
    pub fn is_finished(&self) -> bool {
        self.is_done()
    }

    pub fn mode(&self) -> RefCtrlMode {
        self.mode
    }

    pub fn cursor(&self) -> &TrajectoryIter {
        &self.cursor
    }

    /// The report from the last cycle.
    pub fn report(&self) -> &StatusReport {
        &self.report
    }

    /// Body relative velocity of the trajectory one cycle ahead of the cursor.
    fn preview_body_velocity(&self, heading_rad: f64) -> PlanarVelocity {
        self.cursor
            .preview(self.params.cycle_period_s)
            .map(|next| {
                SwerveModel::from_timed_pose(&next)
                    .velocity
                    .to_body(heading_rad)
            })
            .unwrap_or_default()
    }

    fn aligned(
        &self,
        body_velocity: &PlanarVelocity,
        measured_angles_rad: &[f64; NUM_WHEELS],
    ) -> bool {
        wheels_aligned(
            self.generator.kino(),
            body_velocity,
            measured_angles_rad,
            self.params.steer_tolerance_rad,
        )
    }

    fn build_report(
        &self,
        state: &SwerveModel,
        limiter_s: f64,
        heading_error_rad: Option<f64>,
    ) -> StatusReport {
        let mut report = StatusReport {
            mode: self.mode,
            aligned: self.mode == RefCtrlMode::Driving,
            cursor_time_s: self.cursor.time_s(),
            limiter_s,
            safe: true,
            done: self.is_done(),
            ..Default::default()
        };

        if let Some(current) = self.cursor.current() {
            let pose = &current.pose.pose;

            report.ref_x_m = pose.x();
            report.ref_y_m = pose.y();
            report.ref_heading_rad = pose.heading_rad;
            report.position_error_m = pose.distance_to(&state.pose);
            report.heading_error_rad = heading_error_rad.unwrap_or_else(|| {
                util::maths::get_ang_dist(state.pose.heading_rad, pose.heading_rad)
            });
        }

        report
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn validate_params(params: &Params) -> Result<(), RefCtrlError> {
    let gains = [
        ("position_k_p", params.position_k_p),
        ("heading_k_p", params.heading_k_p),
        ("velocity_k_p", params.velocity_k_p),
        ("omega_k_p", params.omega_k_p),
    ];

    for &(name, value) in gains.iter() {
        if !value.is_finite() || value < 0.0 {
            return Err(RefCtrlError::InvalidParam(name, value));
        }
    }

    let positive = [
        ("steer_tolerance_rad", params.steer_tolerance_rad),
        ("cycle_period_s", params.cycle_period_s),
    ];

    for &(name, value) in positive.iter() {
        if !value.is_finite() || value <= 0.0 {
            return Err(RefCtrlError::InvalidParam(name, value));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::Pose;
    use crate::kinodynamics::SwerveKinodynamics;
    use crate::path::SamplerParams;
    use crate::sim::SimDrive;
    use crate::timing::ConstraintPreset;
    use crate::trajectory::{PlannerParams, TrajectoryMaker};
    use std::f64::consts::FRAC_PI_2;

    const DT_S: f64 = 0.02;

    /// A drive which never moves, records what it is sent and reports whatever it is told to.
    struct MockDrive {
        state: SwerveModel,
        time_s: f64,
        angles: [f64; NUM_WHEELS],
        profile_done: bool,
        applied: Vec<[WheelSetpoint; NUM_WHEELS]>,
    }

    impl MockDrive {
        fn new() -> Self {
            Self {
                state: SwerveModel::default(),
                time_s: 0.0,
                angles: [0.0; NUM_WHEELS],
                profile_done: true,
                applied: Vec::new(),
            }
        }
    }

    impl PoseSource for MockDrive {
        fn current_state(&self) -> SwerveModel {
            self.state
        }
    }

    impl Clock for MockDrive {
        fn now(&self) -> f64 {
            self.time_s
        }
    }

    impl SwerveActuators for MockDrive {
        fn apply_wheel_setpoints(&mut self, setpoints: &[WheelSetpoint; NUM_WHEELS]) {
            self.applied.push(*setpoints);
        }

        fn measured_angles(&self) -> [f64; NUM_WHEELS] {
            self.angles
        }

        fn profile_done(&self) -> bool {
            self.profile_done
        }
    }

    fn params() -> Params {
        Params {
            position_k_p: 2.0,
            heading_k_p: 2.0,
            velocity_k_p: 0.0,
            omega_k_p: 0.0,
            steer_tolerance_rad: 0.05,
            cycle_period_s: DT_S,
            profile_done_check: false,
        }
    }

    fn one_meter() -> Arc<Trajectory> {
        let maker = TrajectoryMaker::new(
            &SwerveKinodynamics::for_test(),
            &PlannerParams {
                preset: ConstraintPreset::ForTest,
                sampler: SamplerParams::default(),
            },
        )
        .unwrap();

        Arc::new(
            maker
                .rest_to_rest(Pose::new(0.0, 0.0, 0.0), Pose::new(1.0, 0.0, 0.0))
                .unwrap(),
        )
    }

    fn controller<P, C, A>(
        params: Params,
        pose_source: &P,
        clock: &C,
        actuators: &A,
    ) -> ReferenceController
    where
        P: PoseSource,
        C: Clock,
        A: SwerveActuators,
    {
        ReferenceController::init(InitData {
            params,
            generator: setpoint_gen::InitData {
                kino: SwerveKinodynamics::for_test(),
                params: setpoint_gen::Params::default(),
            },
            trajectory: one_meter(),
            inputs: ControlInputs::capture(pose_source, clock, actuators),
        })
        .unwrap()
    }

    #[test]
    fn test_unaligned_start() {
        let mut sim = SimDrive::default().with_wheel_angles([FRAC_PI_2; NUM_WHEELS]);
        let mut ctrl = controller(params(), &sim, &sim, &sim);

        assert_eq!(ctrl.mode(), RefCtrlMode::Steering);

        let mut steering_cycles = 0;
        for _ in 0..20 {
            sim.step(DT_S);
            let report = ctrl.execute(&mut sim);
            assert!(report.safe);

            if report.mode == RefCtrlMode::Driving {
                break;
            }

            // Nothing drives while steering
            steering_cycles += 1;
            assert!(!report.aligned);
            assert_eq!(report.cursor_time_s, 0.0);
            for w in sim.wheels().iter() {
                assert_eq!(w.speed_ms, 0.0);
            }
        }

        assert!(steering_cycles >= 1);
        assert_eq!(ctrl.mode(), RefCtrlMode::Driving);
        assert_eq!(sim.current_state().pose.x(), 0.0);

        // Aligning does not move the cursor, the next cycle does
        assert_eq!(ctrl.report().cursor_time_s, 0.0);
        assert!(ctrl.report().aligned);
        sim.step(DT_S);
        let report = ctrl.execute(&mut sim);
        assert_near!(report.cursor_time_s, DT_S, 1e-9);
    }

    #[test]
    fn test_aligned_start_drives() {
        let drive = MockDrive::new();
        let ctrl = controller(params(), &drive, &drive, &drive);

        assert_eq!(ctrl.mode(), RefCtrlMode::Driving);
        assert!(!ctrl.is_done());
    }

    #[test]
    fn test_is_done() {
        let mut drive = MockDrive::new();
        let mut ctrl = controller(params(), &drive, &drive, &drive);
        let duration_s = ctrl.cursor().trajectory().duration_s();

        let mut cycles = 0;
        while !ctrl.is_done() && cycles < 500 {
            drive.time_s += DT_S;
            let report = ctrl.execute(&mut drive);
            cycles += 1;

            // The measurement never changes, that does not matter to the cursor
            assert_eq!(report.done, report.cursor_time_s >= duration_s);
        }

        assert!(ctrl.is_done());
        assert!(ctrl.is_finished());
        assert!(cycles > 1);
        assert_eq!(drive.applied.len(), cycles);
    }

    #[test]
    fn test_profile_done_check() {
        let mut p = params();
        p.profile_done_check = true;

        let mut drive = MockDrive::new();
        drive.profile_done = false;
        let mut ctrl = controller(p, &drive, &drive, &drive);

        for _ in 0..500 {
            drive.time_s += DT_S;
            ctrl.execute(&mut drive);
        }

        assert!(ctrl.cursor().is_done());
        assert!(!ctrl.is_done());

        drive.profile_done = true;
        drive.time_s += DT_S;
        let report = ctrl.execute(&mut drive);
        assert!(report.done);
        assert!(ctrl.is_done());
    }

    #[test]
    fn test_invalid_state() {
        let mut drive = MockDrive::new();
        let mut ctrl = controller(params(), &drive, &drive, &drive);

        drive.time_s += DT_S;
        ctrl.execute(&mut drive);
        let cursor_time_s = ctrl.cursor().time_s();
        assert_eq!(drive.applied.len(), 1);

        drive.state.pose.position_m[0] = f64::NAN;
        drive.time_s += DT_S;
        let report = ctrl.execute(&mut drive);

        assert!(!report.safe);
        assert_eq!(drive.applied.len(), 1);
        assert_eq!(ctrl.cursor().time_s(), cursor_time_s);

        let inputs = ControlInputs::capture(&drive, &drive, &drive);
        assert!(matches!(
            ctrl.proc(&inputs),
            Err(RefCtrlError::InvalidState { .. })
        ));

        // Recovers once the state is valid again
        drive.state = SwerveModel::default();
        drive.time_s += DT_S;
        let report = ctrl.execute(&mut drive);
        assert!(report.safe);
        assert_eq!(drive.applied.len(), 2);
    }

    #[test]
    fn test_rejected_demand_keeps_cursor() {
        let mut drive = MockDrive::new();
        let mut ctrl = controller(params(), &drive, &drive, &drive);

        drive.time_s += DT_S;
        ctrl.execute(&mut drive);
        let cursor_time_s = ctrl.cursor().time_s();
        assert!(cursor_time_s > 0.0);

        // Finite but so far away that the feedback overflows, the setpoint generator rejects it
        drive.state.pose.position_m[0] = -f64::MAX;
        drive.time_s += DT_S;
        let report = ctrl.execute(&mut drive);

        assert!(!report.safe);
        assert_eq!(drive.applied.len(), 1);
        assert_eq!(ctrl.cursor().time_s(), cursor_time_s);
        assert!(matches!(
            ctrl.proc(&ControlInputs::capture(&drive, &drive, &drive)),
            Err(RefCtrlError::SetpointGen(_))
        ));
        assert_eq!(ctrl.cursor().time_s(), cursor_time_s);

        // The next good cycle advances by the time since the last accepted cycle
        drive.state = SwerveModel::default();
        drive.time_s += DT_S;
        let report = ctrl.execute(&mut drive);
        assert!(report.safe);
        assert_near!(report.cursor_time_s, cursor_time_s + 2.0 * DT_S, 1e-9);
    }

    #[test]
    fn test_invalid_params() {
        let drive = MockDrive::new();
        let mut p = params();
        p.steer_tolerance_rad = 0.0;

        let result = ReferenceController::init(InitData {
            params: p,
            generator: setpoint_gen::InitData {
                kino: SwerveKinodynamics::for_test(),
                params: setpoint_gen::Params::default(),
            },
            trajectory: one_meter(),
            inputs: ControlInputs::capture(&drive, &drive, &drive),
        });
        assert!(matches!(
            result,
            Err(RefCtrlError::InvalidParam("steer_tolerance_rad", _))
        ));

        let result = ReferenceController::init(InitData {
            params: params(),
            generator: setpoint_gen::InitData {
                kino: SwerveKinodynamics::for_test(),
                params: setpoint_gen::Params::default(),
            },
            trajectory: Arc::new(Trajectory::default()),
            inputs: ControlInputs::capture(&drive, &drive, &drive),
        });
        assert!(matches!(result, Err(RefCtrlError::EmptyTrajectory)));
    }

    #[test]
    fn test_follow_end_to_end() {
        let mut sim = SimDrive::default();
        let mut ctrl = controller(params(), &sim, &sim, &sim);

        let mut prev_ref_x_m = 0.0;
        let mut cycles = 0;

        while !ctrl.is_done() && cycles < 500 {
            sim.step(DT_S);
            let report = ctrl.execute(&mut sim);
            cycles += 1;

            assert!(report.safe);
            assert!(report.ref_x_m >= prev_ref_x_m);
            prev_ref_x_m = report.ref_x_m;
        }

        assert!(ctrl.is_done());
        assert_near!(prev_ref_x_m, 1.0, 1e-9);

        // Let the feedback settle on the final reference
        for _ in 0..100 {
            sim.step(DT_S);
            ctrl.execute(&mut sim);
        }

        let state = sim.current_state();
        assert_near!(state.pose.x(), 1.0, 0.05);
        assert_near!(state.pose.y(), 0.0, 0.05);
        assert_near!(state.pose.heading_rad, 0.0, 0.05);
    }
}
