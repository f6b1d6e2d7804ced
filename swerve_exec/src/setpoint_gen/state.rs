//! Implementations for the WheelSetpointGenerator state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::Serialize;

// Internal
use super::{DriveAccelerationLimiter, LimitResult, Params, SetpointGenError};
use crate::geom::PlanarVelocity;
use crate::kinodynamics::{
    optimise_setpoint, SwerveKinodynamics, WheelSetpoint, WheelVector, NUM_WHEELS,
};
use util::{
    maths::{get_ang_dist, wrap_pi},
    module::State,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Wheel setpoint generator module state
#[derive(Debug, Clone)]
pub struct WheelSetpointGenerator {
    kino: SwerveKinodynamics,

    params: Params,

    limiter: DriveAccelerationLimiter,

    /// The setpoints commanded on the previous cycle.
    prev_setpoints: [WheelSetpoint; NUM_WHEELS],

    /// The wheel velocities commanded on the previous cycle.
    prev_vectors: [WheelVector; NUM_WHEELS],
}

/// Data needed to initialise the generator.
#[derive(Debug, Clone, Copy)]
pub struct InitData {
    pub kino: SwerveKinodynamics,
    pub params: Params,
}

/// Input data to the setpoint generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputData {
    /// The desired body relative velocity.
    pub body_velocity: PlanarVelocity,

    /// Time since the previous cycle.
    ///
    /// Units: seconds
    pub dt_s: f64,
}

/// Status report for setpoint generator processing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    /// Fraction of the desired change in wheel velocities achieved this cycle.
    pub s: f64,

    /// Whether the drive acceleration limiter converged.
    pub converged: bool,

    /// True if the desired velocity was scaled down to respect the maximum wheel speed.
    pub desaturated: bool,

    /// True if any wheel's steering was rate limited.
    pub steer_limited: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for WheelSetpointGenerator {
    type InitData = InitData;
    type InitError = SetpointGenError;

    type InputData = InputData;
    type OutputData = [WheelSetpoint; NUM_WHEELS];
    type StatusReport = StatusReport;
    type ProcError = SetpointGenError;

    /// Initialise the generator with every wheel at rest and pointing forward.
    fn init(init_data: Self::InitData) -> Result<Self, Self::InitError> {
        let period = init_data.params.max_cycle_period_s;
        if !period.is_finite() || period <= 0.0 {
            return Err(SetpointGenError::InvalidCyclePeriod(period));
        }

        Ok(Self {
            kino: init_data.kino,
            params: init_data.params,
            limiter: DriveAccelerationLimiter::new(init_data.kino),
            prev_setpoints: [WheelSetpoint::default(); NUM_WHEELS],
            prev_vectors: [WheelVector::zeros(); NUM_WHEELS],
        })
    }

    /// Compute the wheel setpoints for this cycle.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        if !input_data.body_velocity.is_finite() {
            return Err(SetpointGenError::NonFiniteVelocity(input_data.body_velocity));
        }
        if !input_data.dt_s.is_finite() || input_data.dt_s < 0.0 {
            return Err(SetpointGenError::InvalidPeriod(input_data.dt_s));
        }

        let mut report = StatusReport {
            s: 1.0,
            converged: true,
            ..Default::default()
        };

        let dt_s = input_data.dt_s.min(self.params.max_cycle_period_s);

        // Inverse kinematics then desaturate
        let wheels = self.kino.to_wheel_vectors(&input_data.body_velocity);
        let mut desired = self.kino.desaturate(&wheels);
        report.desaturated = desired != wheels;

        // Drive acceleration limit
        if self.params.limit_drive_accel {
            let LimitResult { s, converged } =
                self.limiter
                    .enforce_wheel_accel_limit(&self.prev_vectors, &desired, dt_s);

            for (d, p) in desired.iter_mut().zip(self.prev_vectors.iter()) {
                *d = p + (*d - p) * s;
            }

            report.s = s;
            report.converged = converged;
        }

        // Optimise the angles then limit the steering rate
        let max_steer_step_rad = self.kino.params.max_steer_velocity_rads * dt_s;
        let mut setpoints = [WheelSetpoint::default(); NUM_WHEELS];

        for i in 0..NUM_WHEELS {
            let prev_angle_rad = self.prev_setpoints[i].angle_rad;
            let sp = optimise_setpoint(&desired[i], prev_angle_rad);

            setpoints[i] = if self.params.limit_steer_rate {
                let (sp, limited) = limit_steer(sp, prev_angle_rad, max_steer_step_rad);
                report.steer_limited |= limited;
                sp
            } else {
                sp
            };
        }

        trace!(
            "Wheel setpoints: {:?} (s = {:.3}, steer limited: {})",
            setpoints,
            report.s,
            report.steer_limited
        );

        self.store(&setpoints);

        Ok((setpoints, report))
    }
}

impl WheelSetpointGenerator {
    pub fn kino(&self) -> &SwerveKinodynamics {
        &self.kino
    }

    /// The setpoints commanded on the previous cycle.
    pub fn prev_setpoints(&self) -> &[WheelSetpoint; NUM_WHEELS] {
        &self.prev_setpoints
    }

    /// Setpoints which point every wheel along the given body velocity without driving.
    ///
    /// Wheels which would not move under `body_velocity` keep their previous angle.
    pub fn steer_at_rest(&mut self, body_velocity: &PlanarVelocity) -> [WheelSetpoint; NUM_WHEELS] {
        let mut prev_angles_rad = [0.0; NUM_WHEELS];
        for (angle, sp) in prev_angles_rad.iter_mut().zip(self.prev_setpoints.iter()) {
            *angle = sp.angle_rad;
        }

        let mut setpoints = self.kino.to_wheel_setpoints(body_velocity, &prev_angles_rad);
        for sp in setpoints.iter_mut() {
            sp.speed_ms = 0.0;
        }

        self.store(&setpoints);

        setpoints
    }

    /// Re-seed the previous state with stationary wheels at the measured angles.
    pub fn reset(&mut self, measured_angles_rad: &[f64; NUM_WHEELS]) {
        let mut setpoints = [WheelSetpoint::default(); NUM_WHEELS];

        for (sp, angle) in setpoints.iter_mut().zip(measured_angles_rad.iter()) {
            sp.angle_rad = wrap_pi(*angle);
        }

        self.store(&setpoints);
    }

    fn store(&mut self, setpoints: &[WheelSetpoint; NUM_WHEELS]) {
        self.prev_setpoints = *setpoints;

        for (v, sp) in self.prev_vectors.iter_mut().zip(setpoints.iter()) {
            *v = sp.to_vector();
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Limit the change in steer angle to `max_step_rad`.
///
/// When limited the wheel only drives the part of its target velocity that lies along its new
/// angle.
fn limit_steer(
    sp: WheelSetpoint,
    prev_angle_rad: f64,
    max_step_rad: f64,
) -> (WheelSetpoint, bool) {
    let dist = get_ang_dist(prev_angle_rad, sp.angle_rad);

    if dist.abs() <= max_step_rad {
        return (sp, false);
    }

    let angle_rad = wrap_pi(prev_angle_rad + dist.signum() * max_step_rad);
    let speed_ms = sp.speed_ms * get_ang_dist(angle_rad, sp.angle_rad).cos();

    (
        WheelSetpoint {
            speed_ms,
            angle_rad,
        },
        true,
    )
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
