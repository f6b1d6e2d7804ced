//! Named constraint presets
//!
//! Every preset builds the same four constraints (fixed limits, wheel speed, yaw rate and
//! capsize) with different scales on the drivetrain's absolute limits.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use super::{
    CapsizeAccelerationConstraint, ConfigError, ConstantConstraint, ConstraintSet,
    SwerveDriveDynamicsConstraint, YawRateConstraint,
};
use crate::kinodynamics::SwerveKinodynamics;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Fractions of the drivetrain's absolute limits, each in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintScales {
    /// Scale on the maximum drive velocity.
    pub velocity: f64,

    /// Scale on the maximum drive acceleration and deceleration.
    pub accel: f64,

    /// Scale on the capsize acceleration.
    pub centripetal: f64,

    /// Scale on the maximum yaw rate and yaw acceleration.
    pub yaw_rate: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The available constraint presets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintPreset {
    /// Half speed, gentle in curves and slow to spin.
    AllGood,

    /// Absolute maximum, probably too fast to actually use.
    Fast,

    /// Quarter of everything.
    Slow,

    Medium,

    /// Used for autonomous routines.
    Auto,

    /// The absolute limits, shouldn't be used on a real vehicle.
    ForTest,

    Custom(ConstraintScales),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ConstraintScales {
    pub fn new(velocity: f64, accel: f64, centripetal: f64, yaw_rate: f64) -> Self {
        Self {
            velocity,
            accel,
            centripetal,
            yaw_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("velocity", self.velocity),
            ("accel", self.accel),
            ("centripetal", self.centripetal),
            ("yaw_rate", self.yaw_rate),
        ];

        for &(name, value) in checks.iter() {
            // NaN fails both comparisons so is rejected as well
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::ScaleOutOfRange { name, value });
            }
        }

        Ok(())
    }

    /// Build the constraint set for these scales.
    pub fn build(&self, kino: &SwerveKinodynamics) -> Result<ConstraintSet, ConfigError> {
        self.validate()?;

        Ok(ConstraintSet::new()
            .with(ConstantConstraint::new(kino, self.velocity, self.accel))
            .with(SwerveDriveDynamicsConstraint::new(
                kino,
                self.velocity,
                self.accel,
            ))
            .with(YawRateConstraint::new(kino, self.yaw_rate))
            .with(CapsizeAccelerationConstraint::new(kino, self.centripetal)))
    }
}

impl ConstraintPreset {
    /// Every named preset, excluding custom.
    pub const NAMED: [ConstraintPreset; 6] = [
        ConstraintPreset::AllGood,
        ConstraintPreset::Fast,
        ConstraintPreset::Slow,
        ConstraintPreset::Medium,
        ConstraintPreset::Auto,
        ConstraintPreset::ForTest,
    ];

    pub fn scales(&self) -> ConstraintScales {
        match self {
            ConstraintPreset::AllGood => ConstraintScales::new(0.5, 0.5, 0.2, 0.2),
            ConstraintPreset::Fast => ConstraintScales::new(1.0, 1.0, 1.0, 0.25),
            ConstraintPreset::Slow => ConstraintScales::new(0.25, 0.25, 0.25, 0.25),
            ConstraintPreset::Medium => ConstraintScales::new(0.75, 1.0, 0.75, 0.25),
            ConstraintPreset::Auto => ConstraintScales::new(0.77, 0.6, 0.75, 0.5),
            ConstraintPreset::ForTest => ConstraintScales::new(1.0, 1.0, 1.0, 1.0),
            ConstraintPreset::Custom(scales) => *scales,
        }
    }

    /// Build the constraint set for this preset.
    pub fn build(&self, kino: &SwerveKinodynamics) -> Result<ConstraintSet, ConfigError> {
        self.scales().build(kino)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
