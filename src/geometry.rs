//! Airframe geometry: per-motor mixing matrices and servo rule sets for every
//! supported frame, plus the lookup record tying them together.
//!
//! Motor rows are `(throttle, roll, pitch, yaw)` coefficients; a motor's
//! command is the demand vector dotted with its row. Throttle coefficients
//! define thrust share and are non-negative (1.0 for equal motors). Roll/
//! pitch/yaw signs encode motor position and spin direction; they are
//! geometry, not tuning.

use num_enum::TryFromPrimitive;

use crate::config::CustomServoRule;
use crate::{MAX_MOTORS, MAX_SERVO_RULES};

/// Frame selection. Discriminants match the values persisted by legacy
/// configurators, so stored configs parse directly.
#[derive(Clone, Copy, PartialEq, Eq, Debug, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AirframeKind {
    Tri = 1,
    QuadP = 2,
    QuadX = 3,
    Bicopter = 4,
    Gimbal = 5,
    Y6 = 6,
    Hex6P = 7,
    FlyingWing = 8,
    Y4 = 9,
    Hex6X = 10,
    OctoX8 = 11,
    OctoFlatP = 12,
    OctoFlatX = 13,
    Airplane = 14,
    Vtail4 = 17,
    Hex6H = 18,
    Dualcopter = 20,
    Singlecopter = 21,
    Atail4 = 22,
    CustomMotor = 23,
    CustomAirplane = 24,
    CustomTri = 25,
}

/// One row of a mixing matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorFactor {
    pub throttle: f32,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl MotorFactor {
    /// All-zero row; the custom-mix list terminator.
    pub const ZERO: Self = mf(0., 0., 0., 0.);
}

const fn mf(throttle: f32, roll: f32, pitch: f32, yaw: f32) -> MotorFactor {
    MotorFactor {
        throttle,
        roll,
        pitch,
        yaw,
    }
}

/// Sources a servo rule can draw from. The stabilized slots carry PID outputs
/// (or raw sticks in passthrough); the RC slots are raw channels centered on
/// mid-RC. All are on the ±500 scale.
#[derive(Clone, Copy, PartialEq, Eq, Debug, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum InputSource {
    StabilizedRoll = 0,
    StabilizedPitch = 1,
    StabilizedYaw = 2,
    StabilizedThrottle = 3,
    RcRoll = 4,
    RcPitch = 5,
    RcYaw = 6,
    RcThrottle = 7,
    RcAux1 = 8,
    RcAux2 = 9,
    RcAux3 = 10,
    RcAux4 = 11,
    GimbalPitch = 12,
    GimbalRoll = 13,
}

pub const INPUT_SOURCE_COUNT: usize = 14;

/// One linear servo mixing rule: `servo[target] += input * rate%`, slewed by
/// `speed` units per cycle when nonzero, clamped to `[min%, max%]` of the
/// servo's travel, optionally gated by a mode switch.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoRule {
    pub target: u8,
    pub input: InputSource,
    pub rate: i16,
    pub speed: u8,
    pub min: u8,
    pub max: u8,
    /// 0 = always active; otherwise the 1-based servo mode switch index.
    pub box_id: u8,
}

impl ServoRule {
    pub(crate) const INACTIVE: Self = rule(0, InputSource::StabilizedRoll, 0, 0, 0, 100, 0);
}

const fn rule(
    target: usize,
    input: InputSource,
    rate: i16,
    speed: u8,
    min: u8,
    max: u8,
    box_id: u8,
) -> ServoRule {
    ServoRule {
        target: target as u8,
        input,
        rate,
        speed,
        min,
        max,
        box_id,
    }
}

// Logical servo slots. Physical output ordering at write time is
// airframe-specific; see `MixerState::write_servos`.
pub const SERVO_GIMBAL_PITCH: usize = 0;
pub const SERVO_GIMBAL_ROLL: usize = 1;
pub const SERVO_FLAPPERON_1: usize = 3;
pub const SERVO_FLAPPERON_2: usize = 4;
pub const SERVO_RUDDER: usize = 5;
pub const SERVO_ELEVATOR: usize = 6;
pub const SERVO_THROTTLE: usize = 7;

pub const SERVO_BICOPTER_LEFT: usize = 4;
pub const SERVO_BICOPTER_RIGHT: usize = 5;
pub const SERVO_DUALCOPTER_LEFT: usize = 4;
pub const SERVO_DUALCOPTER_RIGHT: usize = 5;
pub const SERVO_SINGLECOPTER_1: usize = 3;
pub const SERVO_SINGLECOPTER_2: usize = 4;
pub const SERVO_SINGLECOPTER_3: usize = 5;
pub const SERVO_SINGLECOPTER_4: usize = 6;

pub(crate) const SERVO_PLANE_INDEX_MIN: usize = SERVO_FLAPPERON_1;
pub(crate) const SERVO_PLANE_INDEX_MAX: usize = SERVO_THROTTLE;

const QUAD_X: [MotorFactor; 4] = [
    mf(1.0, -1.0, 1.0, -1.0),  // rear right
    mf(1.0, -1.0, -1.0, 1.0),  // front right
    mf(1.0, 1.0, 1.0, 1.0),    // rear left
    mf(1.0, 1.0, -1.0, -1.0),  // front left
];

const QUAD_P: [MotorFactor; 4] = [
    mf(1.0, 0.0, 1.0, -1.0),  // rear
    mf(1.0, -1.0, 0.0, 1.0),  // right
    mf(1.0, 1.0, 0.0, 1.0),   // left
    mf(1.0, 0.0, -1.0, -1.0), // front
];

// Tricopter yaw comes from the tail servo, not motor spin; the rear motor's
// throttle coefficient is recomputed every cycle from the tail angle.
const TRICOPTER: [MotorFactor; 3] = [
    mf(1.0, 0.0, 1.333333, 0.0),   // rear
    mf(1.0, -1.0, -0.666667, 0.0), // right
    mf(1.0, 1.0, -0.666667, 0.0),  // left
];

const BICOPTER: [MotorFactor; 2] = [
    mf(1.0, 1.0, 0.0, 0.0),  // left
    mf(1.0, -1.0, 0.0, 0.0), // right
];

const Y6: [MotorFactor; 6] = [
    mf(1.0, 0.0, 1.333333, 1.0),    // rear
    mf(1.0, -1.0, -0.666667, -1.0), // right
    mf(1.0, 1.0, -0.666667, -1.0),  // left
    mf(1.0, 0.0, 1.333333, -1.0),   // under rear
    mf(1.0, -1.0, -0.666667, 1.0),  // under right
    mf(1.0, 1.0, -0.666667, 1.0),   // under left
];

const HEX6_P: [MotorFactor; 6] = [
    mf(1.0, -0.866025, 0.5, 1.0),   // rear right
    mf(1.0, -0.866025, -0.5, -1.0), // front right
    mf(1.0, 0.866025, 0.5, 1.0),    // rear left
    mf(1.0, 0.866025, -0.5, -1.0),  // front left
    mf(1.0, 0.0, -1.0, 1.0),        // front
    mf(1.0, 0.0, 1.0, -1.0),        // rear
];

const Y4: [MotorFactor; 4] = [
    mf(1.0, 0.0, 1.0, -1.0),  // rear top, CW
    mf(1.0, -1.0, -1.0, 0.0), // front right, CCW
    mf(1.0, 0.0, 1.0, 1.0),   // rear bottom, CCW
    mf(1.0, 1.0, -1.0, 0.0),  // front left, CW
];

const HEX6_X: [MotorFactor; 6] = [
    mf(1.0, -0.5, 0.866025, 1.0),   // rear right
    mf(1.0, -0.5, -0.866025, 1.0),  // front right
    mf(1.0, 0.5, 0.866025, -1.0),   // rear left
    mf(1.0, 0.5, -0.866025, -1.0),  // front left
    mf(1.0, -1.0, 0.0, -1.0),       // right
    mf(1.0, 1.0, 0.0, 1.0),         // left
];

const OCTO_X8: [MotorFactor; 8] = [
    mf(1.0, -1.0, 1.0, -1.0), // rear right
    mf(1.0, -1.0, -1.0, 1.0), // front right
    mf(1.0, 1.0, 1.0, 1.0),   // rear left
    mf(1.0, 1.0, -1.0, -1.0), // front left
    mf(1.0, -1.0, 1.0, 1.0),  // under rear right
    mf(1.0, -1.0, -1.0, -1.0), // under front right
    mf(1.0, 1.0, 1.0, -1.0),  // under rear left
    mf(1.0, 1.0, -1.0, 1.0),  // under front left
];

const OCTO_FLAT_P: [MotorFactor; 8] = [
    mf(1.0, 0.707107, -0.707107, 1.0),  // front left
    mf(1.0, -0.707107, -0.707107, 1.0), // front right
    mf(1.0, -0.707107, 0.707107, 1.0),  // rear right
    mf(1.0, 0.707107, 0.707107, 1.0),   // rear left
    mf(1.0, 0.0, -1.0, -1.0),           // front
    mf(1.0, -1.0, 0.0, -1.0),           // right
    mf(1.0, 0.0, 1.0, -1.0),            // rear
    mf(1.0, 1.0, 0.0, -1.0),            // left
];

const OCTO_FLAT_X: [MotorFactor; 8] = [
    mf(1.0, 1.0, -0.414178, 1.0),  // mid front left
    mf(1.0, -0.414178, -1.0, 1.0), // front right
    mf(1.0, -1.0, 0.414178, 1.0),  // mid rear right
    mf(1.0, 0.414178, 1.0, 1.0),   // rear left
    mf(1.0, 0.414178, -1.0, -1.0), // front left
    mf(1.0, -1.0, -0.414178, -1.0), // mid front right
    mf(1.0, -0.414178, 1.0, -1.0), // rear right
    mf(1.0, 1.0, 0.414178, -1.0),  // mid rear left
];

const VTAIL4: [MotorFactor; 4] = [
    mf(1.0, -0.58, 0.58, 1.0),   // rear right
    mf(1.0, -0.46, -0.39, -0.5), // front right
    mf(1.0, 0.58, 0.58, -1.0),   // rear left
    mf(1.0, 0.46, -0.39, 0.5),   // front left
];

const ATAIL4: [MotorFactor; 4] = [
    mf(1.0, 0.0, 1.0, 1.0),    // rear right
    mf(1.0, -1.0, -1.0, 0.0),  // front right
    mf(1.0, 0.0, 1.0, -1.0),   // rear left
    mf(1.0, 1.0, -1.0, -0.0),  // front left
];

const HEX6_H: [MotorFactor; 6] = [
    mf(1.0, -1.0, 1.0, -1.0), // rear right
    mf(1.0, -1.0, -1.0, 1.0), // front right
    mf(1.0, 1.0, 1.0, 1.0),   // rear left
    mf(1.0, 1.0, -1.0, -1.0), // front left
    mf(1.0, 0.0, 0.0, 0.0),   // right
    mf(1.0, 0.0, 0.0, 0.0),   // left
];

const DUALCOPTER: [MotorFactor; 2] = [
    mf(1.0, 0.0, 0.0, -1.0), // left
    mf(1.0, 0.0, 0.0, 1.0),  // right
];

const SINGLE_PROP: [MotorFactor; 1] = [mf(1.0, 0.0, 0.0, 0.0)];

const AIRPLANE_RULES: [ServoRule; 5] = [
    rule(SERVO_FLAPPERON_1, InputSource::StabilizedRoll, 100, 0, 0, 100, 0),
    rule(SERVO_FLAPPERON_2, InputSource::StabilizedRoll, 100, 0, 0, 100, 0),
    rule(SERVO_RUDDER, InputSource::StabilizedYaw, 100, 0, 0, 100, 0),
    rule(SERVO_ELEVATOR, InputSource::StabilizedPitch, 100, 0, 0, 100, 0),
    rule(SERVO_THROTTLE, InputSource::StabilizedThrottle, 100, 0, 0, 100, 0),
];

const FLYING_WING_RULES: [ServoRule; 5] = [
    rule(SERVO_FLAPPERON_1, InputSource::StabilizedRoll, 100, 0, 0, 100, 0),
    rule(SERVO_FLAPPERON_1, InputSource::StabilizedPitch, 100, 0, 0, 100, 0),
    rule(SERVO_FLAPPERON_2, InputSource::StabilizedRoll, -100, 0, 0, 100, 0),
    rule(SERVO_FLAPPERON_2, InputSource::StabilizedPitch, 100, 0, 0, 100, 0),
    rule(SERVO_THROTTLE, InputSource::StabilizedThrottle, 100, 0, 0, 100, 0),
];

const BICOPTER_RULES: [ServoRule; 4] = [
    rule(SERVO_BICOPTER_LEFT, InputSource::StabilizedYaw, 100, 0, 0, 100, 0),
    rule(SERVO_BICOPTER_LEFT, InputSource::StabilizedPitch, 100, 0, 0, 100, 0),
    rule(SERVO_BICOPTER_RIGHT, InputSource::StabilizedYaw, 100, 0, 0, 100, 0),
    rule(SERVO_BICOPTER_RIGHT, InputSource::StabilizedPitch, 100, 0, 0, 100, 0),
];

const TRI_RULES: [ServoRule; 1] = [rule(SERVO_RUDDER, InputSource::StabilizedYaw, 100, 0, 0, 100, 0)];

const DUALCOPTER_RULES: [ServoRule; 2] = [
    rule(SERVO_DUALCOPTER_LEFT, InputSource::StabilizedPitch, 100, 0, 0, 100, 0),
    rule(SERVO_DUALCOPTER_RIGHT, InputSource::StabilizedRoll, 100, 0, 0, 100, 0),
];

const SINGLECOPTER_RULES: [ServoRule; 8] = [
    rule(SERVO_SINGLECOPTER_1, InputSource::StabilizedYaw, 100, 0, 0, 100, 0),
    rule(SERVO_SINGLECOPTER_1, InputSource::StabilizedPitch, 100, 0, 0, 100, 0),
    rule(SERVO_SINGLECOPTER_2, InputSource::StabilizedYaw, 100, 0, 0, 100, 0),
    rule(SERVO_SINGLECOPTER_2, InputSource::StabilizedPitch, 100, 0, 0, 100, 0),
    rule(SERVO_SINGLECOPTER_3, InputSource::StabilizedYaw, 100, 0, 0, 100, 0),
    rule(SERVO_SINGLECOPTER_3, InputSource::StabilizedRoll, 100, 0, 0, 100, 0),
    rule(SERVO_SINGLECOPTER_4, InputSource::StabilizedYaw, 100, 0, 0, 100, 0),
    rule(SERVO_SINGLECOPTER_4, InputSource::StabilizedRoll, 100, 0, 0, 100, 0),
];

const GIMBAL_RULES: [ServoRule; 2] = [
    rule(SERVO_GIMBAL_PITCH, InputSource::GimbalPitch, 125, 0, 0, 100, 0),
    rule(SERVO_GIMBAL_ROLL, InputSource::GimbalRoll, 125, 0, 0, 100, 0),
];

/// The geometry record for one airframe: motor count and matrix, plus the
/// default servo ruleset. Custom kinds carry empty slices here and are filled
/// in from user config at init.
#[derive(Clone, Copy)]
pub struct AirframeGeometry {
    pub motor_count: usize,
    pub uses_servos: bool,
    pub motor_factors: &'static [MotorFactor],
    pub servo_rules: &'static [ServoRule],
}

const fn geo(
    motor_count: usize,
    uses_servos: bool,
    motor_factors: &'static [MotorFactor],
    servo_rules: &'static [ServoRule],
) -> AirframeGeometry {
    AirframeGeometry {
        motor_count,
        uses_servos,
        motor_factors,
        servo_rules,
    }
}

impl AirframeKind {
    pub const fn geometry(self) -> AirframeGeometry {
        match self {
            Self::Tri => geo(3, true, &TRICOPTER, &TRI_RULES),
            Self::QuadP => geo(4, false, &QUAD_P, &[]),
            Self::QuadX => geo(4, false, &QUAD_X, &[]),
            Self::Bicopter => geo(2, true, &BICOPTER, &BICOPTER_RULES),
            Self::Gimbal => geo(0, true, &[], &GIMBAL_RULES),
            Self::Y6 => geo(6, false, &Y6, &[]),
            Self::Hex6P => geo(6, false, &HEX6_P, &[]),
            Self::FlyingWing => geo(1, true, &SINGLE_PROP, &FLYING_WING_RULES),
            Self::Y4 => geo(4, false, &Y4, &[]),
            Self::Hex6X => geo(6, false, &HEX6_X, &[]),
            Self::OctoX8 => geo(8, false, &OCTO_X8, &[]),
            Self::OctoFlatP => geo(8, false, &OCTO_FLAT_P, &[]),
            Self::OctoFlatX => geo(8, false, &OCTO_FLAT_X, &[]),
            Self::Airplane => geo(1, true, &SINGLE_PROP, &AIRPLANE_RULES),
            Self::Vtail4 => geo(4, false, &VTAIL4, &[]),
            Self::Hex6H => geo(6, false, &HEX6_H, &[]),
            Self::Dualcopter => geo(2, true, &DUALCOPTER, &DUALCOPTER_RULES),
            Self::Singlecopter => geo(1, true, &SINGLE_PROP, &SINGLECOPTER_RULES),
            Self::Atail4 => geo(4, false, &ATAIL4, &[]),
            Self::CustomMotor => geo(0, false, &[], &[]),
            Self::CustomAirplane => geo(0, true, &[], &[]),
            Self::CustomTri => geo(0, true, &[], &[]),
        }
    }

    /// Motor matrix comes from user config rather than the static tables.
    pub const fn has_custom_motor_mix(self) -> bool {
        matches!(self, Self::CustomMotor | Self::CustomAirplane | Self::CustomTri)
    }

    /// Servo ruleset comes from user config rather than the static tables.
    pub const fn has_custom_servo_rules(self) -> bool {
        matches!(self, Self::CustomAirplane | Self::CustomTri)
    }

    pub const fn is_fixed_wing(self) -> bool {
        matches!(self, Self::FlyingWing | Self::Airplane | Self::CustomAirplane)
    }
}

/// Copy an airframe's preset motor matrix into a custom-mix buffer, leaving
/// the remainder zeroed (the sentinel). Lets a user start from a preset and
/// edit rows.
pub fn load_motor_mix(kind: AirframeKind, dest: &mut [MotorFactor; MAX_MOTORS]) {
    for row in dest.iter_mut() {
        *row = MotorFactor::ZERO;
    }
    for (i, row) in kind.geometry().motor_factors.iter().enumerate() {
        dest[i] = *row;
    }
}

/// Copy an airframe's preset servo ruleset into a custom-rule buffer, leaving
/// the remainder as `rate == 0` terminators.
pub fn load_servo_rules(kind: AirframeKind, dest: &mut [CustomServoRule; MAX_SERVO_RULES]) {
    for slot in dest.iter_mut() {
        *slot = CustomServoRule::EMPTY;
    }
    for (i, r) in kind.geometry().servo_rules.iter().enumerate() {
        dest[i] = CustomServoRule {
            target: r.target,
            input: r.input as u8,
            rate: r.rate,
            speed: r.speed,
            min: r.min,
            max: r.max,
            box_id: r.box_id,
        };
    }
}
