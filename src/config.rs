//! Configuration structs for the mixer. These mirror what the flight
//! controller persists; storage itself is out of scope here, so everything is
//! a plain `Copy` struct with flight-ready defaults.

use crate::geometry::MotorFactor;
use crate::{MAX_MOTORS, MAX_SERVOS, MAX_SERVO_RULES};

/// Sentinel for `ServoParam::forward_from_channel`: no RC forwarding.
pub const CHANNEL_FORWARDING_DISABLED: u8 = 0xff;

/// Neutral command applied to all servos before the first mix cycle.
pub const DEFAULT_SERVO_MIDDLE: u16 = 1500;

/// `yaw_jump_prevention_limit` at or above this value disables the clamp.
pub const YAW_JUMP_PREVENTION_LIMIT_HIGH: u16 = 500;

pub const MOTOR_PWM_RATE_BRUSHLESS: u16 = 400;
pub const MOTOR_PWM_RATE_BRUSHED: u16 = 16_000;

/// ESC command range. Values are in PWM microseconds (1000-2000 for standard
/// ESCs; DSHOT drivers translate downstream).
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorConfig {
    /// Command sent when disarmed or motor-stopped.
    pub min_command: u16,
    /// Idle command when armed; keeps props spinning.
    pub min_throttle: u16,
    pub max_throttle: u16,
    pub motor_pwm_rate: u16,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            min_command: 1000,
            min_throttle: 1100,
            max_throttle: 2000,
            motor_pwm_rate: MOTOR_PWM_RATE_BRUSHLESS,
        }
    }
}

/// Bidirectional (3D) ESC ranges: reverse thrust below the deadband, forward
/// above it, `neutral3d` in between.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Flight3dConfig {
    /// Top of the reverse-thrust command range.
    pub deadband3d_low: u16,
    /// Bottom of the forward-thrust command range.
    pub deadband3d_high: u16,
    pub neutral3d: u16,
    /// Stick deadband around mid-RC, in RC units.
    pub deadband3d_throttle: u16,
}

impl Default for Flight3dConfig {
    fn default() -> Self {
        Self {
            deadband3d_low: 1406,
            deadband3d_high: 1514,
            neutral3d: 1460,
            deadband3d_throttle: 50,
        }
    }
}

/// The slice of receiver configuration the mixer reads.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxConfig {
    pub mid_rc: u16,
    /// Sticks below this are treated as idle for motor-stop purposes.
    pub min_check: u16,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            mid_rc: 1500,
            min_check: 1100,
        }
    }
}

/// Per-servo calibration. `rate` is a signed percent post-scale applied after
/// rule mixing; `reversed_sources` inverts individual rule inputs (bit index =
/// input source).
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServoParam {
    pub min: u16,
    pub max: u16,
    pub middle: u16,
    pub rate: i16,
    pub forward_from_channel: u8,
    pub reversed_sources: u32,
}

impl Default for ServoParam {
    fn default() -> Self {
        Self {
            min: 1000,
            max: 2000,
            middle: DEFAULT_SERVO_MIDDLE,
            rate: 100,
            forward_from_channel: CHANNEL_FORWARDING_DISABLED,
            reversed_sources: 0,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GimbalMode {
    #[default]
    Normal,
    /// Blend pitch and roll attitude into both gimbal servos.
    MixTilt,
}

#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GimbalConfig {
    pub mode: GimbalMode,
}

/// Behavioral knobs of the mix itself.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MixerConfig {
    /// +1 or -1; flips the yaw column for reversed prop directions.
    pub yaw_motor_direction: i8,
    /// Caps the yaw PID contribution at this much beyond the pilot's own yaw
    /// stick, preventing desync-inducing yaw spikes. `>= 500` disables.
    pub yaw_jump_prevention_limit: u16,
    /// Airmode collapse threshold, percent. Once the attitude rescale factor
    /// exceeds this, the throttle band collapses to its center.
    pub airmode_saturation_limit: u8,
    pub pid_at_min_throttle: bool,
    /// Keep driving the tricopter tail servo while disarmed.
    pub tri_unarmed_servo: bool,
    /// Tail motor thrust factor, in tenths.
    pub tri_tail_motor_thrustfactor: i16,
    /// Tail servo throw at full deflection, decidegrees from center.
    pub tri_servo_angle_at_max: i16,
    /// Physical tail servo slew rate, degrees per second.
    pub tri_tail_servo_speed: u16,
    pub servo_lowpass_freq: f32,
    pub servo_lowpass_enable: bool,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            yaw_motor_direction: 1,
            yaw_jump_prevention_limit: 200,
            airmode_saturation_limit: 50,
            pid_at_min_throttle: true,
            tri_unarmed_servo: true,
            tri_tail_motor_thrustfactor: 54,
            tri_servo_angle_at_max: 400,
            tri_tail_servo_speed: 300,
            servo_lowpass_freq: 400.,
            servo_lowpass_enable: false,
        }
    }
}

/// Runtime stand-ins for the feature switches other subsystems expose.
#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Features {
    pub flight_3d: bool,
    pub motor_stop: bool,
    /// Camera-stabilization gimbal servos; forces the servo path on even for
    /// motor-only airframes.
    pub servo_tilt: bool,
    pub channel_forwarding: bool,
    pub oneshot125: bool,
}

/// One user-defined servo mixing rule, as persisted: input source still a raw
/// integer, `rate == 0` terminating the list.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CustomServoRule {
    pub target: u8,
    pub input: u8,
    pub rate: i16,
    pub speed: u8,
    pub min: u8,
    pub max: u8,
    pub box_id: u8,
}

impl CustomServoRule {
    pub const EMPTY: Self = Self {
        target: 0,
        input: 0,
        rate: 0,
        speed: 0,
        min: 0,
        max: 100,
        box_id: 0,
    };
}

impl Default for CustomServoRule {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Everything the mixer is constructed from, bundled so init takes one
/// argument per concern.
#[derive(Clone, Copy)]
pub struct MixerSettings {
    pub mixer: MixerConfig,
    pub motors: MotorConfig,
    pub flight_3d: Flight3dConfig,
    pub rx: RxConfig,
    pub gimbal: GimbalConfig,
    pub servos: [ServoParam; MAX_SERVOS],
    pub features: Features,
    /// Custom motor mix; `throttle == 0` row terminates.
    pub custom_motor_mix: [MotorFactor; MAX_MOTORS],
    /// Custom servo rules; `rate == 0` row terminates.
    pub custom_servo_rules: [CustomServoRule; MAX_SERVO_RULES],
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            mixer: MixerConfig::default(),
            motors: MotorConfig::default(),
            flight_3d: Flight3dConfig::default(),
            rx: RxConfig::default(),
            gimbal: GimbalConfig::default(),
            servos: [ServoParam::default(); MAX_SERVOS],
            features: Features::default(),
            custom_motor_mix: [MotorFactor::ZERO; MAX_MOTORS],
            custom_servo_rules: [CustomServoRule::EMPTY; MAX_SERVO_RULES],
        }
    }
}

/// What the PWM output layer actually wired up.
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmTopology {
    pub servo_count: usize,
    /// Control loop period in microseconds; sets the servo lowpass sample
    /// rate.
    pub loop_time_us: u32,
}

impl Default for PwmTopology {
    fn default() -> Self {
        Self {
            servo_count: MAX_SERVOS,
            loop_time_us: 1000,
        }
    }
}
