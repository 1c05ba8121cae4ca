//! The per-cycle snapshot of collaborator state the mixer reads. Producers
//! (PID loop, RC decoder, failsafe monitor, AHRS) run at their own cadences;
//! the control task captures their outputs by value and hands the mixer one
//! immutable view per cycle.

/// Axis / channel indices, shared by `axis_pid`, `rc_command` and `rc_data`.
pub const ROLL: usize = 0;
pub const PITCH: usize = 1;
pub const YAW: usize = 2;
pub const THROTTLE: usize = 3;
/// First aux channel in `rc_data`.
pub const AUX1: usize = 4;

pub const RC_CHANNEL_COUNT: usize = 8;
/// Aux channels eligible for direct servo forwarding.
pub const MAX_AUX_CHANNELS: usize = 4;

/// Master motor arm status. If `Disarmed`, the motors will not spin (or stop
/// spinning immediately).
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ArmStatus {
    Disarmed = 0,
    Armed = 1,
}

impl Default for ArmStatus {
    fn default() -> Self {
        Self::Disarmed
    }
}

/// Estimated attitude, in decidegrees.
#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Attitude {
    pub roll: i16,
    pub pitch: i16,
}

/// One cycle's worth of inputs.
#[derive(Clone)]
pub struct MixInputs {
    /// Stabilization torque demands from the PID loop (roll, pitch, yaw);
    /// nominally within ±500 but unbounded.
    pub axis_pid: [i16; 3],
    /// Processed stick values (roll, pitch, yaw, throttle). Attitude axes are
    /// ±500; throttle is in ESC command units.
    pub rc_command: [i16; 4],
    /// Raw receiver channels, ~1000-2000.
    pub rc_data: [u16; RC_CHANNEL_COUNT],
    pub attitude: Attitude,
    pub arm_status: ArmStatus,
    pub failsafe_active: bool,
    pub airmode_active: bool,
    /// Passthrough flight mode: sticks drive the servos directly.
    pub passthrough_active: bool,
    /// Camera-stabilization mode switch.
    pub camstab_active: bool,
    /// Servo-rule mode switches; bit `n` set means box `n + 1` is active.
    pub servo_boxes: u16,
    /// Seconds since the previous cycle.
    pub dt: f32,
}

impl MixInputs {
    /// Whether the mode switch gating a servo rule is active. `box_id` is the
    /// rule's 1-based switch index.
    pub fn servo_box_active(&self, box_id: u8) -> bool {
        box_id >= 1 && self.servo_boxes & (1 << (box_id - 1)) != 0
    }
}

impl Default for MixInputs {
    fn default() -> Self {
        Self {
            axis_pid: [0; 3],
            rc_command: [0, 0, 0, 1000],
            rc_data: [1500, 1500, 1500, 1000, 1500, 1500, 1500, 1500],
            attitude: Attitude::default(),
            arm_status: ArmStatus::Disarmed,
            failsafe_active: false,
            airmode_active: false,
            passthrough_active: false,
            camstab_active: false,
            servo_boxes: 0,
            dt: 0.001,
        }
    }
}
