//! Output mixer for multirotor and fixed-wing flight controllers.
//!
//! Each control cycle, the mixer turns abstract demands (throttle plus
//! roll/pitch/yaw stabilization torques) and auxiliary inputs into concrete
//! per-motor ESC commands and per-servo PWM setpoints, according to the
//! selected airframe's geometry. It covers:
//!
//! - per-airframe motor mixing matrices, including user-defined custom mixes
//! - airmode: rescaling the attitude mix when actuator saturation would
//!   otherwise clip it, so correction authority survives low/high throttle
//! - bidirectional (3D) throttle with a mid-stick deadband and hysteresis
//! - failsafe clamping and disarm handling
//! - programmable servo mixing rules with rate, slew and travel limits,
//!   gimbal stabilization overlays and RC channel forwarding
//! - the tricopter tail: a precomputed yaw-force curve, command
//!   linearization and a virtual-servo model for motor lag compensation
//!
//! The PID loop, RC decoding, failsafe detection and the PWM hardware remain
//! external: inputs arrive as a by-value [`MixInputs`] snapshot, outputs
//! leave through the [`PwmDriver`] trait. The per-cycle path allocates
//! nothing and cannot fail; all validation happens at construction.
//!
//! Typical loop:
//!
//! ```
//! use accipiter::{AirframeKind, MixInputs, MixerSettings, MixerState, PwmTopology};
//!
//! # struct Pwm;
//! # impl accipiter::PwmDriver for Pwm {
//! #     fn write_motor(&mut self, _: usize, _: u16) {}
//! #     fn write_servo(&mut self, _: usize, _: u16) {}
//! #     fn complete_oneshot_update(&mut self, _: usize) {}
//! #     fn shutdown_pulses(&mut self, _: usize) {}
//! # }
//! # let mut pwm = Pwm;
//! let mut mixer = MixerState::new(
//!     AirframeKind::QuadX,
//!     MixerSettings::default(),
//!     PwmTopology::default(),
//! )?;
//!
//! // ...every loop iteration:
//! let inputs = MixInputs::default(); // snapshot of PID/RC/flag state
//! mixer.mix(&inputs);
//! mixer.write_motors(&mut pwm);
//! if mixer.uses_servos() {
//!     mixer.write_servos(&inputs, &mut pwm);
//! }
//! # Ok::<(), accipiter::MixerError>(())
//! ```

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod driver;
pub mod filter;
pub mod geometry;
pub mod inputs;
pub mod mixer;
mod motor_mixer;
mod servo_mixer;
pub mod tricopter;
mod util;

pub use config::{Features, Flight3dConfig, MixerConfig, MixerSettings, MotorConfig, PwmTopology,
                 RxConfig, ServoParam};
pub use driver::PwmDriver;
pub use geometry::{AirframeKind, InputSource, MotorFactor, ServoRule};
pub use inputs::{ArmStatus, Attitude, MixInputs};
pub use mixer::MixerState;

pub const MAX_MOTORS: usize = 8;
pub const MAX_SERVOS: usize = 8;
pub const MAX_SERVO_RULES: usize = 36;

/// Construction-time failures. The per-cycle mix has no error surface; a
/// config that would break it is refused here, and the system must not arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MixerError {
    #[error("custom motor mix contains no rows")]
    EmptyCustomMix,
    #[error("airframe requires servos but none are configured")]
    MissingServos,
    #[error("servo rule {index} targets out-of-range servo {target}")]
    RuleTargetOutOfRange { index: usize, target: u8 },
    #[error("servo rule {index} names unknown input source {input_source}")]
    UnknownInputSource { index: usize, input_source: u8 },
    #[error("servo lowpass cutoff unusable at the configured loop rate")]
    LowpassCutoff,
    #[error("tail yaw force curve is not monotonic over the configured servo range")]
    NonMonotonicYawCurve,
}
