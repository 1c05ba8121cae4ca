//! Tricopter tail model. A tricopter yaws by tilting its rear motor with a
//! servo, so yaw authority is a nonlinear function of tail angle and the
//! motor's thrust curve. This module precomputes that yaw-force curve,
//! linearizes commanded servo positions against it, and runs a first-order
//! model of the physical servo so the motor mixer can compensate the rear
//! motor's thrust for where the tail is *about* to be, not where it was.
//!
//! Angles are stored in decidegrees on the wire (matching servo calibration)
//! and degrees in the continuous model. The tail servo's neutral is 90° in
//! this frame; the force curve spans 40.0°..139.0°.

use num_traits::float::Float;

use crate::config::{MixerConfig, ServoParam};
use crate::util::constrain_f;
use crate::MixerError;

pub(crate) const TAIL_SERVO_ANGLE_MID_DD: i32 = 900;
pub(crate) const TAIL_SERVO_MAX_ANGLE_DD: i32 = 500;
pub(crate) const YAW_FORCE_CURVE_SIZE: usize = 100;

/// How far ahead of the modeled servo angle the tail-motor correction may
/// lead, in degrees. Covers motor spool-up lag while the tail tilts.
const TAIL_MOTOR_CURVE_MAX_PHASE_SHIFT_DEG: f32 = 15.0;

const INT_PRECISION: i32 = 1024;

/// Precomputed tail state plus the virtual-servo model.
#[derive(Clone)]
pub struct TriTail {
    yaw_force_curve: [i16; YAW_FORCE_CURVE_SIZE],
    max_yaw_force: i16,
    thrust_factor: f32,
    max_angle_dd: i16,
    servo_speed_dps: f32,
    virtual_angle_deg: f32,
}

impl TriTail {
    pub fn new(cfg: &MixerConfig) -> Self {
        let mut tail = Self {
            yaw_force_curve: [0; YAW_FORCE_CURVE_SIZE],
            max_yaw_force: 0,
            thrust_factor: 1.,
            max_angle_dd: 0,
            servo_speed_dps: 0.,
            virtual_angle_deg: TAIL_SERVO_ANGLE_MID_DD as f32 / 10.,
        };
        tail.rebuild(cfg);
        tail
    }

    /// Recompute the force curve and symmetric authority limit. Call whenever
    /// the tail geometry parameters change; cheap enough for a config-apply
    /// path, far too slow for the loop.
    pub fn rebuild(&mut self, cfg: &MixerConfig) {
        self.thrust_factor = cfg.tri_tail_motor_thrustfactor as f32 / 10.;
        self.max_angle_dd = cfg.tri_servo_angle_at_max;
        self.servo_speed_dps = cfg.tri_tail_servo_speed as f32;

        let min_angle_dd = TAIL_SERVO_ANGLE_MID_DD - self.max_angle_dd as i32;
        let max_angle_dd = TAIL_SERVO_ANGLE_MID_DD + self.max_angle_dd as i32;
        let mut max_neg_force: i16 = 0;
        let mut max_pos_force: i16 = 0;

        let mut angle_dd = TAIL_SERVO_ANGLE_MID_DD - TAIL_SERVO_MAX_ANGLE_DD;
        for i in 0..YAW_FORCE_CURVE_SIZE {
            let angle_deg = angle_dd as f32 / 10.;
            let rad = angle_deg.to_radians();
            let force = 1000.
                * (-self.thrust_factor * rad.cos()
                    - rad.sin() * self.pitch_correction_at_angle(angle_deg));
            self.yaw_force_curve[i] = force as i16;

            // Only the configured angle window counts toward authority.
            if angle_dd >= min_angle_dd && angle_dd < max_angle_dd {
                max_neg_force = max_neg_force.min(self.yaw_force_curve[i]);
                max_pos_force = max_pos_force.max(self.yaw_force_curve[i]);
            }
            angle_dd += 10;
        }

        // Symmetric: the weaker direction bounds both.
        self.max_yaw_force = max_neg_force.abs().min(max_pos_force.abs());
    }

    /// Init-time validation hook. The linearizing lookup below assumes the
    /// force curve is ordered within the configured servo window; a thrust
    /// factor that bends the curve back on itself would make the search
    /// return a plausible-but-wrong angle, so reject such configs up front.
    pub fn validate_yaw_curve(&self) -> Result<(), MixerError> {
        let min_angle_dd = TAIL_SERVO_ANGLE_MID_DD - self.max_angle_dd as i32;
        let max_angle_dd = TAIL_SERVO_ANGLE_MID_DD + self.max_angle_dd as i32;

        let mut prev: Option<i16> = None;
        let mut angle_dd = TAIL_SERVO_ANGLE_MID_DD - TAIL_SERVO_MAX_ANGLE_DD;
        for &force in self.yaw_force_curve.iter() {
            if angle_dd >= min_angle_dd && angle_dd < max_angle_dd {
                if let Some(p) = prev {
                    if force < p {
                        return Err(MixerError::NonMonotonicYawCurve);
                    }
                }
                prev = Some(force);
            }
            angle_dd += 10;
        }
        Ok(())
    }

    /// Thrust multiplier keeping net lift constant as the tail tilts away
    /// from vertical.
    pub fn pitch_correction_at_angle(&self, angle_deg: f32) -> f32 {
        let rad = angle_deg.to_radians();
        1. / (rad.sin() - rad.cos() / self.thrust_factor)
    }

    /// Tail angle (decidegrees) producing `force`, by lookup in the
    /// precomputed curve with linear interpolation. Out-of-range forces clamp
    /// to the table ends.
    fn angle_from_yaw_curve_at_force(&self, force: i32) -> i32 {
        let curve = &self.yaw_force_curve;
        if force < curve[0] as i32 {
            return TAIL_SERVO_ANGLE_MID_DD - TAIL_SERVO_MAX_ANGLE_DD;
        }
        if force >= curve[YAW_FORCE_CURVE_SIZE - 1] as i32 {
            return TAIL_SERVO_ANGLE_MID_DD + TAIL_SERVO_MAX_ANGLE_DD;
        }

        // curve[lower] <= force, curve[higher] > force
        let mut lower = 0usize;
        let mut higher = YAW_FORCE_CURVE_SIZE - 1;
        while higher > lower + 1 {
            let mid = (lower + higher) / 2;
            if curve[mid] as i32 > force {
                higher = mid;
            } else {
                lower = mid;
            }
        }

        TAIL_SERVO_ANGLE_MID_DD - TAIL_SERVO_MAX_ANGLE_DD
            + lower as i32 * 10
            + (force - curve[lower] as i32) * 1000 / (curve[higher] as i32 - curve[lower] as i32)
                / 100
    }

    /// Servo PWM value that geometrically produces `angle_dd`, piecewise
    /// linear over `[min, mid]` and `[mid, max]`.
    pub(crate) fn servo_value_at_angle(&self, servo: &ServoParam, angle_dd: i32) -> i32 {
        let servo_mid = servo.middle as i32;
        let max_angle = self.max_angle_dd as i32;

        if angle_dd < TAIL_SERVO_ANGLE_MID_DD {
            let servo_min = servo.min as i32;
            (angle_dd - max_angle) * INT_PRECISION / (TAIL_SERVO_ANGLE_MID_DD - max_angle)
                * (servo_mid - servo_min)
                / INT_PRECISION
                + servo_min
        } else if angle_dd > TAIL_SERVO_ANGLE_MID_DD {
            let servo_max = servo.max as i32;
            (angle_dd - TAIL_SERVO_ANGLE_MID_DD) * INT_PRECISION / max_angle
                * (servo_max - servo_mid)
                / INT_PRECISION
                + servo_mid
        } else {
            servo_mid
        }
    }

    /// Inverse of `servo_value_at_angle`: the tail angle (decidegrees) a PWM
    /// value commands.
    pub(crate) fn servo_angle_ddeg(&self, servo: &ServoParam, servo_value: i32) -> i32 {
        let mid_value = servo.middle as i32;
        let end_value = if servo_value < mid_value {
            servo.min as i32
        } else {
            servo.max as i32
        };
        let end_angle = if servo_value < mid_value {
            TAIL_SERVO_ANGLE_MID_DD - self.max_angle_dd as i32
        } else {
            TAIL_SERVO_ANGLE_MID_DD + self.max_angle_dd as i32
        };

        (end_angle - TAIL_SERVO_ANGLE_MID_DD) * (servo_value - mid_value) * INT_PRECISION
            / (end_value - mid_value)
            / INT_PRECISION
            + TAIL_SERVO_ANGLE_MID_DD
    }

    /// Remap a commanded servo value so yaw authority is linear in the
    /// command. The pilot/PID expects linear response; the raw angle-to-force
    /// relationship is anything but.
    pub fn linear_servo_value(&self, servo: &ServoParam, servo_value: i32) -> i32 {
        let servo_mid = servo.middle as i32;
        let range = if servo_value < servo_mid {
            servo_mid - servo.min as i32
        } else {
            servo.max as i32 - servo_mid
        };
        let linear_force = (servo_value - servo_mid) * INT_PRECISION / range
            * self.max_yaw_force as i32
            / INT_PRECISION;
        let corrected_angle_dd = self.angle_from_yaw_curve_at_force(linear_force);
        self.servo_value_at_angle(servo, corrected_angle_dd)
    }

    /// Advance the virtual servo toward the commanded position, rate-limited
    /// to the configured servo speed.
    pub fn virtual_servo_step(&mut self, dt: f32, servo: &ServoParam, servo_value: i32) {
        let setpoint_deg = self.servo_angle_ddeg(servo, servo_value) as f32 / 10.;
        let max_step = dt * self.servo_speed_dps;

        if (self.virtual_angle_deg - setpoint_deg).abs() < max_step {
            self.virtual_angle_deg = setpoint_deg;
        } else if self.virtual_angle_deg < setpoint_deg {
            self.virtual_angle_deg += max_step;
        } else {
            self.virtual_angle_deg -= max_step;
        }
    }

    pub fn virtual_angle_deg(&self) -> f32 {
        self.virtual_angle_deg
    }

    pub fn max_yaw_force(&self) -> i16 {
        self.max_yaw_force
    }

    /// Throttle factor for the rear motor this cycle: the pitch correction at
    /// a phase-led estimate of the tail angle, so motor speed changes track
    /// the servo motion instead of trailing it. Motor braking lag is not
    /// modeled.
    pub(crate) fn tail_motor_throttle_factor(&self, servo: &ServoParam, servo_value: i32) -> f32 {
        let servo_angle = self.virtual_angle_deg;
        let setpoint_deg = self.servo_angle_ddeg(servo, servo_value) as f32 / 10.;

        let mut angle_diff = setpoint_deg - servo_angle;
        if angle_diff.abs() > TAIL_MOTOR_CURVE_MAX_PHASE_SHIFT_DEG {
            angle_diff = TAIL_MOTOR_CURVE_MAX_PHASE_SHIFT_DEG * angle_diff.signum();
        }

        let min_deg = (TAIL_SERVO_ANGLE_MID_DD - self.max_angle_dd as i32) as f32 / 10.;
        let max_deg = (TAIL_SERVO_ANGLE_MID_DD + self.max_angle_dd as i32) as f32 / 10.;
        let future_angle = constrain_f(servo_angle + angle_diff, min_deg, max_deg);

        self.pitch_correction_at_angle(future_angle)
    }
}
