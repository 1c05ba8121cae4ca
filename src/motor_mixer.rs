//! Per-cycle motor mixing: demands in, ESC commands out. Two policies share
//! the geometry tables. Airmode rescales the attitude mix to fit the throttle
//! band so authority survives saturation; the classic path mixes directly and
//! rebalances overshoot downward. Both end in regime-specific clamps
//! (3D side bands, failsafe, normal) per the data flow in the crate docs.
//!
//! Inputs and outputs are integer command units; the per-motor arithmetic is
//! f32 with a single round-to-nearest at the integer boundary.

use num_traits::float::Float;

use crate::config::YAW_JUMP_PREVENTION_LIMIT_HIGH;
use crate::inputs::{ArmStatus, MixInputs, PITCH, ROLL, THROTTLE, YAW};
use crate::mixer::MixerState;
use crate::util::{constrain, constrain_f, round_i32};
use crate::MAX_MOTORS;

impl MixerState {
    pub(crate) fn mix_motors(&mut self, inputs: &MixInputs) {
        let motor_cfg = self.settings.motors;
        let flight_3d_cfg = self.settings.flight_3d;
        let mixer_cfg = self.settings.mixer;
        let rx_cfg = self.settings.rx;
        let feature_3d = self.settings.features.flight_3d;

        let min_command = motor_cfg.min_command as i32;
        let min_throttle = motor_cfg.min_throttle as i32;
        let max_throttle = motor_cfg.max_throttle as i32;
        let mid_rc = rx_cfg.mid_rc as i32;
        let deadband_low = flight_3d_cfg.deadband3d_low as i32;
        let deadband_high = flight_3d_cfg.deadband3d_high as i32;
        let deadband_throttle = flight_3d_cfg.deadband3d_throttle as i32;

        let armed = inputs.arm_status == ArmStatus::Armed;
        let failsafe_active = inputs.failsafe_active;
        let rc_throttle = inputs.rc_data[THROTTLE] as i32;
        let yaw_direction = mixer_cfg.yaw_motor_direction as f32;

        let mut axis_pid = [
            inputs.axis_pid[ROLL] as f32,
            inputs.axis_pid[PITCH] as f32,
            inputs.axis_pid[YAW] as f32,
        ];

        // Yaw jump prevention: bound the yaw PID to a configured margin past
        // the pilot's own yaw command. Only meaningful with enough motors for
        // yaw authority to cause desyncs.
        if self.motor_count >= 4
            && mixer_cfg.yaw_jump_prevention_limit < YAW_JUMP_PREVENTION_LIMIT_HIGH
        {
            let limit = mixer_cfg.yaw_jump_prevention_limit as f32
                + (inputs.rc_command[YAW] as f32).abs();
            axis_pid[YAW] = constrain_f(axis_pid[YAW], -limit, limit);
        }

        if inputs.airmode_active {
            // Attitude demand per motor, before any throttle.
            let mut rpy_mix = [0f32; MAX_MOTORS];
            let mut rpy_mix_max = 0f32; // assumption: symmetrical about zero
            let mut rpy_mix_min = 0f32;
            for i in 0..self.motor_count {
                let factor = self.active_factors[i];
                let mix = axis_pid[PITCH] * factor.pitch
                    + axis_pid[ROLL] * factor.roll
                    - yaw_direction * axis_pid[YAW] * factor.yaw;
                rpy_mix[i] = mix;
                if mix > rpy_mix_max {
                    rpy_mix_max = mix;
                }
                if mix < rpy_mix_min {
                    rpy_mix_min = mix;
                }
            }
            let rpy_mix_range = rpy_mix_max - rpy_mix_min;

            // Resolve the usable throttle band. 3D reads the raw stick so
            // min_check can't cut power, with hysteresis across the deadband.
            let throttle: i32;
            let mut throttle_min: i32;
            let mut throttle_max: i32;
            if feature_3d {
                if !armed {
                    // Always yields positive thrust direction after arming.
                    self.throttle_prev = mid_rc;
                }

                if rc_throttle <= mid_rc - deadband_throttle {
                    throttle_max = deadband_low;
                    throttle_min = min_throttle;
                    self.throttle_prev = rc_throttle;
                    throttle = rc_throttle;
                } else if rc_throttle >= mid_rc + deadband_throttle {
                    throttle_max = max_throttle;
                    throttle_min = deadband_high;
                    self.throttle_prev = rc_throttle;
                    throttle = rc_throttle;
                } else if self.throttle_prev <= mid_rc - deadband_throttle {
                    // In the deadband, coming from reverse.
                    throttle = deadband_low;
                    throttle_max = deadband_low;
                    throttle_min = min_throttle;
                } else {
                    // In the deadband, coming from forward.
                    throttle_max = max_throttle;
                    throttle = deadband_high;
                    throttle_min = deadband_high;
                }
            } else {
                throttle = inputs.rc_command[THROTTLE] as i32;
                throttle_min = min_throttle;
                throttle_max = max_throttle;
            }

            let throttle_range = throttle_max - throttle_min;

            if rpy_mix_range > throttle_range as f32 {
                #[cfg(feature = "defmt")]
                if !self.motor_limit_reached {
                    defmt::debug!("Attitude mix exceeds throttle range; rescaling");
                }
                self.motor_limit_reached = true;

                let mix_reduction = throttle_range as f32 / rpy_mix_range;
                for value in rpy_mix.iter_mut().take(self.motor_count) {
                    *value = (*value * mix_reduction).round();
                }
                // Past the configured saturation limit, trade throttle for
                // full correction authority by collapsing the band to its
                // center.
                if mix_reduction > mixer_cfg.airmode_saturation_limit as f32 / 100. {
                    let center = throttle_min + throttle_range / 2;
                    throttle_min = center;
                    throttle_max = center;
                }
            } else {
                self.motor_limit_reached = false;
                // Shrink the band so adding throttle can't re-clip the mix.
                let half_range = (rpy_mix_range / 2.) as i32;
                throttle_min += half_range;
                throttle_max -= half_range;
            }

            for i in 0..self.motor_count {
                let factor = self.active_factors[i];
                let throttle_part = constrain_f(
                    throttle as f32 * factor.throttle,
                    throttle_min as f32,
                    throttle_max as f32,
                );
                let mut motor = round_i32(rpy_mix[i] + throttle_part);

                if failsafe_active {
                    motor = constrain(motor, min_command, max_throttle);
                } else if feature_3d {
                    if self.throttle_prev <= mid_rc - deadband_throttle {
                        motor = constrain(motor, min_throttle, deadband_low);
                    } else {
                        motor = constrain(motor, deadband_high, max_throttle);
                    }
                } else {
                    motor = constrain(motor, min_throttle, max_throttle);
                }
                self.motors[i] = motor as u16;
            }
        } else {
            let throttle_cmd = inputs.rc_command[THROTTLE] as f32;

            let mut mixed = [0i32; MAX_MOTORS];
            for i in 0..self.motor_count {
                let factor = self.active_factors[i];
                mixed[i] = round_i32(
                    throttle_cmd * factor.throttle
                        + axis_pid[PITCH] * factor.pitch
                        + axis_pid[ROLL] * factor.roll
                        - yaw_direction * axis_pid[YAW] * factor.yaw,
                );
            }

            // If any motor overshoots max, shift all of them down by the
            // overshoot: one motor rides the ceiling and relative authority
            // is preserved.
            let mut max_motor = i32::MIN;
            for &value in mixed.iter().take(self.motor_count) {
                max_motor = max_motor.max(value);
            }
            let max_throttle_difference = if self.motor_count > 0 && max_motor > max_throttle {
                max_motor - max_throttle
            } else {
                0
            };

            for i in 0..self.motor_count {
                let mut motor = mixed[i] - max_throttle_difference;

                if feature_3d {
                    if mixer_cfg.pid_at_min_throttle
                        || rc_throttle <= mid_rc - deadband_throttle
                        || rc_throttle >= mid_rc + deadband_throttle
                    {
                        if rc_throttle > mid_rc {
                            motor = constrain(motor, deadband_high, max_throttle);
                        } else {
                            motor = constrain(motor, min_command, deadband_low);
                        }
                    } else if rc_throttle > mid_rc {
                        motor = deadband_high;
                    } else {
                        motor = deadband_low;
                    }
                } else if failsafe_active {
                    motor = constrain(motor, min_command, max_throttle);
                } else {
                    motor = constrain(motor, min_throttle, max_throttle);
                    // At idle stick: stop the motors outright if configured,
                    // otherwise optionally drop the stabilization terms.
                    if rc_throttle < rx_cfg.min_check as i32 {
                        if self.settings.features.motor_stop {
                            motor = min_command;
                        } else if !mixer_cfg.pid_at_min_throttle {
                            motor = min_throttle;
                        }
                    }
                }
                self.motors[i] = motor as u16;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MixerSettings, PwmTopology};
    use crate::geometry::AirframeKind;

    fn quad_state(settings: MixerSettings) -> MixerState {
        MixerState::new(
            AirframeKind::QuadX,
            settings,
            PwmTopology {
                servo_count: 0,
                loop_time_us: 1000,
            },
        )
        .unwrap()
    }

    fn armed_inputs() -> MixInputs {
        MixInputs {
            arm_status: ArmStatus::Armed,
            rc_data: [1500, 1500, 1500, 1500, 1500, 1500, 1500, 1500],
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_hover_passes_throttle_through() {
        let mut state = quad_state(MixerSettings::default());
        let mut inputs = armed_inputs();
        inputs.rc_command[THROTTLE] = 1500;

        state.mix(&inputs);
        assert_eq!(state.motors(), &[1500, 1500, 1500, 1500]);
    }

    #[test]
    fn test_pure_roll_mixes_per_geometry() {
        let mut state = quad_state(MixerSettings::default());
        let mut inputs = armed_inputs();
        inputs.rc_command[THROTTLE] = 1500;
        inputs.axis_pid[ROLL] = 100;

        state.mix(&inputs);
        // QuadX roll column: rear/front right drop, rear/front left rise.
        assert_eq!(state.motors(), &[1400, 1400, 1600, 1600]);
    }

    #[test]
    fn test_overshoot_shifts_all_motors_down() {
        let mut state = quad_state(MixerSettings::default());
        let mut inputs = armed_inputs();
        inputs.rc_command[THROTTLE] = 1950;
        inputs.axis_pid[ROLL] = 100;

        state.mix(&inputs);
        let max = *state.motors().iter().max().unwrap();
        assert_eq!(max, 2000);
        // Differential authority preserved: spread still 200.
        let min = *state.motors().iter().min().unwrap();
        assert_eq!(max - min, 200);
    }

    #[test]
    fn test_failsafe_clamps_arbitrary_pids() {
        let mut state = quad_state(MixerSettings::default());
        let mut inputs = armed_inputs();
        inputs.failsafe_active = true;
        inputs.rc_command[THROTTLE] = 1500;
        inputs.axis_pid[ROLL] = 10_000;

        state.mix(&inputs);
        for &motor in state.motors() {
            assert!(motor >= 1000);
            assert!(motor <= 2000);
        }
    }

    #[test]
    fn test_motor_stop_forces_min_command() {
        let mut settings = MixerSettings::default();
        settings.features.motor_stop = true;
        let mut state = quad_state(settings);

        let mut inputs = armed_inputs();
        inputs.rc_data[THROTTLE] = 1050; // below min_check
        inputs.rc_command[THROTTLE] = 1050;
        inputs.axis_pid = [50, -30, 20];

        state.mix(&inputs);
        assert_eq!(state.motors(), &[1000, 1000, 1000, 1000]);
    }

    #[test]
    fn test_idle_without_pid_at_min_throttle_pins_idle() {
        let mut settings = MixerSettings::default();
        settings.mixer.pid_at_min_throttle = false;
        let mut state = quad_state(settings);

        let mut inputs = armed_inputs();
        inputs.rc_data[THROTTLE] = 1050;
        inputs.rc_command[THROTTLE] = 1050;
        inputs.axis_pid = [200, 0, 0];

        state.mix(&inputs);
        assert_eq!(state.motors(), &[1100, 1100, 1100, 1100]);
    }

    #[test]
    fn test_yaw_jump_prevention_clamps_yaw_pid() {
        // Yaw PID of 800 against a centered stick and a 200 limit behaves
        // exactly like a 200 demand.
        let mut state = quad_state(MixerSettings::default());
        let mut inputs = armed_inputs();
        inputs.rc_command[THROTTLE] = 1500;
        inputs.axis_pid[YAW] = 800;
        state.mix(&inputs);
        let clamped = state.motors().to_vec();

        let mut reference = quad_state(MixerSettings::default());
        inputs.axis_pid[YAW] = 200;
        reference.mix(&inputs);
        assert_eq!(clamped, reference.motors());
    }

    #[test]
    fn test_yaw_stick_extends_jump_prevention_limit() {
        // With the pilot commanding yaw, the clamp widens by the stick value.
        let mut state = quad_state(MixerSettings::default());
        let mut inputs = armed_inputs();
        inputs.rc_command[THROTTLE] = 1500;
        inputs.rc_command[YAW] = 300;
        inputs.axis_pid[YAW] = 800;
        state.mix(&inputs);
        let widened = state.motors().to_vec();

        let mut reference = quad_state(MixerSettings::default());
        inputs.axis_pid[YAW] = 500;
        reference.mix(&inputs);
        assert_eq!(widened, reference.motors());
    }

    #[test]
    fn test_airmode_saturation_rescales_and_flags() {
        let mut state = quad_state(MixerSettings::default());
        let mut inputs = armed_inputs();
        inputs.airmode_active = true;
        inputs.rc_command[THROTTLE] = 1100;
        inputs.axis_pid[ROLL] = 500;

        state.mix(&inputs);
        assert!(state.motor_limit_reached());
        for &motor in state.motors() {
            assert!(motor >= 1100);
            assert!(motor <= 2000);
        }
        // Authority preservation: the scaled mix spans the full throttle
        // range (2000 - 1100), collapsed around the band center.
        let max = *state.motors().iter().max().unwrap() as i32;
        let min = *state.motors().iter().min().unwrap() as i32;
        assert_eq!(max - min, 900);
    }

    #[test]
    fn test_airmode_unsaturated_keeps_demand_exact() {
        let mut state = quad_state(MixerSettings::default());
        let mut inputs = armed_inputs();
        inputs.airmode_active = true;
        inputs.rc_command[THROTTLE] = 1500;
        inputs.axis_pid[ROLL] = 100;

        state.mix(&inputs);
        assert!(!state.motor_limit_reached());
        assert_eq!(state.motors(), &[1400, 1400, 1600, 1600]);
    }

    #[test]
    fn test_airmode_low_throttle_keeps_attitude_authority() {
        // The point of airmode: zero stick, yet attitude demands still act.
        let mut state = quad_state(MixerSettings::default());
        let mut inputs = armed_inputs();
        inputs.airmode_active = true;
        inputs.rc_command[THROTTLE] = 1100;
        inputs.axis_pid[ROLL] = 100;

        state.mix(&inputs);
        let max = *state.motors().iter().max().unwrap();
        let min = *state.motors().iter().min().unwrap();
        assert_eq!(max - min, 200);
        assert!(min >= 1100);
    }

    #[test]
    fn test_3d_deadband_hysteresis() {
        let mut settings = MixerSettings::default();
        settings.features.flight_3d = true;
        let mut state = quad_state(settings);

        let mut inputs = armed_inputs();
        inputs.airmode_active = true;

        // Reverse side: outputs confined to [min_throttle, deadband_low].
        inputs.rc_data[THROTTLE] = 1200;
        state.mix(&inputs);
        for &motor in state.motors() {
            assert!(motor >= 1100);
            assert!(motor <= 1406);
        }

        // Stick enters the deadband from below; direction must hold.
        inputs.rc_data[THROTTLE] = 1490;
        state.mix(&inputs);
        for &motor in state.motors() {
            assert!(motor <= 1406);
        }

        // Forward side.
        inputs.rc_data[THROTTLE] = 1700;
        state.mix(&inputs);
        for &motor in state.motors() {
            assert!(motor >= 1514);
            assert!(motor <= 2000);
        }

        // Deadband again, now coming from forward.
        inputs.rc_data[THROTTLE] = 1505;
        state.mix(&inputs);
        for &motor in state.motors() {
            assert!(motor >= 1514);
        }
    }

    #[test]
    fn test_3d_halves_attitude_gains() {
        let mut settings = MixerSettings::default();
        settings.features.flight_3d = true;
        let state = quad_state(settings);
        for factor in state.active_factors.iter().take(4) {
            assert_eq!(factor.roll.abs(), 0.5);
            assert_eq!(factor.pitch.abs(), 0.5);
            assert_eq!(factor.yaw.abs(), 0.5);
            assert_eq!(factor.throttle, 1.0);
        }
    }

    #[test]
    fn test_output_bounds_over_demand_grid() {
        let mut state = quad_state(MixerSettings::default());
        for &roll in &[-800i16, -200, 0, 200, 800] {
            for &throttle in &[1000i16, 1300, 1700, 2000] {
                for airmode in [false, true] {
                    let mut inputs = armed_inputs();
                    inputs.airmode_active = airmode;
                    inputs.axis_pid[ROLL] = roll;
                    inputs.rc_command[THROTTLE] = throttle;
                    inputs.rc_data[THROTTLE] = throttle as u16;
                    state.mix(&inputs);
                    for &motor in state.motors() {
                        assert!(motor >= 1000, "motor {motor} below min_command");
                        assert!(motor <= 2000, "motor {motor} above max_throttle");
                    }
                }
            }
        }
    }
}
