//! Programmable servo mixing: a fixed input vector of stabilized axes,
//! derived throttle, gimbal attitude and raw RC offsets, pushed through the
//! active ruleset into per-servo accumulators, then rate-scaled, offset by
//! middle (or a forwarded channel) and clamped to calibration limits.
//!
//! Rule slew memory (`servo_rule_outputs`) persists across cycles; a rule
//! gated off by its mode switch resets its memory so slewing restarts from
//! zero on reactivation.

use crate::config::{GimbalMode, CHANNEL_FORWARDING_DISABLED};
use crate::geometry::{
    AirframeKind, InputSource, INPUT_SOURCE_COUNT, SERVO_GIMBAL_PITCH, SERVO_GIMBAL_ROLL,
    SERVO_RUDDER,
};
use crate::inputs::{ArmStatus, MixInputs, AUX1, PITCH, ROLL, THROTTLE, YAW};
use crate::mixer::MixerState;
use crate::util::{constrain, constrain_f, round_i32, scale_range};
use crate::MAX_SERVOS;

impl MixerState {
    pub(crate) fn mix_servos(&mut self, inputs: &MixInputs) {
        let input = self.servo_input_vector(inputs);

        for servo in self.servos.iter_mut() {
            *servo = 0;
        }

        for i in 0..self.servo_rule_count {
            let mix_rule = self.servo_rules[i];
            if !(mix_rule.box_id == 0 || inputs.servo_box_active(mix_rule.box_id)) {
                self.servo_rule_outputs[i] = 0;
                continue;
            }

            let target = mix_rule.target as usize;
            let from = mix_rule.input as usize;
            let param = self.settings.servos[target];

            let servo_width = param.max as f32 - param.min as f32;
            let low = mix_rule.min as f32 * servo_width / 100. - servo_width / 2.;
            let high = mix_rule.max as f32 * servo_width / 100. - servo_width / 2.;

            let demand = input[from];
            let current = if mix_rule.speed == 0 {
                self.servo_rule_outputs[i] = demand;
                demand
            } else {
                // Walk toward the demand by at most `speed` units per cycle.
                let step = mix_rule.speed as i16;
                let previous = self.servo_rule_outputs[i];
                let next = if previous < demand {
                    (previous + step).min(demand)
                } else if previous > demand {
                    (previous - step).max(demand)
                } else {
                    previous
                };
                self.servo_rule_outputs[i] = next;
                next
            };

            let direction = if param.reversed_sources & (1 << from) != 0 {
                -1.
            } else {
                1.
            };
            let contribution =
                constrain_f(current as f32 * mix_rule.rate as f32 / 100., low, high);
            self.servos[target] += round_i32(direction * contribution) as i16;
        }

        for i in 0..MAX_SERVOS {
            let param = self.settings.servos[i];
            let scaled = round_i32(param.rate as f32 * self.servos[i] as f32 / 100.);
            self.servos[i] = (scaled + self.servo_middle_or_forward(i, inputs) as i32) as i16;
        }

        if self.airframe == AirframeKind::Tri {
            if let Some(tail) = self.tri.as_mut() {
                let param = self.settings.servos[SERVO_RUDDER];
                if inputs.arm_status == ArmStatus::Armed {
                    // Linearize yaw authority; only while armed, so bench
                    // movements show the raw command.
                    self.servos[SERVO_RUDDER] =
                        tail.linear_servo_value(&param, self.servos[SERVO_RUDDER] as i32) as i16;
                }
                tail.virtual_servo_step(inputs.dt, &param, self.servos[SERVO_RUDDER] as i32);
            }
        }
    }

    /// Assemble the rule input vector, all on the ±500 scale.
    fn servo_input_vector(&self, inputs: &MixInputs) -> [i16; INPUT_SOURCE_COUNT] {
        let mut input = [0i16; INPUT_SOURCE_COUNT];

        if inputs.passthrough_active {
            // Sticks straight to the surfaces.
            input[InputSource::StabilizedRoll as usize] = inputs.rc_command[ROLL];
            input[InputSource::StabilizedPitch as usize] = inputs.rc_command[PITCH];
            input[InputSource::StabilizedYaw as usize] = inputs.rc_command[YAW];
        } else {
            input[InputSource::StabilizedRoll as usize] = inputs.axis_pid[ROLL];
            input[InputSource::StabilizedPitch as usize] = inputs.axis_pid[PITCH];
            input[InputSource::StabilizedYaw as usize] = inputs.axis_pid[YAW];

            // Reverse yaw servo when props are inverted in 3D.
            if self.settings.features.flight_3d
                && (inputs.rc_data[THROTTLE] as i32) < self.settings.rx.mid_rc as i32
            {
                input[InputSource::StabilizedYaw as usize] =
                    -input[InputSource::StabilizedYaw as usize];
            }
        }

        input[InputSource::GimbalPitch as usize] =
            scale_range(inputs.attitude.pitch as i32, -1800, 1800, -500, 500) as i16;
        input[InputSource::GimbalRoll as usize] =
            scale_range(inputs.attitude.roll as i32, -1800, 1800, -500, 500) as i16;

        // Motor 0 is 1000-2000 (command or mincommand); recenter to ±500.
        input[InputSource::StabilizedThrottle as usize] = (self.motors[0] as i32 - 1000 - 500) as i16;

        let mid_rc = self.settings.rx.mid_rc as i32;
        input[InputSource::RcRoll as usize] = (inputs.rc_data[ROLL] as i32 - mid_rc) as i16;
        input[InputSource::RcPitch as usize] = (inputs.rc_data[PITCH] as i32 - mid_rc) as i16;
        input[InputSource::RcYaw as usize] = (inputs.rc_data[YAW] as i32 - mid_rc) as i16;
        input[InputSource::RcThrottle as usize] = (inputs.rc_data[THROTTLE] as i32 - mid_rc) as i16;
        input[InputSource::RcAux1 as usize] = (inputs.rc_data[AUX1] as i32 - mid_rc) as i16;
        input[InputSource::RcAux2 as usize] = (inputs.rc_data[AUX1 + 1] as i32 - mid_rc) as i16;
        input[InputSource::RcAux3 as usize] = (inputs.rc_data[AUX1 + 2] as i32 - mid_rc) as i16;
        input[InputSource::RcAux4 as usize] = (inputs.rc_data[AUX1 + 3] as i32 - mid_rc) as i16;

        input
    }

    /// A servo's resting value: its calibrated middle, or a raw RC channel if
    /// forwarding is configured for it.
    pub(crate) fn servo_middle_or_forward(&self, servo: usize, inputs: &MixInputs) -> i16 {
        let param = self.settings.servos[servo];
        let channel = param.forward_from_channel;
        if channel != CHANNEL_FORWARDING_DISABLED && (channel as usize) < inputs.rc_data.len() {
            inputs.rc_data[channel as usize] as i16
        } else {
            param.middle as i16
        }
    }

    /// Camera-stabilization overlay: gimbal servos recentered, then driven by
    /// attitude when the camstab switch is on.
    pub(crate) fn apply_gimbal_overlay(&mut self, inputs: &MixInputs) {
        let pitch_rate = self.settings.servos[SERVO_GIMBAL_PITCH].rate as i32;
        let roll_rate = self.settings.servos[SERVO_GIMBAL_ROLL].rate as i32;

        self.servos[SERVO_GIMBAL_PITCH] = self.servo_middle_or_forward(SERVO_GIMBAL_PITCH, inputs);
        self.servos[SERVO_GIMBAL_ROLL] = self.servo_middle_or_forward(SERVO_GIMBAL_ROLL, inputs);

        if inputs.camstab_active {
            let pitch = inputs.attitude.pitch as i32;
            let roll = inputs.attitude.roll as i32;

            match self.settings.gimbal.mode {
                GimbalMode::MixTilt => {
                    // Signs are the tilt-mix geometry; see the regression
                    // tests before touching them.
                    let pitch_term = -pitch_rate * pitch / 50;
                    let roll_term = roll_rate * roll / 50;
                    self.servos[SERVO_GIMBAL_PITCH] =
                        (self.servos[SERVO_GIMBAL_PITCH] as i32 - (pitch_term - roll_term)) as i16;
                    self.servos[SERVO_GIMBAL_ROLL] =
                        (self.servos[SERVO_GIMBAL_ROLL] as i32 + (pitch_term + roll_term)) as i16;
                }
                GimbalMode::Normal => {
                    self.servos[SERVO_GIMBAL_PITCH] =
                        (self.servos[SERVO_GIMBAL_PITCH] as i32 + pitch_rate * pitch / 50) as i16;
                    self.servos[SERVO_GIMBAL_ROLL] =
                        (self.servos[SERVO_GIMBAL_ROLL] as i32 + roll_rate * roll / 50) as i16;
                }
            }
        }
    }

    /// Final defense: every servo inside its calibrated travel.
    pub(crate) fn clamp_servos(&mut self) {
        for i in 0..MAX_SERVOS {
            let param = self.settings.servos[i];
            self.servos[i] =
                constrain(self.servos[i] as i32, param.min as i32, param.max as i32) as i16;
        }
    }

    /// Optional output lowpass, re-clamped against filter ringing.
    pub(crate) fn filter_servos(&mut self) {
        let params = self.settings.servos;
        if let Some(lowpass) = self.lowpass.as_mut() {
            for i in 0..MAX_SERVOS {
                let filtered = lowpass.apply(i, self.servos[i] as f32);
                self.servos[i] = constrain(
                    round_i32(filtered),
                    params[i].min as i32,
                    params[i].max as i32,
                ) as i16;
            }
        }
    }
}
