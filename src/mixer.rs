//! Mixer state and the per-cycle dispatch. Construction resolves the active
//! geometry (static table or sentinel-terminated custom config) and validates
//! it; `mix` runs the fixed pipeline every loop iteration: tricopter tail
//! pre-hook, motor mix, disarm overwrite, servo mix, gimbal overlay, clamp,
//! lowpass. Motors always precede servos because motor 0 feeds the servo
//! input vector.

use crate::config::{MixerSettings, PwmTopology, DEFAULT_SERVO_MIDDLE};
use crate::driver::PwmDriver;
use crate::filter::ServoLowpass;
use crate::geometry::{
    AirframeKind, InputSource, MotorFactor, ServoRule, SERVO_BICOPTER_LEFT, SERVO_BICOPTER_RIGHT,
    SERVO_DUALCOPTER_LEFT, SERVO_DUALCOPTER_RIGHT, SERVO_FLAPPERON_1, SERVO_FLAPPERON_2,
    SERVO_GIMBAL_PITCH, SERVO_GIMBAL_ROLL, SERVO_PLANE_INDEX_MAX, SERVO_PLANE_INDEX_MIN,
    SERVO_RUDDER, SERVO_SINGLECOPTER_1, SERVO_SINGLECOPTER_4,
};
use crate::inputs::{ArmStatus, MixInputs, AUX1, MAX_AUX_CHANNELS};
use crate::tricopter::TriTail;
use crate::{MixerError, MAX_MOTORS, MAX_SERVOS, MAX_SERVO_RULES};

/// All mixer state: active geometry, per-cycle outputs, and the memory that
/// carries across cycles (rule slew, 3D throttle direction, virtual tail
/// servo). Owned exclusively by the control task; everything else sees
/// snapshots.
pub struct MixerState {
    pub(crate) airframe: AirframeKind,
    pub(crate) settings: MixerSettings,

    pub(crate) motor_count: usize,
    pub(crate) servo_count: usize,
    pub(crate) uses_servos: bool,

    /// Active mixing matrix; a copy, since 3D halves the attitude columns
    /// and the tricopter pre-hook rewrites row 0's throttle each cycle.
    pub(crate) active_factors: [MotorFactor; MAX_MOTORS],
    pub(crate) servo_rules: [ServoRule; MAX_SERVO_RULES],
    pub(crate) servo_rule_count: usize,

    pub(crate) motors: [u16; MAX_MOTORS],
    pub(crate) motors_disarmed: [u16; MAX_MOTORS],
    pub(crate) servos: [i16; MAX_SERVOS],
    pub(crate) servo_rule_outputs: [i16; MAX_SERVO_RULES],
    /// Last out-of-deadband throttle direction, for 3D hysteresis.
    pub(crate) throttle_prev: i32,
    pub(crate) motor_limit_reached: bool,

    pub(crate) tri: Option<TriTail>,
    pub(crate) lowpass: Option<ServoLowpass>,
}

impl MixerState {
    pub fn new(
        airframe: AirframeKind,
        settings: MixerSettings,
        topology: PwmTopology,
    ) -> Result<Self, MixerError> {
        let geometry = airframe.geometry();

        let mut active_factors = [MotorFactor::ZERO; MAX_MOTORS];
        let motor_count;
        if airframe.has_custom_motor_mix() {
            let mut count = 0;
            for row in settings.custom_motor_mix.iter() {
                if row.throttle == 0. {
                    break;
                }
                active_factors[count] = *row;
                count += 1;
            }
            if count == 0 {
                return Err(MixerError::EmptyCustomMix);
            }
            motor_count = count;
        } else {
            motor_count = geometry.motor_count;
            for (i, row) in geometry.motor_factors.iter().enumerate() {
                active_factors[i] = *row;
            }
        }

        if geometry.uses_servos && topology.servo_count == 0 {
            return Err(MixerError::MissingServos);
        }
        // Camstab forces the servo path even on motor-only frames.
        let uses_servos = geometry.uses_servos || settings.features.servo_tilt;

        let mut servo_rules = [ServoRule::INACTIVE; MAX_SERVO_RULES];
        let mut servo_rule_count = 0;
        if geometry.uses_servos {
            if airframe.has_custom_servo_rules() {
                for (index, raw) in settings.custom_servo_rules.iter().enumerate() {
                    if raw.rate == 0 {
                        break;
                    }
                    if raw.target as usize >= MAX_SERVOS {
                        return Err(MixerError::RuleTargetOutOfRange {
                            index,
                            target: raw.target,
                        });
                    }
                    let input = InputSource::try_from(raw.input).map_err(|_| {
                        MixerError::UnknownInputSource {
                            index,
                            input_source: raw.input,
                        }
                    })?;
                    servo_rules[servo_rule_count] = ServoRule {
                        target: raw.target,
                        input,
                        rate: raw.rate,
                        speed: raw.speed,
                        min: raw.min,
                        max: raw.max,
                        box_id: raw.box_id,
                    };
                    servo_rule_count += 1;
                }
            } else {
                for (i, rule) in geometry.servo_rules.iter().enumerate() {
                    servo_rules[i] = *rule;
                }
                servo_rule_count = geometry.servo_rules.len();
            }
        }

        // In 3D mode, mixer gain has to be halved.
        if settings.features.flight_3d && motor_count > 1 {
            for factor in active_factors.iter_mut().take(motor_count) {
                factor.pitch *= 0.5;
                factor.roll *= 0.5;
                factor.yaw *= 0.5;
            }
        }

        let tri = (airframe == AirframeKind::Tri).then(|| TriTail::new(&settings.mixer));

        let lowpass = if uses_servos && settings.mixer.servo_lowpass_enable {
            Some(ServoLowpass::new(
                settings.mixer.servo_lowpass_freq,
                topology.loop_time_us,
            )?)
        } else {
            None
        };

        let throttle_prev = settings.rx.mid_rc as i32;

        let mut state = Self {
            airframe,
            motor_count,
            servo_count: topology.servo_count.min(MAX_SERVOS),
            uses_servos,
            active_factors,
            servo_rules,
            servo_rule_count,
            motors: [0; MAX_MOTORS],
            motors_disarmed: [0; MAX_MOTORS],
            servos: [DEFAULT_SERVO_MIDDLE as i16; MAX_SERVOS],
            servo_rule_outputs: [0; MAX_SERVO_RULES],
            throttle_prev,
            motor_limit_reached: false,
            tri,
            lowpass,
            settings,
        };
        state.reset_disarmed_motors();

        #[cfg(feature = "defmt")]
        defmt::info!(
            "Mixer ready: {} motors, {} servo rules",
            state.motor_count as u8,
            state.servo_rule_count as u8
        );

        Ok(state)
    }

    /// Config-validation hook for the arming path: checks the constraints
    /// that only hold for sane configs but can't be enforced per-cycle.
    pub fn validate(&self) -> Result<(), MixerError> {
        if let Some(tail) = self.tri.as_ref() {
            tail.validate_yaw_curve()?;
        }
        Ok(())
    }

    /// One control cycle. Reads the input snapshot, leaves final commands in
    /// `motors` / `servos`; the caller emits them via `write_motors` /
    /// `write_servos`.
    pub fn mix(&mut self, inputs: &MixInputs) {
        if self.airframe == AirframeKind::Tri {
            // Retilt the rear motor's thrust share before mixing, using the
            // predicted tail angle (the servo value here is last cycle's;
            // the virtual-servo model closes the gap).
            if let Some(tail) = self.tri.as_ref() {
                let param = self.settings.servos[SERVO_RUDDER];
                self.active_factors[0].throttle =
                    tail.tail_motor_throttle_factor(&param, self.servos[SERVO_RUDDER] as i32);
            }
        }

        self.mix_motors(inputs);

        if inputs.arm_status != ArmStatus::Armed {
            for i in 0..self.motor_count {
                self.motors[i] = self.motors_disarmed[i];
            }
        }

        if self.uses_servos {
            if self.airframe.geometry().uses_servos {
                self.mix_servos(inputs);
            }
            if self.settings.features.servo_tilt {
                self.apply_gimbal_overlay(inputs);
            }
            self.clamp_servos();
            self.filter_servos();
        }
    }

    pub fn write_motors<D: PwmDriver>(&self, driver: &mut D) {
        for i in 0..self.motor_count {
            driver.write_motor(i, self.motors[i]);
        }
        if self.settings.features.oneshot125 {
            driver.complete_oneshot_update(self.motor_count);
        }
    }

    pub fn write_all_motors<D: PwmDriver>(&mut self, value: u16, driver: &mut D) {
        for i in 0..self.motor_count {
            self.motors[i] = value;
        }
        self.write_motors(driver);
    }

    /// Command the safe stop value on every motor. ESCs need tens of
    /// milliseconds to latch it; that delay belongs to the caller.
    pub fn stop_motors<D: PwmDriver>(&mut self, driver: &mut D) {
        let value = if self.settings.features.flight_3d {
            self.settings.flight_3d.neutral3d
        } else {
            self.settings.motors.min_command
        };
        self.write_all_motors(value, driver);
    }

    pub fn shutdown_pulses<D: PwmDriver>(&self, driver: &mut D) {
        driver.shutdown_pulses(self.motor_count);
    }

    /// Physical servo emission, in airframe-specific order: the frame's own
    /// servos first, then the gimbal pair, then forwarded aux channels.
    pub fn write_servos<D: PwmDriver>(&self, inputs: &MixInputs, driver: &mut D) {
        let mut index = 0;
        match self.airframe {
            AirframeKind::Bicopter => {
                driver.write_servo(index, self.servos[SERVO_BICOPTER_LEFT] as u16);
                index += 1;
                driver.write_servo(index, self.servos[SERVO_BICOPTER_RIGHT] as u16);
                index += 1;
            }
            AirframeKind::Tri | AirframeKind::CustomTri => {
                let value = if self.settings.mixer.tri_unarmed_servo
                    || inputs.arm_status == ArmStatus::Armed
                {
                    self.servos[SERVO_RUDDER] as u16
                } else {
                    // Kill the signal completely while disarmed.
                    0
                };
                driver.write_servo(index, value);
                index += 1;
            }
            AirframeKind::FlyingWing => {
                driver.write_servo(index, self.servos[SERVO_FLAPPERON_1] as u16);
                index += 1;
                driver.write_servo(index, self.servos[SERVO_FLAPPERON_2] as u16);
                index += 1;
            }
            AirframeKind::Dualcopter => {
                driver.write_servo(index, self.servos[SERVO_DUALCOPTER_LEFT] as u16);
                index += 1;
                driver.write_servo(index, self.servos[SERVO_DUALCOPTER_RIGHT] as u16);
                index += 1;
            }
            AirframeKind::Airplane | AirframeKind::CustomAirplane => {
                for i in SERVO_PLANE_INDEX_MIN..=SERVO_PLANE_INDEX_MAX {
                    driver.write_servo(index, self.servos[i] as u16);
                    index += 1;
                }
            }
            AirframeKind::Singlecopter => {
                for i in SERVO_SINGLECOPTER_1..=SERVO_SINGLECOPTER_4 {
                    driver.write_servo(index, self.servos[i] as u16);
                    index += 1;
                }
            }
            _ => {}
        }

        if self.settings.features.servo_tilt || self.airframe == AirframeKind::Gimbal {
            driver.write_servo(index, self.servos[SERVO_GIMBAL_PITCH] as u16);
            index += 1;
            driver.write_servo(index, self.servos[SERVO_GIMBAL_ROLL] as u16);
            index += 1;
        }

        // Forwarded aux channels go out raw, unconstrained.
        if self.settings.features.channel_forwarding {
            for offset in 0..MAX_AUX_CHANNELS {
                driver.write_servo(index + offset, inputs.rc_data[AUX1 + offset]);
            }
        }
    }

    /// Refresh the disarmed motor commands from config: 3D neutral when 3D is
    /// enabled, otherwise `min_command`. Call again if the 3D feature
    /// toggles.
    pub fn reset_disarmed_motors(&mut self) {
        let value = if self.settings.features.flight_3d {
            self.settings.flight_3d.neutral3d
        } else {
            self.settings.motors.min_command
        };
        for motor in self.motors_disarmed.iter_mut() {
            *motor = value;
        }
    }

    /// Override one motor's disarmed command (eg for prop-less bench tests).
    pub fn set_disarmed_motor(&mut self, motor: usize, value: u16) {
        if motor < self.motor_count {
            self.motors_disarmed[motor] = value;
        }
    }

    pub fn airframe(&self) -> AirframeKind {
        self.airframe
    }

    pub fn motor_count(&self) -> usize {
        self.motor_count
    }

    pub fn servo_count(&self) -> usize {
        self.servo_count
    }

    pub fn uses_servos(&self) -> bool {
        self.uses_servos
    }

    /// Final motor commands of the last cycle.
    pub fn motors(&self) -> &[u16] {
        &self.motors[..self.motor_count]
    }

    /// Logical servo values of the last cycle (indexed by the `SERVO_*`
    /// constants, not emission order).
    pub fn servos(&self) -> &[i16; MAX_SERVOS] {
        &self.servos
    }

    /// Whether the last airmode cycle had to rescale the attitude mix.
    /// Observable by other subsystems (eg blackbox, OSD); non-fatal.
    pub fn motor_limit_reached(&self) -> bool {
        self.motor_limit_reached
    }

    /// A rule's slewed working value, for diagnostics.
    pub fn rule_output(&self, rule: usize) -> i16 {
        self.servo_rule_outputs[rule]
    }

    pub fn tri_tail(&self) -> Option<&TriTail> {
        self.tri.as_ref()
    }
}
