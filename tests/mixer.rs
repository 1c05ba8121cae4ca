//! End-to-end scenarios through the public API: mix a cycle, emit through a
//! recording PWM driver, check the exact commands on the wire.

use accipiter::geometry::{SERVO_GIMBAL_PITCH, SERVO_GIMBAL_ROLL};
use accipiter::inputs::{AUX1, ROLL, THROTTLE, YAW};
use accipiter::{
    AirframeKind, ArmStatus, MixInputs, MixerSettings, MixerState, PwmDriver, PwmTopology,
};

#[derive(Default)]
struct RecordingPwm {
    motors: Vec<(usize, u16)>,
    servos: Vec<(usize, u16)>,
    oneshot_completed: Option<usize>,
    shutdown: Option<usize>,
}

impl PwmDriver for RecordingPwm {
    fn write_motor(&mut self, motor: usize, value: u16) {
        self.motors.push((motor, value));
    }

    fn write_servo(&mut self, servo: usize, value: u16) {
        self.servos.push((servo, value));
    }

    fn complete_oneshot_update(&mut self, motor_count: usize) {
        self.oneshot_completed = Some(motor_count);
    }

    fn shutdown_pulses(&mut self, motor_count: usize) {
        self.shutdown = Some(motor_count);
    }
}

fn topology() -> PwmTopology {
    PwmTopology {
        servo_count: 8,
        loop_time_us: 1000,
    }
}

fn armed_inputs() -> MixInputs {
    MixInputs {
        arm_status: ArmStatus::Armed,
        rc_data: [1500, 1500, 1500, 1500, 1500, 1500, 1500, 1500],
        ..Default::default()
    }
}

#[test]
fn quad_hover_emits_throttle_on_all_motors() {
    let mut mixer =
        MixerState::new(AirframeKind::QuadX, MixerSettings::default(), topology()).unwrap();
    let mut pwm = RecordingPwm::default();

    let mut inputs = armed_inputs();
    inputs.rc_command[THROTTLE] = 1500;
    mixer.mix(&inputs);
    mixer.write_motors(&mut pwm);

    assert_eq!(
        pwm.motors,
        vec![(0, 1500), (1, 1500), (2, 1500), (3, 1500)]
    );
    assert_eq!(pwm.oneshot_completed, None);
}

#[test]
fn quad_roll_demand_splits_left_right() {
    let mut mixer =
        MixerState::new(AirframeKind::QuadX, MixerSettings::default(), topology()).unwrap();
    let mut pwm = RecordingPwm::default();

    let mut inputs = armed_inputs();
    inputs.rc_command[THROTTLE] = 1500;
    inputs.axis_pid[ROLL] = 100;
    mixer.mix(&inputs);
    mixer.write_motors(&mut pwm);

    assert_eq!(
        pwm.motors,
        vec![(0, 1400), (1, 1400), (2, 1600), (3, 1600)]
    );
}

#[test]
fn overshoot_rebalances_without_exceeding_max() {
    let mut mixer =
        MixerState::new(AirframeKind::QuadX, MixerSettings::default(), topology()).unwrap();

    let mut inputs = armed_inputs();
    inputs.rc_command[THROTTLE] = 1950;
    inputs.axis_pid[ROLL] = 100;
    mixer.mix(&inputs);

    assert_eq!(mixer.motors(), &[1800, 1800, 2000, 2000]);
}

#[test]
fn disarmed_quad_emits_min_command() {
    let mut mixer =
        MixerState::new(AirframeKind::QuadX, MixerSettings::default(), topology()).unwrap();
    let mut pwm = RecordingPwm::default();

    let mut inputs = MixInputs::default();
    inputs.axis_pid = [500, 500, 500];
    inputs.rc_command[THROTTLE] = 2000;
    mixer.mix(&inputs);
    mixer.write_motors(&mut pwm);

    assert_eq!(
        pwm.motors,
        vec![(0, 1000), (1, 1000), (2, 1000), (3, 1000)]
    );
}

#[test]
fn failsafe_bounds_hold_for_wild_pids() {
    let mut mixer =
        MixerState::new(AirframeKind::QuadX, MixerSettings::default(), topology()).unwrap();

    let mut inputs = armed_inputs();
    inputs.failsafe_active = true;
    inputs.rc_command[THROTTLE] = 1800;
    inputs.axis_pid = [10_000, 0, 0];
    mixer.mix(&inputs);

    for &motor in mixer.motors() {
        assert!((1000..=2000).contains(&motor));
    }
}

#[test]
fn airmode_saturation_flags_and_fits_band() {
    let mut mixer =
        MixerState::new(AirframeKind::QuadX, MixerSettings::default(), topology()).unwrap();

    let mut inputs = armed_inputs();
    inputs.airmode_active = true;
    inputs.rc_command[THROTTLE] = 1100;
    inputs.axis_pid[ROLL] = 500;
    mixer.mix(&inputs);

    assert!(mixer.motor_limit_reached());
    let min = *mixer.motors().iter().min().unwrap();
    let max = *mixer.motors().iter().max().unwrap();
    assert!(min >= 1100);
    assert!(max <= 2000);
}

#[test]
fn oneshot_latch_follows_motor_writes() {
    let mut settings = MixerSettings::default();
    settings.features.oneshot125 = true;
    let mut mixer = MixerState::new(AirframeKind::QuadX, settings, topology()).unwrap();
    let mut pwm = RecordingPwm::default();

    mixer.mix(&armed_inputs());
    mixer.write_motors(&mut pwm);
    assert_eq!(pwm.oneshot_completed, Some(4));
}

#[test]
fn stop_and_shutdown_sequences() {
    let mut mixer =
        MixerState::new(AirframeKind::QuadX, MixerSettings::default(), topology()).unwrap();
    let mut pwm = RecordingPwm::default();

    mixer.stop_motors(&mut pwm);
    assert_eq!(
        pwm.motors,
        vec![(0, 1000), (1, 1000), (2, 1000), (3, 1000)]
    );

    mixer.shutdown_pulses(&mut pwm);
    assert_eq!(pwm.shutdown, Some(4));
}

#[test]
fn airplane_emits_five_surfaces_in_order() {
    let mut mixer =
        MixerState::new(AirframeKind::Airplane, MixerSettings::default(), topology()).unwrap();
    let mut pwm = RecordingPwm::default();

    let mut inputs = armed_inputs();
    inputs.rc_command[THROTTLE] = 1000;
    mixer.mix(&inputs);
    mixer.write_servos(&inputs, &mut pwm);

    // flapperon 1, flapperon 2, rudder, elevator, throttle
    assert_eq!(pwm.servos.len(), 5);
    assert_eq!(
        pwm.servos.iter().map(|&(i, _)| i).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    // Neutral demands leave the surfaces at middle.
    assert_eq!(pwm.servos[0].1, 1500);
    assert_eq!(pwm.servos[2].1, 1500);
}

#[test]
fn tricopter_rudder_killed_when_disarmed_without_unarmed_servo() {
    let mut settings = MixerSettings::default();
    settings.mixer.tri_unarmed_servo = false;
    let mut mixer = MixerState::new(AirframeKind::Tri, settings, topology()).unwrap();
    let mut pwm = RecordingPwm::default();

    let inputs = MixInputs::default();
    mixer.mix(&inputs);
    mixer.write_servos(&inputs, &mut pwm);
    assert_eq!(pwm.servos, vec![(0, 0)]);

    // Armed again, the rudder signal returns.
    let mut pwm = RecordingPwm::default();
    let inputs = armed_inputs();
    mixer.mix(&inputs);
    mixer.write_servos(&inputs, &mut pwm);
    assert_eq!(pwm.servos.len(), 1);
    assert!(pwm.servos[0].1 >= 1000);
}

#[test]
fn tricopter_unarmed_servo_stays_live_by_default() {
    let mut mixer =
        MixerState::new(AirframeKind::Tri, MixerSettings::default(), topology()).unwrap();
    let mut pwm = RecordingPwm::default();

    let inputs = MixInputs::default();
    mixer.mix(&inputs);
    mixer.write_servos(&inputs, &mut pwm);
    assert_eq!(pwm.servos.len(), 1);
    assert!(pwm.servos[0].1 >= 1000);
}

#[test]
fn gimbal_and_forwarding_extend_the_servo_tail() {
    let mut settings = MixerSettings::default();
    settings.features.servo_tilt = true;
    settings.features.channel_forwarding = true;
    let mut mixer = MixerState::new(AirframeKind::QuadX, settings, topology()).unwrap();
    let mut pwm = RecordingPwm::default();

    let mut inputs = armed_inputs();
    inputs.rc_data[AUX1] = 1234;
    inputs.rc_data[AUX1 + 3] = 1876;
    mixer.mix(&inputs);
    mixer.write_servos(&inputs, &mut pwm);

    // Gimbal pair first (positions 0-1), then four forwarded aux channels.
    assert_eq!(pwm.servos.len(), 6);
    assert_eq!(pwm.servos[0], (0, 1500));
    assert_eq!(pwm.servos[1], (1, 1500));
    assert_eq!(pwm.servos[2], (2, 1234));
    assert_eq!(pwm.servos[5], (5, 1876));
}

#[test]
fn camstab_moves_gimbal_servos_with_attitude() {
    let mut settings = MixerSettings::default();
    settings.features.servo_tilt = true;
    let mut mixer = MixerState::new(AirframeKind::QuadX, settings, topology()).unwrap();

    let mut inputs = armed_inputs();
    inputs.camstab_active = true;
    inputs.attitude.pitch = 250;
    inputs.attitude.roll = -250;
    mixer.mix(&inputs);

    assert_eq!(mixer.servos()[SERVO_GIMBAL_PITCH], 2000);
    assert_eq!(mixer.servos()[SERVO_GIMBAL_ROLL], 1000);
}

#[test]
fn rule_slew_advances_five_units_per_cycle() {
    use accipiter::config::CustomServoRule;
    use accipiter::InputSource;

    let mut settings = MixerSettings::default();
    settings.custom_motor_mix[0].throttle = 1.;
    settings.custom_servo_rules[0] = CustomServoRule {
        target: 0,
        input: InputSource::RcRoll as u8,
        rate: 100,
        speed: 5,
        min: 0,
        max: 100,
        box_id: 0,
    };
    let mut mixer = MixerState::new(AirframeKind::CustomTri, settings, topology()).unwrap();

    let mut inputs = armed_inputs();
    inputs.rc_data[ROLL] = 1700;

    for cycle in 1i16..=8 {
        mixer.mix(&inputs);
        assert_eq!(mixer.rule_output(0), 5 * cycle);
    }
}

#[test]
fn servo_lowpass_converges_and_respects_limits() {
    let mut settings = MixerSettings::default();
    settings.mixer.servo_lowpass_enable = true;
    settings.mixer.servo_lowpass_freq = 50.;
    let mut mixer = MixerState::new(AirframeKind::Airplane, settings, topology()).unwrap();

    let mut inputs = armed_inputs();
    inputs.axis_pid[YAW] = 300;
    inputs.rc_command[THROTTLE] = 1000;

    for _ in 0..3000 {
        mixer.mix(&inputs);
        let rudder = mixer.servos()[accipiter::geometry::SERVO_RUDDER];
        assert!((1000..=2000).contains(&rudder));
    }
    // A steady 300 yaw demand settles near 1800 after the filter warms up.
    let rudder = mixer.servos()[accipiter::geometry::SERVO_RUDDER];
    assert!((rudder - 1800).abs() <= 2, "rudder settled at {rudder}");
}

#[test]
fn three_d_disarm_uses_neutral_and_deadband_direction_resets() {
    let mut settings = MixerSettings::default();
    settings.features.flight_3d = true;
    let mut mixer = MixerState::new(AirframeKind::QuadX, settings, topology()).unwrap();

    // Disarmed in 3D: neutral, not min_command.
    let mut inputs = MixInputs::default();
    inputs.airmode_active = true;
    inputs.rc_data[THROTTLE] = 1500;
    mixer.mix(&inputs);
    assert_eq!(mixer.motors(), &[1460, 1460, 1460, 1460]);

    // Arming with the stick inside the deadband: direction defaults to
    // forward, since the disarmed cycles parked the hysteresis at mid.
    inputs.arm_status = ArmStatus::Armed;
    mixer.mix(&inputs);
    for &motor in mixer.motors() {
        assert!(motor >= 1514);
    }

    // Pull into reverse, then return to the deadband: direction holds.
    inputs.rc_data[THROTTLE] = 1200;
    mixer.mix(&inputs);
    for &motor in mixer.motors() {
        assert!(motor <= 1406);
    }
    inputs.rc_data[THROTTLE] = 1500;
    mixer.mix(&inputs);
    for &motor in mixer.motors() {
        assert!(motor <= 1406);
    }
}
