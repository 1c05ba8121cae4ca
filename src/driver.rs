//! The seam between the mixer and the PWM/DShot output hardware. The driver
//! owns timers and DMA; the mixer only hands it final command values. All
//! methods must be non-blocking and safe to call every loop iteration.

/// Outbound actuator interface. `motor` / `servo` indices are the physical
/// output positions, counted per the airframe's emission order.
pub trait PwmDriver {
    fn write_motor(&mut self, motor: usize, value: u16);

    fn write_servo(&mut self, servo: usize, value: u16);

    /// Latch the frame for protocols that buffer per-motor writes
    /// (ONESHOT125). Called once per cycle, after the last motor write.
    fn complete_oneshot_update(&mut self, motor_count: usize);

    /// Stop output pulses entirely, eg at shutdown.
    fn shutdown_pulses(&mut self, motor_count: usize);
}
