//! Optional servo output lowpass: one biquad section per servo, built at init
//! from the configured cutoff and loop period, applied after mixing and
//! before the driver write.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, Hertz, Type, Q_BUTTERWORTH_F32};

use crate::{MixerError, MAX_SERVOS};

#[derive(Clone)]
pub struct ServoLowpass {
    sections: [DirectForm2Transposed<f32>; MAX_SERVOS],
}

impl ServoLowpass {
    /// `loop_time_us` sets the sample rate; the cutoff must sit below
    /// Nyquist for it.
    pub fn new(cutoff_hz: f32, loop_time_us: u32) -> Result<Self, MixerError> {
        let sample_rate = 1_000_000. / loop_time_us as f32;
        let fs = Hertz::<f32>::from_hz(sample_rate).map_err(|_| MixerError::LowpassCutoff)?;
        let f0 = Hertz::<f32>::from_hz(cutoff_hz).map_err(|_| MixerError::LowpassCutoff)?;
        let coeffs = Coefficients::<f32>::from_params(Type::LowPass, fs, f0, Q_BUTTERWORTH_F32)
            .map_err(|_| MixerError::LowpassCutoff)?;

        Ok(Self {
            sections: core::array::from_fn(|_| DirectForm2Transposed::<f32>::new(coeffs)),
        })
    }

    pub fn apply(&mut self, servo: usize, value: f32) -> f32 {
        self.sections[servo].run(value)
    }
}
