// Copyright 2025
//
// This file is part of the vtm crate.
//
// vtm is free software: you can redistribute it and/or modify it under the terms
// of the GNU Lesser General Public License as published by the Free Software Foundation, either
// version 2.1 of the License, or (at your option) any later version.
//
// vtm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See
// the GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License along with vtm.
// If not, see <https://www.gnu.org/licenses/>.

//! Scalar single-channel IIR filters used at the boundaries, in the frication path, and for
//! noise shaping.

use crate::error::FilterError;
use crate::float::VtmFloat;
use std::f64::consts::PI;

/// A single-channel filter that can be driven one sample at a time.
pub trait Filter<F: VtmFloat> {
    fn reset(&mut self);
    fn filter(&mut self, x: F) -> F;
}

/// A variable one-zero, one-pole highpass filter whose cutoff is set by an aperture
/// coefficient. Used for the radiated (transmitted) component at the mouth and nose.
#[derive(Copy, Clone, Debug)]
pub struct RadiationFilter<F: VtmFloat> {
    b0: F,
    b1: F,
    a1: F,
    x1: F,
    y1: F,
}

impl<F: VtmFloat> RadiationFilter<F> {
    pub fn new() -> Self {
        Self {
            b0: F::zero(),
            b1: F::zero(),
            a1: F::zero(),
            x1: F::zero(),
            y1: F::zero(),
        }
    }

    /// Recomputes the filter coefficients for a new aperture coefficient.
    pub fn update(&mut self, aperture_coeff: F) {
        self.b0 = aperture_coeff;
        self.b1 = -aperture_coeff;
        self.a1 = -aperture_coeff;
    }
}

impl<F: VtmFloat> Default for RadiationFilter<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: VtmFloat> Filter<F> for RadiationFilter<F> {
    fn reset(&mut self) {
        self.x1 = F::zero();
        self.y1 = F::zero();
    }

    fn filter(&mut self, x: F) -> F {
        let y = self.b0 * x + self.b1 * self.x1 - self.a1 * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }
}

/// A variable one-pole lowpass filter whose cutoff is set by an aperture coefficient. Used
/// for the reflected component at the mouth and nose.
#[derive(Copy, Clone, Debug)]
pub struct ReflectionFilter<F: VtmFloat> {
    b0: F,
    a1: F,
    y1: F,
}

impl<F: VtmFloat> ReflectionFilter<F> {
    pub fn new() -> Self {
        Self {
            b0: F::zero(),
            a1: F::zero(),
            y1: F::zero(),
        }
    }

    /// Recomputes the filter coefficients for a new aperture coefficient.
    pub fn update(&mut self, aperture_coeff: F) {
        self.b0 = F::one() - aperture_coeff.abs();
        self.a1 = -aperture_coeff;
    }
}

impl<F: VtmFloat> Default for ReflectionFilter<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: VtmFloat> Filter<F> for ReflectionFilter<F> {
    fn reset(&mut self) {
        self.y1 = F::zero();
    }

    fn filter(&mut self, x: F) -> F {
        let y = self.b0 * x - self.a1 * self.y1;
        self.y1 = y;
        y
    }
}

/// A two-pole, two-zero bandpass filter with variable center frequency and bandwidth,
/// designed by a tan-warped bilinear transform. Coefficients are recomputed only when the
/// driving parameters change.
#[derive(Copy, Clone, Debug)]
pub struct BandpassFilter<F: VtmFloat> {
    b0: F,
    a1: F,
    a2: F,
    x1: F,
    x2: F,
    y1: F,
    y2: F,
    prev_sample_rate: F,
    prev_bandwidth: F,
    prev_center_freq: F,
}

impl<F: VtmFloat> BandpassFilter<F> {
    pub fn new() -> Self {
        Self {
            b0: F::zero(),
            a1: F::zero(),
            a2: F::zero(),
            x1: F::zero(),
            x2: F::zero(),
            y1: F::zero(),
            y2: F::zero(),
            prev_sample_rate: F::from_f64(-1.0),
            prev_bandwidth: F::from_f64(-1.0),
            prev_center_freq: F::from_f64(-1.0),
        }
    }

    pub fn update(&mut self, sample_rate: F, bandwidth: F, center_freq: F) {
        if sample_rate == self.prev_sample_rate
            && bandwidth == self.prev_bandwidth
            && center_freq == self.prev_center_freq
        {
            return;
        }
        self.prev_sample_rate = sample_rate;
        self.prev_bandwidth = bandwidth;
        self.prev_center_freq = center_freq;

        let pi = F::from_f64(PI);
        let t = F::one() / sample_rate;
        let tan_value = (pi * bandwidth * t).tan();
        let cos_value = (F::from_f64(2.0) * pi * center_freq * t).cos();
        self.a2 = (F::one() - tan_value) / (F::one() + tan_value);
        self.a1 = -(F::one() + self.a2) * cos_value;
        self.b0 = F::from_f64(0.5) - F::from_f64(0.5) * self.a2;
    }
}

impl<F: VtmFloat> Default for BandpassFilter<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: VtmFloat> Filter<F> for BandpassFilter<F> {
    fn reset(&mut self) {
        self.x1 = F::zero();
        self.x2 = F::zero();
        self.y1 = F::zero();
        self.y2 = F::zero();
        self.prev_sample_rate = F::from_f64(-1.0);
        self.prev_bandwidth = F::from_f64(-1.0);
        self.prev_center_freq = F::from_f64(-1.0);
    }

    fn filter(&mut self, x: F) -> F {
        let y = self.b0 * (x - self.x2) - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

const BUTTERWORTH_MIN_FREQ: f64 = 1.0;
const BUTTERWORTH_MAX_FREQ_COEF: f64 = 0.48;

/// A first-order Butterworth lowpass filter, used to shape the noise sources in waveguide
/// variant 5.
#[derive(Copy, Clone, Debug)]
pub struct Butterworth1Lowpass<F: VtmFloat> {
    b0: F,
    a1: F,
    x1: F,
    y1: F,
}

impl<F: VtmFloat> Butterworth1Lowpass<F> {
    pub fn new() -> Self {
        Self {
            b0: F::zero(),
            a1: F::zero(),
            x1: F::zero(),
            y1: F::zero(),
        }
    }

    pub fn update(&mut self, sample_rate: F, cutoff_freq: F) -> Result<(), FilterError> {
        validate_cutoff(sample_rate, cutoff_freq)?;
        let pi = F::from_f64(PI);
        let wc_t = F::from_f64(2.0) * (pi * cutoff_freq / sample_rate).tan();
        let c1 = F::one() / (wc_t + F::from_f64(2.0));
        self.b0 = c1 * wc_t;
        self.a1 = c1 * (wc_t - F::from_f64(2.0));
        Ok(())
    }
}

impl<F: VtmFloat> Default for Butterworth1Lowpass<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: VtmFloat> Filter<F> for Butterworth1Lowpass<F> {
    fn reset(&mut self) {
        self.x1 = F::zero();
        self.y1 = F::zero();
    }

    fn filter(&mut self, x: F) -> F {
        let y = self.b0 * (x + self.x1) - self.a1 * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }
}

/// A second-order Butterworth lowpass filter, used to shape the noise sources in waveguide
/// variant 5.
#[derive(Copy, Clone, Debug)]
pub struct Butterworth2Lowpass<F: VtmFloat> {
    b0: F,
    b1: F,
    a1: F,
    a2: F,
    x1: F,
    x2: F,
    y1: F,
    y2: F,
}

impl<F: VtmFloat> Butterworth2Lowpass<F> {
    pub fn new() -> Self {
        Self {
            b0: F::zero(),
            b1: F::zero(),
            a1: F::zero(),
            a2: F::zero(),
            x1: F::zero(),
            x2: F::zero(),
            y1: F::zero(),
            y2: F::zero(),
        }
    }

    pub fn update(&mut self, sample_rate: F, cutoff_freq: F) -> Result<(), FilterError> {
        validate_cutoff(sample_rate, cutoff_freq)?;
        let pi = F::from_f64(PI);
        let wc_t = F::from_f64(2.0) * (pi * cutoff_freq / sample_rate).tan();
        let wc2_t2 = wc_t * wc_t;
        let c1 = F::from_f64(2.0) * F::from_f64(2.0_f64.sqrt()) * wc_t;
        let c2 = F::one() / (wc2_t2 + c1 + F::from_f64(4.0));
        self.b0 = c2 * wc2_t2;
        self.b1 = F::from_f64(2.0) * self.b0;
        self.a1 = c2 * (F::from_f64(2.0) * wc2_t2 - F::from_f64(8.0));
        self.a2 = c2 * (wc2_t2 - c1 + F::from_f64(4.0));
        Ok(())
    }
}

impl<F: VtmFloat> Default for Butterworth2Lowpass<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: VtmFloat> Filter<F> for Butterworth2Lowpass<F> {
    fn reset(&mut self) {
        self.x1 = F::zero();
        self.x2 = F::zero();
        self.y1 = F::zero();
        self.y2 = F::zero();
    }

    fn filter(&mut self, x: F) -> F {
        let y = self.b0 * (x + self.x2) + self.b1 * self.x1 - self.a1 * self.y1 - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

fn validate_cutoff<F: VtmFloat>(sample_rate: F, cutoff_freq: F) -> Result<(), FilterError> {
    let max_freq = sample_rate.to_f64() * BUTTERWORTH_MAX_FREQ_COEF;
    let cutoff = cutoff_freq.to_f64();
    if cutoff < BUTTERWORTH_MIN_FREQ || cutoff > max_freq {
        return Err(FilterError::CutoffOutOfRange {
            cutoff,
            sample_rate: sample_rate.to_f64(),
            min: BUTTERWORTH_MIN_FREQ,
            max: max_freq,
        });
    }
    Ok(())
}

/// A one-zero lowpass filter used to shape the raw noise source before it is cross-mixed
/// with the glottal pulse and bandpassed for frication.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoiseShapeFilter<F: VtmFloat> {
    x1: F,
}

impl<F: VtmFloat> NoiseShapeFilter<F> {
    pub fn new() -> Self {
        Self { x1: F::zero() }
    }
}

impl<F: VtmFloat> Filter<F> for NoiseShapeFilter<F> {
    fn reset(&mut self) {
        self.x1 = F::zero();
    }

    fn filter(&mut self, x: F) -> F {
        let y = x + self.x1;
        self.x1 = x;
        y
    }
}

/// A central difference filter, `y[n] = x[n] - x[n-2]`, used as the final output
/// differentiator in waveguide variant 5.
#[derive(Copy, Clone, Debug, Default)]
pub struct DifferenceFilter<F: VtmFloat> {
    x1: F,
    x2: F,
}

impl<F: VtmFloat> DifferenceFilter<F> {
    pub fn new() -> Self {
        Self {
            x1: F::zero(),
            x2: F::zero(),
        }
    }
}

impl<F: VtmFloat> Filter<F> for DifferenceFilter<F> {
    fn reset(&mut self) {
        self.x1 = F::zero();
        self.x2 = F::zero();
    }

    fn filter(&mut self, x: F) -> F {
        let y = x - self.x2;
        self.x2 = self.x1;
        self.x1 = x;
        y
    }
}

/// Simulates the radiation of sound through the walls of the throat: a one-pole lowpass
/// filter applied directly to the glottal pulse, scaled by a dB gain, and added to the
/// waveguide output.
#[derive(Copy, Clone, Debug)]
pub struct ThroatFilter<F: VtmFloat> {
    b0: F,
    a1: F,
    gain: F,
    y1: F,
}

impl<F: VtmFloat> ThroatFilter<F> {
    pub fn new(sample_rate: F, cutoff: F, gain: F) -> Self {
        let b0 = (cutoff * F::from_f64(2.0)) / sample_rate;
        Self {
            b0,
            a1: b0 - F::one(),
            gain,
            y1: F::zero(),
        }
    }
}

impl<F: VtmFloat> Filter<F> for ThroatFilter<F> {
    fn reset(&mut self) {
        self.y1 = F::zero();
    }

    fn filter(&mut self, x: F) -> F {
        let y = self.b0 * x - self.a1 * self.y1;
        self.y1 = y;
        y * self.gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_amplitude(filter: &mut impl Filter<f64>, sample_rate: f64, frequency: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let n = (4.0 * sample_rate) as usize;
        let mut max_amplitude = 0.0_f64;
        for i in 0..n {
            let x = (w * i as f64).sin();
            let y = filter.filter(x);
            if i > n / 4 {
                max_amplitude = max_amplitude.max(y.abs());
            }
        }
        max_amplitude
    }

    #[test]
    fn radiation_filter_is_highpass() {
        // aperture_coeff close to 1 => cutoff near 0, strongly highpass.
        let mut filter = RadiationFilter::new();
        filter.update(0.9_f64);
        let low = response_amplitude(&mut filter, 44100.0, 100.0);
        filter.reset();
        let high = response_amplitude(&mut filter, 44100.0, 10000.0);
        assert!(high > low);
    }

    #[test]
    fn reflection_filter_is_lowpass() {
        let mut filter = ReflectionFilter::new();
        filter.update(0.9_f64);
        let low = response_amplitude(&mut filter, 44100.0, 100.0);
        filter.reset();
        let high = response_amplitude(&mut filter, 44100.0, 10000.0);
        assert!(low > high);
    }

    #[test]
    fn bandpass_peaks_at_center_frequency() {
        let mut filter = BandpassFilter::new();
        filter.update(44100.0, 500.0, 2500.0);
        let below = response_amplitude(&mut filter, 44100.0, 200.0);
        filter.reset();
        filter.update(44100.0, 500.0, 2500.0);
        let at_center = response_amplitude(&mut filter, 44100.0, 2500.0);
        filter.reset();
        filter.update(44100.0, 500.0, 2500.0);
        let above = response_amplitude(&mut filter, 44100.0, 10000.0);
        assert!(at_center > below);
        assert!(at_center > above);
    }

    #[test]
    fn butterworth_rejects_out_of_range_cutoff() {
        let mut filter = Butterworth1Lowpass::new();
        assert!(filter.update(44100.0, 0.5).is_err());
        assert!(filter.update(44100.0, 30000.0).is_err());
        assert!(filter.update(44100.0, 2000.0).is_ok());
    }

    #[test]
    fn butterworth2_attenuates_above_cutoff() {
        let mut filter = Butterworth2Lowpass::new();
        filter.update(44100.0, 1000.0).unwrap();
        let low = response_amplitude(&mut filter, 44100.0, 200.0);
        filter.reset();
        filter.update(44100.0, 1000.0).unwrap();
        let high = response_amplitude(&mut filter, 44100.0, 8000.0);
        assert!(low > high);
    }

    #[test]
    fn difference_filter_cancels_dc() {
        let mut filter = DifferenceFilter::<f64>::new();
        for _ in 0..10 {
            filter.filter(1.0);
        }
        // Once primed with a constant input the difference of x[n] and x[n-2] is zero.
        assert!(filter.filter(1.0).abs() < 1e-12);
    }

    #[test]
    fn noise_shape_filter_sums_adjacent_samples() {
        let mut filter = NoiseShapeFilter::<f64>::new();
        assert_eq!(filter.filter(1.0), 1.0);
        assert_eq!(filter.filter(1.0), 2.0);
        assert_eq!(filter.filter(-1.0), 0.0);
    }

    #[test]
    fn throat_filter_applies_gain() {
        let mut filter = ThroatFilter::new(44100.0_f64, 1500.0, 2.0);
        let y = filter.filter(1.0);
        assert!(y.is_finite());
        assert!(y != 0.0);
    }
}
