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

//! The model façade: ties the glottal source, noise, waveguide, throat path, and sample-rate
//! converter together into a single stepping synthesizer.

use crate::config::Configuration;
use crate::error::{ModelError, ParamError};
use crate::filters::{
    BandpassFilter, Butterworth1Lowpass, Butterworth2Lowpass, DifferenceFilter, Filter, NoiseShapeFilter, ThroatFilter,
};
use crate::float::VtmFloat;
use crate::glottal::{GlottalSource, Waveform};
use crate::noise::NoiseSource;
use crate::resampler::SampleRateConverter;
use crate::waveguide::{FlowWaveguide, PressureSize, PressureWaveguide};
use crate::{MIN_RADIUS, TOTAL_PARAMETERS, VT_SCALE};

const PARAM_GLOT_PITCH: usize = 0;
const PARAM_GLOT_VOL: usize = 1;
const PARAM_ASP_VOL: usize = 2;
const PARAM_FRIC_VOL: usize = 3;
const PARAM_FRIC_POS: usize = 4;
const PARAM_FRIC_CF: usize = 5;
const PARAM_FRIC_BW: usize = 6;
const PARAM_R1: usize = 7;
const PARAM_VELUM: usize = 15;

fn amplitude_60db(decibel_level: f64) -> f64 {
    const VOL_MAX: f64 = 60.0;
    if decibel_level <= 0.0 {
        return 0.0;
    }
    if decibel_level >= VOL_MAX {
        return 1.0;
    }
    10.0_f64.powf((decibel_level - VOL_MAX) / 20.0)
}

fn frequency(pitch: f64) -> f64 {
    const REF_FREQ: f64 = 220.0;
    const PITCH_OFFSET: f64 = 3.0;
    REF_FREQ * 2.0_f64.powf((pitch + PITCH_OFFSET) / 12.0)
}

fn speed_of_sound(temperature: f64) -> f64 {
    331.4 + 0.6 * temperature
}

/// Which waveguide topology and scattering formulation a model instance uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VtmVariant {
    V0,
    V2,
    V4,
    V5,
}

enum Guide<F: VtmFloat> {
    Pressure(PressureWaveguide<F>),
    Flow(FlowWaveguide<F>),
}

/// A complete articulatory synthesizer instance: one configuration in, a stream of parameter
/// frames and `step()` calls out.
pub struct Model<F: VtmFloat> {
    variant: VtmVariant,
    interactive: bool,
    internal_sample_rate: f64,
    output_sample_rate: f64,
    breathiness_factor: F,
    crossmix_factor: F,
    noise_modulation: bool,
    waveform_pulse: bool,
    bypass: bool,
    radius_coef: [F; 8],
    global_radius_coef: F,
    global_nasal_radius_coef: F,
    aperture_radius: F,
    nasal_radius: [F; 6],
    /// Variant 5's `[NR2, NR3, NR4, NR5, NR6, NR7]`; unused by the other variants.
    nasal_radius_v5: [F; 6],
    min_glottal_loss: f64,
    max_glottal_loss: f64,
    frication_factor: F,
    constant_radius_mouth_impedance: bool,
    mouth_impedance_radius: F,

    current_parameter: [f64; TOTAL_PARAMETERS],

    glottal: GlottalSource<F>,
    noise_source: NoiseSource<F>,
    noise_filter: NoiseShapeFilter<F>,
    bandpass: BandpassFilter<F>,
    throat: ThroatFilter<F>,

    glottal_noise_filter: Butterworth1Lowpass<F>,
    frication_noise_filter: Butterworth2Lowpass<F>,
    glottal_lowpass: Butterworth1Lowpass<F>,

    guide: Guide<F>,
    resampler: SampleRateConverter<F>,
    /// Variant 5's post-resample output differentiator, run on the already-resampled,
    /// already-band-limited `f32` stream. Unused by the pressure-wave variants and whenever
    /// `bypass` is set, in which case the resampled signal is pushed through unchanged.
    output_diff: DifferenceFilter<f32>,
    output_buffer: Vec<f32>,
}

impl<F: VtmFloat> Model<F> {
    /// Builds a synthesizer from a validated configuration. Fails if the configuration's
    /// derived internal sample rate is incompatible with variant 5's radiation impedance
    /// (which requires at least 50 kHz), or if the glottal pulse shape is degenerate.
    pub fn new(config: &Configuration, interactive: bool) -> Result<Self, ModelError> {
        let variant = match config.variant {
            0 => VtmVariant::V0,
            2 => VtmVariant::V2,
            4 => VtmVariant::V4,
            _ => VtmVariant::V5,
        };

        let n_sections = match variant {
            VtmVariant::V0 | VtmVariant::V2 => 10,
            VtmVariant::V4 | VtmVariant::V5 => 30,
        };
        let section_delay = match variant {
            VtmVariant::V0 => 0,
            _ => config.section_delay.saturating_sub(1),
        };

        let raw_length = config.vocal_tract_length + config.vocal_tract_length_offset;
        let length = raw_length.clamp(3.0, 30.0);
        if length != raw_length {
            log::warn!(
                "vocal tract length {} cm outside [3, 30]; clamped to {} cm",
                raw_length,
                length
            );
        }
        let c = speed_of_sound(config.temperature);
        let internal_sample_rate = (c * n_sections as f64 * (section_delay as f64 + 1.0) * 100.0 / length).round();

        let damping_factor = F::from_f64(1.0 - config.loss_factor / 100.0);
        let breathiness_factor = F::from_f64(config.breathiness / 100.0);
        let crossmix_factor = F::from_f64(1.0 / amplitude_60db(config.mix_offset));

        let waveform = if config.waveform == 0 { Waveform::Pulse } else { Waveform::Sine };
        let glottal = GlottalSource::new(
            waveform,
            F::from_f64(internal_sample_rate),
            F::from_f64(config.glottal_pulse_tp),
            F::from_f64(config.glottal_pulse_tn_min),
            F::from_f64(config.glottal_pulse_tn_max),
        )?;

        let mut radius_coef = [F::one(); 8];
        for (i, v) in radius_coef.iter_mut().enumerate() {
            *v = F::from_f64(config.radius_coef[i]);
        }
        let mut nasal_radius = [F::zero(); 6];
        for (i, v) in nasal_radius.iter_mut().enumerate() {
            *v = F::from_f64(config.nasal_radius[i]);
        }
        let mut nasal_radius_v5 = [F::zero(); 6];
        for (i, v) in nasal_radius_v5.iter_mut().enumerate() {
            *v = F::from_f64(config.nasal_radius_v5[i]);
        }

        let guide = match variant {
            VtmVariant::V0 | VtmVariant::V2 => {
                let mut wg = PressureWaveguide::new(PressureSize::Small, section_delay);
                wg.set_damping_factor(damping_factor);
                Guide::Pressure(wg)
            }
            VtmVariant::V4 => {
                let mut wg = PressureWaveguide::new(PressureSize::Large, section_delay);
                wg.set_damping_factor(damping_factor);
                Guide::Pressure(wg)
            }
            VtmVariant::V5 => {
                let mut wg = FlowWaveguide::new(section_delay, F::from_f64(internal_sample_rate))?;
                wg.set_damping_factor(damping_factor);
                wg.init_nasal_cavity(&nasal_radius_v5);
                if config.constant_radius_mouth_impedance {
                    wg.update_mouth_radius(F::from_f64(config.mouth_impedance_radius));
                }
                Guide::Flow(wg)
            }
        };

        let mut bandpass = BandpassFilter::new();
        bandpass.update(F::from_f64(internal_sample_rate), F::from_f64(100.0), F::from_f64(1000.0));

        let glottal_noise_filter = Butterworth1Lowpass::new();
        let frication_noise_filter = Butterworth2Lowpass::new();
        let glottal_lowpass = Butterworth1Lowpass::new();

        let throat = ThroatFilter::new(
            F::from_f64(internal_sample_rate),
            F::from_f64(config.throat_cutoff),
            F::from_f64(amplitude_60db(config.throat_volume)),
        );

        let resampler = SampleRateConverter::new(F::from_f64(internal_sample_rate), F::from_f64(config.output_rate));

        let mut model = Self {
            variant,
            interactive,
            internal_sample_rate,
            output_sample_rate: config.output_rate,
            breathiness_factor,
            crossmix_factor,
            noise_modulation: config.noise_modulation,
            waveform_pulse: config.waveform == 0,
            bypass: config.bypass,
            radius_coef,
            global_radius_coef: F::from_f64(config.global_radius_coef),
            global_nasal_radius_coef: F::from_f64(config.global_nasal_radius_coef),
            aperture_radius: F::from_f64(config.aperture_radius),
            nasal_radius,
            nasal_radius_v5,
            min_glottal_loss: config.min_glottal_loss,
            max_glottal_loss: config.max_glottal_loss,
            frication_factor: F::from_f64(config.frication_factor),
            constant_radius_mouth_impedance: config.constant_radius_mouth_impedance,
            mouth_impedance_radius: F::from_f64(config.mouth_impedance_radius),
            current_parameter: [0.0; TOTAL_PARAMETERS],
            glottal,
            noise_source: NoiseSource::new(),
            noise_filter: NoiseShapeFilter::new(),
            bandpass,
            throat,
            glottal_noise_filter,
            frication_noise_filter,
            glottal_lowpass,
            guide,
            resampler,
            output_diff: DifferenceFilter::new(),
            output_buffer: Vec::with_capacity(1024),
        };

        if matches!(variant, VtmVariant::V5) {
            model
                .glottal_noise_filter
                .update(F::from_f64(internal_sample_rate), F::from_f64(config.glottal_noise_cutoff))?;
            model
                .frication_noise_filter
                .update(F::from_f64(internal_sample_rate), F::from_f64(config.frication_noise_cutoff))?;
            model
                .glottal_lowpass
                .update(F::from_f64(internal_sample_rate), F::from_f64(config.glottal_lowpass_cutoff))?;
        } else {
            let nyquist = internal_sample_rate / 2.0;
            let mouth_coef = F::from_f64((nyquist - config.mouth_coefficient) / nyquist);
            let nose_coef = F::from_f64((nyquist - config.nose_coefficient) / nyquist);
            if let Guide::Pressure(wg) = &mut model.guide {
                wg.set_boundary_coefficients(mouth_coef, nose_coef);
            }
        }

        log::debug!(
            "constructed vtm model: variant={:?} internal_rate={} output_rate={}",
            variant,
            internal_sample_rate,
            config.output_rate
        );

        Ok(model)
    }

    pub fn variant(&self) -> VtmVariant {
        self.variant
    }

    pub fn internal_sample_rate(&self) -> f64 {
        self.internal_sample_rate
    }

    pub fn output_sample_rate(&self) -> f64 {
        self.output_sample_rate
    }

    /// Sets a single parameter. Radius parameters (indices 7..15) are scaled by the
    /// configured per-section coefficient and clamped to `MIN_RADIUS`. An out-of-range index
    /// is silently ignored, matching the library's permissive batch-processing posture.
    pub fn set_parameter(&mut self, index: usize, value: f64) {
        if index >= TOTAL_PARAMETERS {
            return;
        }
        if (PARAM_R1..PARAM_VELUM).contains(&index) {
            let coef = self.radius_coef[index - PARAM_R1].to_f64() * self.global_radius_coef.to_f64();
            self.current_parameter[index] = (value * coef).max(MIN_RADIUS);
        } else if index == PARAM_VELUM {
            let coef = self.global_nasal_radius_coef.to_f64();
            self.current_parameter[index] = (value * coef).max(MIN_RADIUS);
        } else {
            self.current_parameter[index] = value;
        }
    }

    /// Sets every parameter from an ordered slice of 16 values, equivalent to 16 sequential
    /// `set_parameter` calls.
    pub fn set_all_parameters(&mut self, values: &[f64; TOTAL_PARAMETERS]) {
        for (i, &v) in values.iter().enumerate() {
            self.set_parameter(i, v);
        }
    }

    /// Runs one internal synthesis step, appending zero, one, or more output-rate samples to
    /// [`output_buffer`](Self::output_buffer).
    pub fn step(&mut self) {
        let f0 = F::from_f64(frequency(self.current_parameter[PARAM_GLOT_PITCH]));
        let glot_amplitude = F::from_f64(amplitude_60db(self.current_parameter[PARAM_GLOT_VOL]));
        let asp_amplitude = F::from_f64(amplitude_60db(self.current_parameter[PARAM_ASP_VOL]));

        let mut region_radius = [F::zero(); 8];
        for (i, v) in region_radius.iter_mut().enumerate() {
            *v = F::from_f64(self.current_parameter[PARAM_R1 + i]);
        }
        let velum_radius = F::from_f64(self.current_parameter[PARAM_VELUM]);

        self.bandpass.update(
            F::from_f64(self.internal_sample_rate),
            F::from_f64(self.current_parameter[PARAM_FRIC_BW]),
            F::from_f64(self.current_parameter[PARAM_FRIC_CF]),
        );

        let noise_sample = self.noise_source.get_sample();

        let output_sample = match &mut self.guide {
            Guide::Pressure(wg) => {
                wg.calculate_tube_coefficients(&region_radius, velum_radius, self.aperture_radius, &self.nasal_radius);

                let fric_amplitude = F::from_f64(amplitude_60db(self.current_parameter[PARAM_FRIC_VOL]));
                let int_part = self.current_parameter[PARAM_FRIC_POS] as i32;
                let complement = F::from_f64(self.current_parameter[PARAM_FRIC_POS] - int_part as f64);
                let remainder = F::one() - complement;
                let mut taps = [F::zero(); 8];
                if (0..8).contains(&int_part) {
                    let i = int_part as usize;
                    taps[i] = remainder * fric_amplitude;
                    if i + 1 < 8 {
                        taps[i + 1] = complement * fric_amplitude;
                    }
                }
                wg.frication_tap = taps;

                let lp_noise = self.noise_filter.filter(noise_sample);
                if self.waveform_pulse {
                    self.glottal.setup(glot_amplitude);
                }
                let pulse_raw = self.glottal.get_sample(f0);
                let pulsed_noise = lp_noise * pulse_raw;
                let pulse =
                    glot_amplitude * (pulse_raw * (F::one() - self.breathiness_factor) + pulsed_noise * self.breathiness_factor);

                let signal = if self.noise_modulation {
                    let mut crossmix = glot_amplitude * self.crossmix_factor;
                    if crossmix.to_f64() > 1.0 {
                        crossmix = F::one();
                    }
                    pulsed_noise * crossmix + lp_noise * (F::one() - crossmix)
                } else {
                    lp_noise
                };

                let frication = self.bandpass.filter(signal);
                let mut out = wg.step((pulse + asp_amplitude * signal) * F::from_f64(VT_SCALE), frication);
                out = out + self.throat.filter(pulse * F::from_f64(VT_SCALE));
                out
            }
            Guide::Flow(wg) => {
                wg.calculate_tube_coefficients(&region_radius, velum_radius, self.nasal_radius_v5[0]);
                if !self.constant_radius_mouth_impedance {
                    wg.update_mouth_radius(region_radius[7]);
                }

                let glottal_noise = self.glottal_noise_filter.filter(noise_sample);
                if self.waveform_pulse {
                    self.glottal.setup(glot_amplitude);
                }
                let pulse = self.glottal_lowpass.filter(self.glottal.get_sample(f0));
                let pulsed_noise = glottal_noise * pulse;
                let noisy_pulse =
                    glot_amplitude * (pulse * (F::one() - self.breathiness_factor) + pulsed_noise * self.breathiness_factor);

                let mut frication_noise = self.frication_noise_filter.filter(noise_sample);
                if self.noise_modulation {
                    let mut crossmix = glot_amplitude * self.crossmix_factor;
                    if crossmix.to_f64() > 1.0 {
                        crossmix = F::one();
                    }
                    frication_noise = frication_noise * (noisy_pulse * crossmix + (F::one() - crossmix));
                }

                let raw = if self.bypass {
                    noisy_pulse + asp_amplitude * frication_noise
                } else {
                    let min_loss = F::one() - glot_amplitude * F::from_f64(self.min_glottal_loss / 100.0);
                    let max_loss = F::one() - glot_amplitude * F::from_f64(self.max_glottal_loss / 100.0);
                    let glottal_loss_factor = min_loss + (max_loss - min_loss) * pulse;
                    let fric_pos = F::from_f64(self.current_parameter[PARAM_FRIC_POS]);
                    let bandpassed_fric = self.bandpass.filter(frication_noise);
                    let fric_amplitude = F::from_f64(amplitude_60db(self.current_parameter[PARAM_FRIC_VOL]))
                        * self.frication_factor
                        * bandpassed_fric;
                    wg.step(noisy_pulse + asp_amplitude * frication_noise, glottal_loss_factor, fric_pos, fric_amplitude)
                };

                // Interactive mode divides by f0 here to compensate for the differentiation
                // applied later, after resampling; the batch path leaves `raw` untouched.
                if self.interactive && f0.to_f64() > 0.0 {
                    raw / f0
                } else {
                    raw
                }
            }
        };

        self.resampler.data_fill(output_sample);
        self.drain_resampler();
    }

    /// Flushes any samples remaining in the sample-rate converter into the output buffer.
    /// Call once after the last `step()`.
    pub fn finish(&mut self) {
        self.resampler.flush_buffer();
        self.drain_resampler();
    }

    /// Moves every sample the resampler currently holds into `output_buffer`. Variant 5
    /// differentiates and rescales by the output rate as it does so, unless `bypass` is set;
    /// every other variant (and bypassed variant 5) passes samples through unchanged.
    fn drain_resampler(&mut self) {
        if matches!(self.variant, VtmVariant::V5) && !self.bypass {
            let rate = self.output_sample_rate as f32;
            for sample in self.resampler.take_output() {
                self.output_buffer.push(self.output_diff.filter(sample) * rate);
            }
        } else {
            self.output_buffer.extend(self.resampler.take_output());
        }
    }

    /// The buffer that `step()` and `finish()` append output-rate samples to. Callers drain it
    /// (e.g. `model.output_buffer().drain(..)`) however suits their I/O loop.
    pub fn output_buffer(&mut self) -> &mut Vec<f32> {
        &mut self.output_buffer
    }

    /// Returns every filter, oscillator, and delay line to its as-constructed state without
    /// re-reading the configuration.
    pub fn reset(&mut self) {
        self.glottal.reset();
        self.noise_source.reset();
        self.noise_filter.reset();
        self.bandpass.reset();
        self.throat.reset();
        self.glottal_noise_filter.reset();
        self.frication_noise_filter.reset();
        self.glottal_lowpass.reset();
        match &mut self.guide {
            Guide::Pressure(wg) => wg.reset(),
            Guide::Flow(wg) => wg.reset(),
        }
        self.resampler.reset();
        self.output_diff.reset();
    }
}

/// Parses one line of a batch parameter stream: `TOTAL_PARAMETERS` whitespace-separated
/// floating-point fields, in the same order as [`Model::set_all_parameters`]. Malformed
/// numeric fields are treated as `0.0` rather than rejected; only a short line is an error.
pub fn parse_parameter_line(line: &str) -> Result<[f64; TOTAL_PARAMETERS], ParamError> {
    let mut values = [0.0; TOTAL_PARAMETERS];
    let mut found = 0;
    for (i, field) in line.split_whitespace().enumerate() {
        if i >= TOTAL_PARAMETERS {
            break;
        }
        values[i] = field.parse().unwrap_or(0.0);
        found += 1;
    }
    if found < TOTAL_PARAMETERS {
        return Err(ParamError::ShortFrame {
            found,
            expected: TOTAL_PARAMETERS,
        });
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Configuration {
        let pairs: &[(&str, &str)] = &[
            ("variant", "0"),
            ("output_rate", "44100"),
            ("waveform", "0"),
            ("glottal_pulse_tp", "40"),
            ("glottal_pulse_tn_min", "16"),
            ("glottal_pulse_tn_max", "32"),
            ("breathiness", "0.5"),
            ("vocal_tract_length", "17"),
            ("nasal_radius_1", "0"),
            ("nasal_radius_2", "1.35"),
            ("nasal_radius_3", "1.96"),
            ("nasal_radius_4", "1.91"),
            ("nasal_radius_5", "1.3"),
            ("nasal_radius_6", "0.73"),
            ("aperture_radius", "3.05"),
            ("temperature", "32"),
            ("loss_factor", "0.8"),
            ("throat_cutoff", "1500"),
            ("throat_volume", "6"),
            ("mix_offset", "48"),
            ("mouth_coefficient", "5000"),
            ("nose_coefficient", "5000"),
            ("noise_modulation", "1"),
        ];
        let entries = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()));
        Configuration::from_map(entries).unwrap()
    }

    #[test]
    fn construction_picks_the_right_topology() {
        let model = Model::<f64>::new(&base_config(), false).unwrap();
        assert_eq!(model.variant(), VtmVariant::V0);
        assert_eq!(model.output_sample_rate(), 44100.0);
        assert!(model.internal_sample_rate() > model.output_sample_rate());
    }

    #[test]
    fn silence_in_produces_finite_silence_out() {
        let mut model = Model::<f64>::new(&base_config(), false).unwrap();
        model.set_all_parameters(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.1]);
        for _ in 0..1000 {
            model.step();
        }
        model.finish();
        let buf = model.output_buffer();
        assert!(!buf.is_empty());
        let energy: f64 = buf.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (energy / buf.len() as f64).sqrt();
        assert!(buf.iter().all(|s| s.is_finite()));
        assert!(rms < 1e-6, "expected near-silence, got rms {}", rms);
    }

    #[test]
    fn reset_is_deterministic() {
        let mut a = Model::<f64>::new(&base_config(), false).unwrap();
        let mut b = Model::<f64>::new(&base_config(), false).unwrap();
        let params = [50.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.1];
        a.set_all_parameters(&params);
        b.set_all_parameters(&params);
        for _ in 0..200 {
            a.step();
        }
        a.reset();
        a.set_all_parameters(&params);
        for _ in 0..200 {
            a.step();
            b.step();
        }
        a.finish();
        b.finish();
        assert_eq!(a.output_buffer(), b.output_buffer());
    }

    #[test]
    fn set_all_parameters_matches_sequential_set_parameter() {
        let mut a = Model::<f64>::new(&base_config(), false).unwrap();
        let mut b = Model::<f64>::new(&base_config(), false).unwrap();
        let params = [40.0, 50.0, 0.0, 20.0, 3.0, 2000.0, 1000.0, 1.0, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.8, 0.2];
        a.set_all_parameters(&params);
        for (i, &v) in params.iter().enumerate() {
            b.set_parameter(i, v);
        }
        for _ in 0..50 {
            a.step();
            b.step();
        }
        a.finish();
        b.finish();
        assert_eq!(a.output_buffer(), b.output_buffer());
    }

    #[test]
    fn parse_parameter_line_accepts_full_frames() {
        let line = "10 20 0 0 0 0 0 1 1 1 1 1 1 1 1 0.1";
        let values = parse_parameter_line(line).unwrap();
        assert_eq!(values[0], 10.0);
        assert_eq!(values[15], 0.1);
    }

    #[test]
    fn parse_parameter_line_rejects_short_frames() {
        let err = parse_parameter_line("1 2 3").unwrap_err();
        assert_eq!(err, ParamError::ShortFrame { found: 3, expected: 16 });
    }

    fn v5_entries() -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = vec![
            ("variant".to_string(), "5".to_string()),
            ("output_rate".to_string(), "44100".to_string()),
            ("waveform".to_string(), "0".to_string()),
            ("glottal_pulse_tp".to_string(), "40".to_string()),
            ("glottal_pulse_tn_min".to_string(), "16".to_string()),
            ("glottal_pulse_tn_max".to_string(), "32".to_string()),
            ("breathiness".to_string(), "0.5".to_string()),
            ("vocal_tract_length".to_string(), "17".to_string()),
            ("aperture_radius".to_string(), "3.05".to_string()),
            ("temperature".to_string(), "32".to_string()),
            ("loss_factor".to_string(), "0.8".to_string()),
            ("throat_cutoff".to_string(), "1500".to_string()),
            ("throat_volume".to_string(), "6".to_string()),
            ("mix_offset".to_string(), "48".to_string()),
        ];
        for (i, v) in ["1.35", "1.96", "1.91", "1.3", "0.73", "0.3"].iter().enumerate() {
            entries.push((format!("nasal_radius_{}", i + 2), v.to_string()));
        }
        entries
    }

    fn v5_config() -> Configuration {
        Configuration::from_map(v5_entries()).unwrap()
    }

    #[test]
    fn interactive_flag_changes_variant_5_output() {
        let config = v5_config();
        let mut batch = Model::<f64>::new(&config, false).unwrap();
        let mut interactive = Model::<f64>::new(&config, true).unwrap();
        let params = [40.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.1];
        batch.set_all_parameters(&params);
        interactive.set_all_parameters(&params);
        for _ in 0..100 {
            batch.step();
            interactive.step();
        }
        batch.finish();
        interactive.finish();
        assert_ne!(batch.output_buffer(), interactive.output_buffer());
    }

    #[test]
    fn variant_5_produces_finite_bounded_output() {
        let config = v5_config();
        let mut model = Model::<f64>::new(&config, false).unwrap();
        assert_eq!(model.variant(), VtmVariant::V5);
        let params = [
            -12.0, 60.0, 0.0, 0.0, 5.5, 2500.0, 500.0, 0.8, 1.1, 1.1, 1.2, 1.5, 2.0, 1.5, 1.0, 0.5,
        ];
        model.set_all_parameters(&params);
        for _ in 0..5000 {
            model.step();
        }
        model.finish();
        let buf = model.output_buffer();
        assert!(!buf.is_empty());
        assert!(buf.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn variant_5_bypass_skips_the_waveguide_and_the_differentiator() {
        let mut entries = v5_entries();
        entries.push(("bypass".to_string(), "1".to_string()));
        let config = Configuration::from_map(entries).unwrap();
        let mut model = Model::<f64>::new(&config, false).unwrap();
        let params = [40.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.1];
        model.set_all_parameters(&params);
        for _ in 0..300 {
            model.step();
        }
        model.finish();
        let buf = model.output_buffer();
        assert!(!buf.is_empty());
        assert!(buf.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn variant_5_differentiation_is_applied_once_per_output_sample() {
        // With `bypass` unset, two identical consecutive steps should not produce identical
        // output samples in general (the central-difference stage has nonzero state from the
        // previous resampled sample), whereas immediately after `reset()` the very first
        // resampled output should equal the resampler's raw sample filtered through a
        // freshly-reset `DifferenceFilter` (i.e. `x[n] - 0`), which this test checks indirectly
        // by confirming reset() clears the differentiator along with everything else.
        let config = v5_config();
        let mut a = Model::<f64>::new(&config, false).unwrap();
        let mut b = Model::<f64>::new(&config, false).unwrap();
        let params = [40.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.1];
        a.set_all_parameters(&params);
        b.set_all_parameters(&params);
        for _ in 0..300 {
            a.step();
        }
        a.finish();
        a.reset();
        a.set_all_parameters(&params);
        for _ in 0..300 {
            a.step();
            b.step();
        }
        a.finish();
        b.finish();
        assert_eq!(a.output_buffer(), b.output_buffer());
    }
}
