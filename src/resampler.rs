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

//! A Kaiser-windowed polyphase sinc sample-rate converter, carrying the waveguide's internal
//! rate to the caller's requested output rate at any ratio.
//!
//! Samples are pushed one at a time via [`SampleRateConverter::data_fill`]; converted output
//! accumulates in an internal buffer, drained with [`SampleRateConverter::take_output`].

use crate::float::VtmFloat;

const BUFFER_SIZE: usize = 1024;
const L_BITS: u32 = 8;
const L_RANGE: u32 = 1 << L_BITS;
const M_BITS: u32 = 8;
const M_RANGE: u32 = 1 << M_BITS;
const ZERO_CROSSINGS: usize = 13;
const FILTER_LENGTH: usize = ZERO_CROSSINGS * L_RANGE as usize;
const FRACTION_BITS: u32 = L_BITS + M_BITS;
const FRACTION_RANGE: u32 = 1 << FRACTION_BITS;
const FILTER_LIMIT: usize = FILTER_LENGTH - 1;
const M_MASK: u32 = 0x0000_00FF;
const L_MASK: u32 = 0x0000_FF00;
const FRACTION_MASK: u32 = 0x0000_FFFF;
const N_MASK: u32 = 0xFFFF_0000;

fn n_value(x: u32) -> u32 {
    (x & N_MASK) >> FRACTION_BITS
}
fn l_value(x: u32) -> u32 {
    (x & L_MASK) >> M_BITS
}
fn m_value(x: u32) -> u32 {
    x & M_MASK
}
fn fraction_value(x: u32) -> u32 {
    x & FRACTION_MASK
}

fn sr_increment(pointer: &mut usize, modulus: usize) {
    *pointer += 1;
    if *pointer >= modulus {
        *pointer -= modulus;
    }
}

fn sr_decrement(pointer: &mut usize, modulus: usize) {
    if *pointer == 0 {
        *pointer = modulus - 1;
    } else {
        *pointer -= 1;
    }
}

fn izero(x: f64) -> f64 {
    const EPSILON: f64 = 1e-21;
    let mut sum = 1.0;
    let mut u = 1.0;
    let mut n = 1.0;
    let halfx = x / 2.0;
    loop {
        let mut temp = halfx / n;
        n += 1.0;
        temp *= temp;
        u *= temp;
        sum += u;
        if u < EPSILON * sum {
            break;
        }
    }
    sum
}

/// Converts a stream sampled at `input_rate` to one sampled at `output_rate`, one sample at a
/// time, via a ring-buffered polyphase sinc filter.
pub struct SampleRateConverter<F: VtmFloat> {
    sample_rate_ratio: f64,
    fill_ptr: usize,
    empty_ptr: usize,
    pad_size: usize,
    fill_size: usize,
    time_register_increment: u32,
    filter_increment: u32,
    phase_increment: u32,
    time_register: u32,
    fill_counter: usize,

    h: Vec<f64>,
    delta_h: Vec<f64>,
    buffer: Vec<F>,
    output: Vec<f32>,
}

impl<F: VtmFloat> SampleRateConverter<F> {
    pub fn new(input_rate: F, output_rate: F) -> Self {
        let mut converter = Self {
            sample_rate_ratio: 0.0,
            fill_ptr: 0,
            empty_ptr: 0,
            pad_size: 0,
            fill_size: 0,
            time_register_increment: 0,
            filter_increment: 0,
            phase_increment: 0,
            time_register: 0,
            fill_counter: 0,
            h: vec![0.0; FILTER_LENGTH],
            delta_h: vec![0.0; FILTER_LENGTH],
            buffer: vec![F::zero(); BUFFER_SIZE],
            output: Vec::new(),
        };
        converter.initialize_filter();
        converter.initialize_conversion(input_rate.to_f64(), output_rate.to_f64());
        converter
    }

    fn initialize_filter(&mut self) {
        let beta = 5.658_f64;
        let lp_cutoff = 11.0_f64 / 13.0;

        self.h[0] = lp_cutoff;
        let x = std::f64::consts::PI / L_RANGE as f64;
        for i in 1..FILTER_LENGTH {
            let y = i as f64 * x;
            self.h[i] = (y * lp_cutoff).sin() / y;
        }

        let i_beta = 1.0 / izero(beta);
        for i in 0..FILTER_LENGTH {
            let temp = i as f64 / FILTER_LENGTH as f64;
            self.h[i] *= izero(beta * (1.0 - temp * temp).sqrt()) * i_beta;
        }

        for i in 0..FILTER_LIMIT {
            self.delta_h[i] = self.h[i + 1] - self.h[i];
        }
        self.delta_h[FILTER_LIMIT] = 0.0 - self.h[FILTER_LIMIT];
    }

    fn initialize_conversion(&mut self, input_rate: f64, output_rate: f64) {
        self.sample_rate_ratio = output_rate / input_rate;

        self.time_register_increment = (2.0_f64.powi(FRACTION_BITS as i32) / self.sample_rate_ratio).round() as u32;
        let rounded_ratio = 2.0_f64.powi(FRACTION_BITS as i32) / self.time_register_increment as f64;

        if self.sample_rate_ratio >= 1.0 {
            self.filter_increment = L_RANGE;
        } else {
            self.phase_increment = (self.sample_rate_ratio * FRACTION_RANGE as f64).round() as u32;
        }

        self.pad_size = if self.sample_rate_ratio >= 1.0 {
            ZERO_CROSSINGS
        } else {
            (ZERO_CROSSINGS as f64 / rounded_ratio) as usize + 1
        };

        self.initialize_buffer();
    }

    fn initialize_buffer(&mut self) {
        for v in self.buffer.iter_mut() {
            *v = F::zero();
        }
        self.fill_ptr = self.pad_size;
        self.fill_size = BUFFER_SIZE - 2 * self.pad_size;
    }

    pub fn reset(&mut self) {
        self.empty_ptr = 0;
        self.time_register = 0;
        self.fill_counter = 0;
        self.output.clear();
        self.initialize_buffer();
    }

    /// Pushes one input-rate sample into the ring buffer, converting and buffering output
    /// samples whenever the buffer fills.
    pub fn data_fill(&mut self, data: F) {
        self.buffer[self.fill_ptr] = data;
        sr_increment(&mut self.fill_ptr, BUFFER_SIZE);

        self.fill_counter += 1;
        if self.fill_counter >= self.fill_size {
            self.data_empty();
            self.fill_counter = 0;
        }
    }

    /// Pads with silence and converts whatever remains, for use at end-of-stream.
    pub fn flush_buffer(&mut self) {
        for _ in 0..self.pad_size * 2 {
            self.data_fill(F::zero());
        }
        self.data_empty();
    }

    /// Returns and clears the accumulated output-rate samples.
    pub fn take_output(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.output)
    }

    fn data_empty(&mut self) {
        let mut end_ptr = self.fill_ptr as isize - self.pad_size as isize;
        if end_ptr < 0 {
            end_ptr += BUFFER_SIZE as isize;
        }
        if (end_ptr as usize) < self.empty_ptr {
            end_ptr += BUFFER_SIZE as isize;
        }
        let mut end_ptr = end_ptr as isize;

        if self.sample_rate_ratio >= 1.0 {
            while (self.empty_ptr as isize) < end_ptr {
                let mut output = 0.0_f64;
                let mut interpolation = m_value(self.time_register) as f64 / M_RANGE as f64;

                let mut index = self.empty_ptr;
                let mut filter_index = l_value(self.time_register);
                while (filter_index as usize) < FILTER_LENGTH {
                    output += self.buffer[index].to_f64()
                        * (self.h[filter_index as usize] + self.delta_h[filter_index as usize] * interpolation);
                    sr_decrement(&mut index, BUFFER_SIZE);
                    filter_index += self.filter_increment;
                }

                self.time_register = !self.time_register;
                interpolation = m_value(self.time_register) as f64 / M_RANGE as f64;

                index = self.empty_ptr;
                sr_increment(&mut index, BUFFER_SIZE);
                let mut filter_index = l_value(self.time_register);
                while (filter_index as usize) < FILTER_LENGTH {
                    output += self.buffer[index].to_f64()
                        * (self.h[filter_index as usize] + self.delta_h[filter_index as usize] * interpolation);
                    sr_increment(&mut index, BUFFER_SIZE);
                    filter_index += self.filter_increment;
                }

                self.output.push(output as f32);

                self.time_register = !self.time_register;
                self.time_register = self.time_register.wrapping_add(self.time_register_increment);

                self.empty_ptr += n_value(self.time_register) as usize;
                if self.empty_ptr >= BUFFER_SIZE {
                    self.empty_ptr -= BUFFER_SIZE;
                    end_ptr -= BUFFER_SIZE as isize;
                }
                self.time_register &= !N_MASK;
            }
        } else {
            while (self.empty_ptr as isize) < end_ptr {
                let mut output = 0.0_f64;

                let mut phase_index = (fraction_value(self.time_register) as f64 * self.sample_rate_ratio).round() as u32;
                let mut index = self.empty_ptr;
                loop {
                    let impulse_index = phase_index >> M_BITS;
                    if impulse_index as usize >= FILTER_LENGTH {
                        break;
                    }
                    let impulse = self.h[impulse_index as usize]
                        + self.delta_h[impulse_index as usize] * (m_value(phase_index) as f64 / M_RANGE as f64);
                    output += self.buffer[index].to_f64() * impulse;
                    sr_decrement(&mut index, BUFFER_SIZE);
                    phase_index += self.phase_increment;
                }

                let mut phase_index =
                    (fraction_value(!self.time_register) as f64 * self.sample_rate_ratio).round() as u32;
                let mut index = self.empty_ptr;
                sr_increment(&mut index, BUFFER_SIZE);
                loop {
                    let impulse_index = phase_index >> M_BITS;
                    if impulse_index as usize >= FILTER_LENGTH {
                        break;
                    }
                    let impulse = self.h[impulse_index as usize]
                        + self.delta_h[impulse_index as usize] * (m_value(phase_index) as f64 / M_RANGE as f64);
                    output += self.buffer[index].to_f64() * impulse;
                    sr_increment(&mut index, BUFFER_SIZE);
                    phase_index += self.phase_increment;
                }

                self.output.push(output as f32);

                self.time_register = self.time_register.wrapping_add(self.time_register_increment);
                self.empty_ptr += n_value(self.time_register) as usize;
                if self.empty_ptr >= BUFFER_SIZE {
                    self.empty_ptr -= BUFFER_SIZE;
                    end_ptr -= BUFFER_SIZE as isize;
                }
                self.time_register &= !N_MASK;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_in_produces_silence_out() {
        let mut src = SampleRateConverter::<f64>::new(48000.0, 44100.0);
        for _ in 0..20_000 {
            src.data_fill(0.0);
        }
        src.flush_buffer();
        let out = src.take_output();
        assert!(!out.is_empty());
        assert!(out.iter().all(|&s| s.abs() < 1e-4));
    }

    #[test]
    fn output_stays_finite_for_unit_impulse_train() {
        let mut src = SampleRateConverter::<f64>::new(48000.0, 16000.0);
        for i in 0..20_000 {
            src.data_fill(if i % 200 == 0 { 1.0 } else { 0.0 });
        }
        src.flush_buffer();
        let out = src.take_output();
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn upsampling_produces_more_samples_than_downsampling() {
        let mut up = SampleRateConverter::<f64>::new(22050.0, 44100.0);
        let mut down = SampleRateConverter::<f64>::new(44100.0, 22050.0);
        for i in 0..20_000 {
            let x = if i % 97 == 0 { 1.0 } else { 0.0 };
            up.data_fill(x);
            down.data_fill(x);
        }
        up.flush_buffer();
        down.flush_buffer();
        assert!(up.take_output().len() > down.take_output().len());
    }

    #[test]
    fn reset_clears_pending_output() {
        let mut src = SampleRateConverter::<f64>::new(48000.0, 44100.0);
        for i in 0..500 {
            src.data_fill(if i == 0 { 1.0 } else { 0.0 });
        }
        src.reset();
        assert!(src.take_output().is_empty());
    }
}
