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

//! The scattering-junction transmission line: an oropharyngeal tube coupled to a nasal tract
//! through a three-way junction at the velum.
//!
//! Two port formulations exist. [`PressureWaveguide`] is used by the small (10-section
//! oropharynx / 6-section nasal tract) and large (30/18) pressure-wave variants, terminating
//! each tube in a reflection/radiation filter pair. [`FlowWaveguide`] is used by the flow-wave
//! variant (30 oropharynx / 21 nasal sections), terminating each tube in a
//! [`PoleZeroRadiationImpedance`] and returning the raw combined output for the model façade
//! to differentiate downstream.

use crate::filters::{Filter, RadiationFilter, ReflectionFilter};
use crate::float::VtmFloat;
use crate::impedance::PoleZeroRadiationImpedance;
use crate::error::ImpedanceError;

/// How many internal samples separate adjacent sections, beyond the baseline single-sample
/// delay. Only variants other than the original (fixed at 0) make this configurable.
pub type SectionDelay = usize;

/// The size class of a pressure-wave tube: 10 oropharynx / 6 nasal sections (the original
/// topology) or 30 / 18 (the finer-grained one).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PressureSize {
    Small,
    Large,
}

impl PressureSize {
    fn oro_sections(self) -> usize {
        match self {
            PressureSize::Small => 10,
            PressureSize::Large => 30,
        }
    }
    fn nasal_sections(self) -> usize {
        match self {
            PressureSize::Small => 6,
            PressureSize::Large => 18,
        }
    }
}

fn idx(section: usize, ptr: usize, delay: usize) -> usize {
    section * (delay + 1) + ptr
}

/// A pressure-wave scattering-junction transmission line (waveguide variants using the
/// alpha-weighted three-way junction and reflection/radiation mouth and nose boundaries).
pub struct PressureWaveguide<F: VtmFloat> {
    size: PressureSize,
    delay: usize,
    in_ptr: usize,
    out_ptr: usize,

    oro_top: Vec<F>,
    oro_bottom: Vec<F>,
    nasal_top: Vec<F>,
    nasal_bottom: Vec<F>,

    /// Two-port coefficients between oropharynx regions; the last entry is the mouth aperture.
    oro_junction: Vec<F>,
    /// Two-port coefficients between nasal regions; the last entry is the nose aperture.
    nasal_junction: Vec<F>,
    /// Three-way alpha weights at the velum (left, right, upper), summing to 2.
    velum_alpha: [F; 3],

    /// Per-section frication gains, always eight taps regardless of size class.
    pub frication_tap: [F; 8],

    damping_factor: F,
    mouth_reflection: ReflectionFilter<F>,
    mouth_radiation: RadiationFilter<F>,
    nose_reflection: ReflectionFilter<F>,
    nose_radiation: RadiationFilter<F>,
}

impl<F: VtmFloat> PressureWaveguide<F> {
    pub fn new(size: PressureSize, delay: usize) -> Self {
        let n_oro = size.oro_sections();
        let n_nasal = size.nasal_sections();
        let stride = delay + 1;
        Self {
            size,
            delay,
            in_ptr: 1.min(delay),
            out_ptr: 0,
            oro_top: vec![F::zero(); n_oro * stride],
            oro_bottom: vec![F::zero(); n_oro * stride],
            nasal_top: vec![F::zero(); n_nasal * stride],
            nasal_bottom: vec![F::zero(); n_nasal * stride],
            oro_junction: vec![F::zero(); 8],
            nasal_junction: vec![F::zero(); 6],
            velum_alpha: [F::zero(); 3],
            frication_tap: [F::zero(); 8],
            damping_factor: F::one(),
            mouth_reflection: ReflectionFilter::new(),
            mouth_radiation: RadiationFilter::new(),
            nose_reflection: ReflectionFilter::new(),
            nose_radiation: RadiationFilter::new(),
        }
    }

    /// Sets the fixed aperture coefficients for the mouth and nose boundary filters. Computed
    /// once from the configured mouth/nose cutoff frequencies and left unchanged for the life
    /// of the model, unlike the per-step junction coefficients.
    pub fn set_boundary_coefficients(&mut self, mouth_coeff: F, nose_coeff: F) {
        self.mouth_reflection.update(mouth_coeff);
        self.mouth_radiation.update(mouth_coeff);
        self.nose_reflection.update(nose_coeff);
        self.nose_radiation.update(nose_coeff);
    }

    pub fn reset(&mut self) {
        for v in self.oro_top.iter_mut().chain(self.oro_bottom.iter_mut()) {
            *v = F::zero();
        }
        for v in self.nasal_top.iter_mut().chain(self.nasal_bottom.iter_mut()) {
            *v = F::zero();
        }
        self.in_ptr = 1.min(self.delay);
        self.out_ptr = 0;
        self.mouth_reflection.reset();
        self.mouth_radiation.reset();
        self.nose_reflection.reset();
        self.nose_radiation.reset();
    }

    pub fn set_damping_factor(&mut self, damping_factor: F) {
        self.damping_factor = damping_factor;
    }

    /// `region_radius[i]` is R1..R8 (always eight, even for the 30-section tube, since the
    /// finer mesh still groups into eight physiological regions); `velum_radius` is the
    /// current velum opening; `aperture_radius` and `nasal_radius` are fixed geometry.
    pub fn calculate_tube_coefficients(
        &mut self,
        region_radius: &[F; 8],
        velum_radius: F,
        aperture_radius: F,
        nasal_radius: &[F; 6],
    ) {
        for i in 0..7 {
            let a2 = region_radius[i] * region_radius[i];
            let b2 = region_radius[i + 1] * region_radius[i + 1];
            self.oro_junction[i] = (a2 - b2) / (a2 + b2);
        }
        let a2 = region_radius[7] * region_radius[7];
        let b2 = aperture_radius * aperture_radius;
        self.oro_junction[7] = (a2 - b2) / (a2 + b2);

        // Junction sits in the middle of R4: the oropharynx side uses R4's radius for both
        // of its own ports.
        let r0_2 = region_radius[3] * region_radius[3];
        let r1_2 = r0_2;
        let r2_2 = velum_radius * velum_radius;
        let sum = F::from_f64(2.0) / (r0_2 + r1_2 + r2_2);
        self.velum_alpha = [sum * r0_2, sum * r1_2, sum * r2_2];

        let velum_to_n2 = {
            let a2 = r2_2;
            let b2 = nasal_radius[1] * nasal_radius[1];
            (a2 - b2) / (a2 + b2)
        };
        match self.size {
            PressureSize::Small => {
                self.nasal_junction[0] = velum_to_n2;
                for i in 1..5 {
                    let a2 = nasal_radius[i] * nasal_radius[i];
                    let b2 = nasal_radius[i + 1] * nasal_radius[i + 1];
                    self.nasal_junction[i] = (a2 - b2) / (a2 + b2);
                }
            }
            PressureSize::Large => {
                self.nasal_junction[0] = velum_to_n2;
                for i in 1..5 {
                    let a2 = nasal_radius[i] * nasal_radius[i];
                    let b2 = nasal_radius[i + 1] * nasal_radius[i + 1];
                    self.nasal_junction[i] = (a2 - b2) / (a2 + b2);
                }
            }
        }
        let a2 = nasal_radius[5] * nasal_radius[5];
        let b2 = aperture_radius * aperture_radius;
        self.nasal_junction[5] = (a2 - b2) / (a2 + b2);
    }

    fn swap_pointers(&mut self) {
        let stride = self.delay + 1;
        self.in_ptr = self.out_ptr;
        self.out_ptr = if self.out_ptr == self.delay { 0 } else { self.out_ptr + 1 };
        let _ = stride;
    }

    fn or_i(&self, section: usize, ptr: usize) -> usize {
        idx(section, ptr, self.delay)
    }
    fn na_i(&self, section: usize, ptr: usize) -> usize {
        idx(section, ptr, self.delay)
    }

    fn propagate(&mut self, tops: bool, left: usize, right: usize, fric: F) {
        let (out, ip) = (self.out_ptr, self.in_ptr);
        if tops {
            let l = self.or_i(left, out);
            let r = self.or_i(right, ip);
            self.oro_top[r] = self.oro_top[l] * self.damping_factor + fric;
            let lb = self.or_i(left, ip);
            let rb = self.or_i(right, out);
            self.oro_bottom[lb] = self.oro_bottom[rb] * self.damping_factor;
        } else {
            let l = self.na_i(left, out);
            let r = self.na_i(right, ip);
            self.nasal_top[r] = self.nasal_top[l] * self.damping_factor + fric;
            let lb = self.na_i(left, ip);
            let rb = self.na_i(right, out);
            self.nasal_bottom[lb] = self.nasal_bottom[rb] * self.damping_factor;
        }
    }

    fn junction2_oro(&mut self, left: usize, right: usize, coeff: F, fric: F) {
        let (out, ip) = (self.out_ptr, self.in_ptr);
        let lt = self.oro_top[self.or_i(left, out)];
        let rb = self.oro_bottom[self.or_i(right, out)];
        let delta = coeff * (lt - rb);
        self.oro_top[self.or_i(right, ip)] = (lt + delta) * self.damping_factor + fric;
        self.oro_bottom[self.or_i(left, ip)] = (rb + delta) * self.damping_factor;
    }

    fn junction2_nasal(&mut self, left: usize, right: usize, coeff: F) {
        let (out, ip) = (self.out_ptr, self.in_ptr);
        let lt = self.nasal_top[self.na_i(left, out)];
        let rb = self.nasal_bottom[self.na_i(right, out)];
        let delta = coeff * (lt - rb);
        self.nasal_top[self.na_i(right, ip)] = (lt + delta) * self.damping_factor;
        self.nasal_bottom[self.na_i(left, ip)] = (rb + delta) * self.damping_factor;
    }

    fn velum_junction(&mut self, left: usize, right: usize, fric: F) {
        let (out, ip) = (self.out_ptr, self.in_ptr);
        let lt = self.oro_top[self.or_i(left, out)];
        let rb = self.oro_bottom[self.or_i(right, out)];
        let ub = self.nasal_bottom[self.na_i(0, out)];
        let pressure = self.velum_alpha[0] * lt + self.velum_alpha[1] * rb + self.velum_alpha[2] * ub;
        self.oro_bottom[self.or_i(left, ip)] = (pressure - lt) * self.damping_factor;
        self.oro_top[self.or_i(right, ip)] = (pressure - rb) * self.damping_factor + fric;
        self.nasal_top[self.na_i(0, ip)] = (pressure - ub) * self.damping_factor;
    }

    /// Runs one internal sample and returns the summed mouth + nose output.
    pub fn step(&mut self, input: F, frication: F) -> F {
        self.swap_pointers();
        let (out, ip) = (self.out_ptr, self.in_ptr);

        let s1b = self.oro_bottom[self.or_i(0, out)];
        self.oro_top[self.or_i(0, ip)] = s1b * self.damping_factor + input;

        match self.size {
            PressureSize::Small => self.step_small(frication),
            PressureSize::Large => self.step_large(frication),
        }

        let n_oro = self.size.oro_sections();
        let n_nasal = self.size.nasal_sections();
        let last_oro = n_oro - 1;
        let c_mouth = self.oro_junction[7];
        let top_last = self.oro_top[self.or_i(last_oro, out)];
        let reflected = self.mouth_reflection.filter(c_mouth * top_last);
        self.oro_bottom[self.or_i(last_oro, ip)] = self.damping_factor * reflected;
        let mut output = self.mouth_radiation.filter((F::one() + c_mouth) * top_last);

        let last_nasal = n_nasal - 1;
        let c_nose = self.nasal_junction[5];
        let ntop_last = self.nasal_top[self.na_i(last_nasal, out)];
        let nreflected = self.nose_reflection.filter(c_nose * ntop_last);
        self.nasal_bottom[self.na_i(last_nasal, ip)] = self.damping_factor * nreflected;
        output = output + self.nose_radiation.filter((F::one() + c_nose) * ntop_last);

        output
    }

    fn step_small(&mut self, frication: F) {
        let fc = self.frication_tap;
        self.junction2_oro(0, 1, self.oro_junction[0], F::zero());
        self.junction2_oro(1, 2, self.oro_junction[1], fc[0] * frication);
        self.junction2_oro(2, 3, self.oro_junction[2], fc[1] * frication);
        self.velum_junction(3, 4, fc[2] * frication);
        self.junction2_oro(4, 5, self.oro_junction[3], fc[3] * frication);
        self.propagate(true, 5, 6, fc[4] * frication);
        self.junction2_oro(6, 7, self.oro_junction[4], fc[5] * frication);
        self.junction2_oro(7, 8, self.oro_junction[5], fc[6] * frication);
        self.junction2_oro(8, 9, self.oro_junction[6], fc[7] * frication);

        self.junction2_nasal(0, 1, self.nasal_junction[0]);
        self.junction2_nasal(1, 2, self.nasal_junction[1]);
        self.junction2_nasal(2, 3, self.nasal_junction[2]);
        self.junction2_nasal(3, 4, self.nasal_junction[3]);
        self.junction2_nasal(4, 5, self.nasal_junction[4]);
    }

    fn step_large(&mut self, frication: F) {
        let fc = self.frication_tap;
        self.propagate(true, 0, 1, F::zero());
        self.propagate(true, 1, 2, F::zero());
        self.junction2_oro(2, 3, self.oro_junction[0], F::zero());
        self.propagate(true, 3, 4, F::zero());
        self.junction2_oro(4, 5, self.oro_junction[1], fc[0] * frication);
        self.propagate(true, 5, 6, F::zero());
        self.propagate(true, 6, 7, F::zero());
        self.propagate(true, 7, 8, F::zero());
        self.junction2_oro(8, 9, self.oro_junction[2], fc[1] * frication);
        self.propagate(true, 9, 10, F::zero());
        self.propagate(true, 10, 11, F::zero());
        self.velum_junction(11, 12, fc[2] * frication);
        self.propagate(true, 12, 13, F::zero());
        self.propagate(true, 13, 14, F::zero());
        self.junction2_oro(14, 15, self.oro_junction[3], fc[3] * frication);
        self.propagate(true, 15, 16, F::zero());
        self.propagate(true, 16, 17, F::zero());
        self.propagate(true, 17, 18, fc[4] * frication);
        self.propagate(true, 18, 19, F::zero());
        self.propagate(true, 19, 20, F::zero());
        self.junction2_oro(20, 21, self.oro_junction[4], fc[5] * frication);
        self.propagate(true, 21, 22, F::zero());
        self.propagate(true, 22, 23, F::zero());
        self.propagate(true, 23, 24, F::zero());
        self.junction2_oro(24, 25, self.oro_junction[5], fc[6] * frication);
        self.propagate(true, 25, 26, F::zero());
        self.junction2_oro(26, 27, self.oro_junction[6], fc[7] * frication);
        self.propagate(true, 27, 28, F::zero());
        self.propagate(true, 28, 29, F::zero());

        self.propagate(false, 0, 1, F::zero());
        self.propagate(false, 1, 2, F::zero());
        self.junction2_nasal(2, 3, self.nasal_junction[0]);
        self.propagate(false, 3, 4, F::zero());
        self.propagate(false, 4, 5, F::zero());
        self.junction2_nasal(5, 6, self.nasal_junction[1]);
        self.propagate(false, 6, 7, F::zero());
        self.propagate(false, 7, 8, F::zero());
        self.junction2_nasal(8, 9, self.nasal_junction[2]);
        self.propagate(false, 9, 10, F::zero());
        self.propagate(false, 10, 11, F::zero());
        self.junction2_nasal(11, 12, self.nasal_junction[3]);
        self.propagate(false, 12, 13, F::zero());
        self.propagate(false, 13, 14, F::zero());
        self.junction2_nasal(14, 15, self.nasal_junction[4]);
        self.propagate(false, 15, 16, F::zero());
        self.propagate(false, 16, 17, F::zero());
    }
}

/// A flow-wave scattering-junction transmission line: fixed at 30 oropharynx / 21 nasal
/// sections (regions NR1-NR7), terminated by a [`PoleZeroRadiationImpedance`] at the mouth
/// and nose, with a central-difference output stage applied downstream by the model façade
/// after resampling.
///
/// The nasal tract has only six actual two-port junctions (NJ1-NJ6): NJ1 sits between the
/// velum and NR2 and is recomputed every step from the live velum radius, while NJ2-NJ6 are
/// fixed from the configured NR2-NR7 radii and computed once via [`init_nasal_cavity`].
/// NR7 does not terminate in a seventh junction; instead it fixes the radius fed once to the
/// nasal radiation impedance.
///
/// [`init_nasal_cavity`]: FlowWaveguide::init_nasal_cavity
pub struct FlowWaveguide<F: VtmFloat> {
    delay: usize,
    in_ptr: usize,
    out_ptr: usize,

    oro_top: Vec<F>,
    oro_bottom: Vec<F>,
    nasal_top: Vec<F>,
    nasal_bottom: Vec<F>,

    /// J1-J7 between oropharynx regions; the mouth aperture (R8-to-air) is handled entirely
    /// by `mouth_impedance`, not by a Junction2 coefficient.
    oro_junction: Vec<F>,
    /// NJ1 (dynamic, index 0) through NJ6 (fixed, indices 1..=5).
    nasal_junction: Vec<F>,
    velum_coeff: [F; 3],

    damping_factor: F,
    mouth_impedance: PoleZeroRadiationImpedance<F>,
    nose_impedance: PoleZeroRadiationImpedance<F>,
}

const LARGE_ORO: usize = 30;
const LARGE_NASAL: usize = 21;

impl<F: VtmFloat> FlowWaveguide<F> {
    pub fn new(delay: usize, internal_sample_rate: F) -> Result<Self, ImpedanceError> {
        let stride = delay + 1;
        Ok(Self {
            delay,
            in_ptr: 1.min(delay),
            out_ptr: 0,
            oro_top: vec![F::zero(); LARGE_ORO * stride],
            oro_bottom: vec![F::zero(); LARGE_ORO * stride],
            nasal_top: vec![F::zero(); LARGE_NASAL * stride],
            nasal_bottom: vec![F::zero(); LARGE_NASAL * stride],
            oro_junction: vec![F::zero(); 7],
            nasal_junction: vec![F::zero(); 6],
            velum_coeff: [F::zero(); 3],
            damping_factor: F::one(),
            mouth_impedance: PoleZeroRadiationImpedance::new(internal_sample_rate)?,
            nose_impedance: PoleZeroRadiationImpedance::new(internal_sample_rate)?,
        })
    }

    pub fn reset(&mut self) {
        for v in self.oro_top.iter_mut().chain(self.oro_bottom.iter_mut()) {
            *v = F::zero();
        }
        for v in self.nasal_top.iter_mut().chain(self.nasal_bottom.iter_mut()) {
            *v = F::zero();
        }
        self.in_ptr = 1.min(self.delay);
        self.out_ptr = 0;
        self.mouth_impedance.reset();
        self.nose_impedance.reset();
    }

    pub fn set_damping_factor(&mut self, damping_factor: F) {
        self.damping_factor = damping_factor;
    }

    /// One-time setup of the fixed nasal-cavity junctions NJ2-NJ6 and the nose radiation
    /// impedance, from the configured nasal radii `[NR2, NR3, NR4, NR5, NR6, NR7]`. Mirrors
    /// the reference synthesizer's `initializeNasalCavity`, called once at construction and
    /// never revisited — unlike NJ1, which tracks the live velum radius every step.
    pub fn init_nasal_cavity(&mut self, nasal_radius: &[F; 6]) {
        for i in 0..5 {
            let a2 = nasal_radius[i] * nasal_radius[i];
            let b2 = nasal_radius[i + 1] * nasal_radius[i + 1];
            self.nasal_junction[i + 1] = (a2 - b2) / (a2 + b2);
        }
        let nr7 = nasal_radius[5];
        let r = (F::from_f64(0.5) * nr7 * nr7).sqrt();
        self.nose_impedance.update(r * F::from_f64(0.01));
    }

    /// Recomputes the per-step oropharynx junctions, the three-way velum junction, and the
    /// dynamic NJ1 (velum-to-NR2) junction. `nasal_radius_nr2` is the fixed NR2 radius.
    pub fn calculate_tube_coefficients(&mut self, region_radius: &[F; 8], velum_radius: F, nasal_radius_nr2: F) {
        for i in 0..7 {
            let a2 = region_radius[i] * region_radius[i];
            let b2 = region_radius[i + 1] * region_radius[i + 1];
            self.oro_junction[i] = (a2 - b2) / (a2 + b2);
        }

        let r0_2 = region_radius[3] * region_radius[3];
        let r1_2 = r0_2;
        let r2_2 = velum_radius * velum_radius;
        let c = F::one() / (r0_2 + r1_2 + r2_2);
        self.velum_coeff = [c * (r0_2 - r1_2 - r2_2), c * (r1_2 - r0_2 - r2_2), c * (r2_2 - r0_2 - r1_2)];

        let a2 = r2_2;
        let b2 = nasal_radius_nr2 * nasal_radius_nr2;
        self.nasal_junction[0] = (a2 - b2) / (a2 + b2);
    }

    /// Updates the mouth radiation impedance from the current R8 radius (centimeters).
    /// Skipped by the caller when `constant_radius_mouth_impedance` holds, in which case this
    /// is called exactly once, at construction, instead of every step. There is no equivalent
    /// per-step update for the nose: its radiation impedance is fixed once, in
    /// [`init_nasal_cavity`](Self::init_nasal_cavity).
    pub fn update_mouth_radius(&mut self, radius_cm: F) {
        self.mouth_impedance.update(radius_cm * F::from_f64(0.01));
    }

    fn or_i(&self, section: usize, ptr: usize) -> usize {
        idx(section, ptr, self.delay)
    }
    fn na_i(&self, section: usize, ptr: usize) -> usize {
        idx(section, ptr, self.delay)
    }

    fn propagate(&mut self, tops: bool, left: usize, right: usize) {
        let (out, ip) = (self.out_ptr, self.in_ptr);
        if tops {
            self.oro_top[self.or_i(right, ip)] = self.oro_top[self.or_i(left, out)] * self.damping_factor;
            self.oro_bottom[self.or_i(left, ip)] = self.oro_bottom[self.or_i(right, out)] * self.damping_factor;
        } else {
            self.nasal_top[self.na_i(right, ip)] = self.nasal_top[self.na_i(left, out)] * self.damping_factor;
            self.nasal_bottom[self.na_i(left, ip)] = self.nasal_bottom[self.na_i(right, out)] * self.damping_factor;
        }
    }

    fn junction2_oro(&mut self, left: usize, right: usize, coeff: F) {
        let (out, ip) = (self.out_ptr, self.in_ptr);
        let lt = self.oro_top[self.or_i(left, out)];
        let rb = self.oro_bottom[self.or_i(right, out)];
        let delta = coeff * (lt + rb);
        self.oro_top[self.or_i(right, ip)] = (lt - delta) * self.damping_factor;
        self.oro_bottom[self.or_i(left, ip)] = (rb + delta) * self.damping_factor;
    }

    fn junction2_nasal(&mut self, left: usize, right: usize, coeff: F) {
        let (out, ip) = (self.out_ptr, self.in_ptr);
        let lt = self.nasal_top[self.na_i(left, out)];
        let rb = self.nasal_bottom[self.na_i(right, out)];
        let delta = coeff * (lt + rb);
        self.nasal_top[self.na_i(right, ip)] = (lt - delta) * self.damping_factor;
        self.nasal_bottom[self.na_i(left, ip)] = (rb + delta) * self.damping_factor;
    }

    fn velum_junction(&mut self, left: usize, right: usize) {
        let (out, ip) = (self.out_ptr, self.in_ptr);
        let lt = self.oro_top[self.or_i(left, out)];
        let rb = self.oro_bottom[self.or_i(right, out)];
        let ub = self.nasal_bottom[self.na_i(0, out)];
        let influx = lt + rb + ub;
        self.oro_bottom[self.or_i(left, ip)] = (rb + ub + self.velum_coeff[0] * influx) * self.damping_factor;
        self.oro_top[self.or_i(right, ip)] = (lt + ub + self.velum_coeff[1] * influx) * self.damping_factor;
        self.nasal_top[self.na_i(0, ip)] = (lt + rb + self.velum_coeff[2] * influx) * self.damping_factor;
    }

    /// Runs one internal sample. `frication_position` is in section units `[0, 7]`;
    /// `frication_amplitude` is the linear (not dB) frication gain; `glottal_loss_factor`
    /// scales the glottal-side reflection into section 1, distinct from the uniform
    /// `damping_factor` applied everywhere else. Returns the raw, undifferentiated combined
    /// mouth+nose flow; the model façade differentiates and rescales after resampling.
    pub fn step(&mut self, input: F, glottal_loss_factor: F, frication_position: F, frication_amplitude: F) -> F {
        self.in_ptr = self.out_ptr;
        self.out_ptr = if self.out_ptr == self.delay { 0 } else { self.out_ptr + 1 };
        let (out, ip) = (self.out_ptr, self.in_ptr);

        let s1b = self.oro_bottom[self.or_i(0, out)];
        self.oro_top[self.or_i(0, ip)] = s1b * glottal_loss_factor + input;

        self.propagate(true, 0, 1);
        self.propagate(true, 1, 2);
        self.junction2_oro(2, 3, self.oro_junction[0]);
        self.propagate(true, 3, 4);
        self.junction2_oro(4, 5, self.oro_junction[1]);
        self.propagate(true, 5, 6);
        self.propagate(true, 6, 7);
        self.propagate(true, 7, 8);
        self.junction2_oro(8, 9, self.oro_junction[2]);
        self.propagate(true, 9, 10);
        self.propagate(true, 10, 11);
        self.velum_junction(11, 12);
        self.propagate(true, 12, 13);
        self.propagate(true, 13, 14);
        self.junction2_oro(14, 15, self.oro_junction[3]);
        self.propagate(true, 15, 16);
        self.propagate(true, 16, 17);
        self.propagate(true, 17, 18);
        self.propagate(true, 18, 19);
        self.propagate(true, 19, 20);
        self.junction2_oro(20, 21, self.oro_junction[4]);
        self.propagate(true, 21, 22);
        self.propagate(true, 22, 23);
        self.propagate(true, 23, 24);
        self.junction2_oro(24, 25, self.oro_junction[5]);
        self.propagate(true, 25, 26);
        self.junction2_oro(26, 27, self.oro_junction[6]);
        self.propagate(true, 27, 28);
        self.propagate(true, 28, 29);

        let top_last = self.oro_top[self.or_i(29, out)];
        let (mouth_t, mouth_r) = self.mouth_impedance.process(top_last);
        self.oro_bottom[self.or_i(29, ip)] = mouth_r * self.damping_factor;

        self.propagate(false, 0, 1);
        self.propagate(false, 1, 2);
        self.junction2_nasal(2, 3, self.nasal_junction[0]);
        self.propagate(false, 3, 4);
        self.propagate(false, 4, 5);
        self.junction2_nasal(5, 6, self.nasal_junction[1]);
        self.propagate(false, 6, 7);
        self.propagate(false, 7, 8);
        self.junction2_nasal(8, 9, self.nasal_junction[2]);
        self.propagate(false, 9, 10);
        self.propagate(false, 10, 11);
        self.junction2_nasal(11, 12, self.nasal_junction[3]);
        self.propagate(false, 12, 13);
        self.propagate(false, 13, 14);
        self.junction2_nasal(14, 15, self.nasal_junction[4]);
        self.propagate(false, 15, 16);
        self.propagate(false, 16, 17);
        self.junction2_nasal(17, 18, self.nasal_junction[5]);
        self.propagate(false, 18, 19);
        self.propagate(false, 19, 20);

        let ntop_last = self.nasal_top[self.na_i(20, out)];
        let (nose_t, nose_r) = self.nose_impedance.process(ntop_last);
        self.nasal_bottom[self.na_i(20, ip)] = nose_r * self.damping_factor;

        // Frication is injected as a continuous position between sections 6 and 28 (0-based
        // 5..27), split fractionally between the two nearest sections.
        let offset = F::from_f64(22.0) * (frication_position / F::from_f64(7.0));
        let offset_int = offset.to_f64().floor() as usize;
        let frac = offset - F::from_f64(offset_int as f64);
        let value = frication_amplitude;
        let base = 5 + offset_int;
        self.oro_top[self.or_i(base, ip)] = self.oro_top[self.or_i(base, ip)] + value * (F::one() - frac);
        if base + 1 < 27 {
            self.oro_top[self.or_i(base + 1, ip)] = self.oro_top[self.or_i(base + 1, ip)] + value * frac;
        }

        mouth_t + nose_t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_small() -> PressureWaveguide<f64> {
        let mut wg = PressureWaveguide::<f64>::new(PressureSize::Small, 0);
        wg.set_damping_factor(0.98);
        wg.calculate_tube_coefficients(
            &[0.8, 1.0, 1.3, 1.5, 1.5, 1.2, 1.0, 1.0],
            0.01,
            3.05,
            &[0.0, 1.35, 1.96, 1.91, 1.3, 0.73],
        );
        wg
    }

    #[test]
    fn silence_in_produces_finite_bounded_output() {
        let mut wg = make_small();
        for _ in 0..2000 {
            let y = wg.step(0.0, 0.0);
            assert!(y.is_finite());
            assert!(y.abs() < 10.0);
        }
    }

    #[test]
    fn impulse_response_decays_to_silence() {
        let mut wg = make_small();
        let mut last = 0.0;
        for i in 0..5000 {
            let input = if i == 0 { 1.0 } else { 0.0 };
            last = wg.step(input, 0.0);
        }
        assert!(last.abs() < 1e-3);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut wg = make_small();
        for i in 0..100 {
            wg.step(if i < 5 { 1.0 } else { 0.0 }, 0.0);
        }
        wg.reset();
        let mut after_reset = Vec::new();
        for i in 0..50 {
            after_reset.push(wg.step(if i < 5 { 1.0 } else { 0.0 }, 0.0));
        }

        let mut wg2 = make_small();
        let mut fresh = Vec::new();
        for i in 0..50 {
            fresh.push(wg2.step(if i < 5 { 1.0 } else { 0.0 }, 0.0));
        }
        assert_eq!(after_reset, fresh);
    }

    #[test]
    fn large_topology_is_also_stable() {
        let mut wg = PressureWaveguide::<f64>::new(PressureSize::Large, 0);
        wg.set_damping_factor(0.98);
        wg.calculate_tube_coefficients(
            &[0.8, 1.0, 1.3, 1.5, 1.5, 1.2, 1.0, 1.0],
            0.01,
            3.05,
            &[0.0, 1.35, 1.96, 1.91, 1.3, 0.73],
        );
        for i in 0..2000 {
            let input = if i < 5 { 0.3 } else { 0.0 };
            let y = wg.step(input, 0.0);
            assert!(y.is_finite());
        }
    }

    fn make_flow() -> FlowWaveguide<f64> {
        let mut wg = FlowWaveguide::<f64>::new(0, 48000.0).unwrap();
        wg.set_damping_factor(0.98);
        wg.init_nasal_cavity(&[1.35, 1.96, 1.91, 1.3, 0.73, 0.3]);
        wg.calculate_tube_coefficients(&[0.8, 1.0, 1.3, 1.5, 1.5, 1.2, 1.0, 1.0], 0.3, 1.35);
        wg
    }

    #[test]
    fn flow_waveguide_is_stable_and_finite() {
        let mut wg = make_flow();
        for i in 0..3000 {
            let input = if i < 5 { 0.3 } else { 0.0 };
            let y = wg.step(input, 0.95, 3.5, 0.0);
            assert!(y.is_finite());
            assert!(y.abs() < 50.0);
        }
    }

    #[test]
    fn flow_waveguide_reset_restores_initial_state() {
        let mut wg = make_flow();
        for i in 0..100 {
            wg.step(if i < 5 { 0.3 } else { 0.0 }, 0.95, 3.5, 0.0);
        }
        wg.reset();
        let mut after_reset = Vec::new();
        for i in 0..50 {
            after_reset.push(wg.step(if i < 5 { 0.3 } else { 0.0 }, 0.95, 3.5, 0.0));
        }

        let mut wg2 = make_flow();
        let mut fresh = Vec::new();
        for i in 0..50 {
            fresh.push(wg2.step(if i < 5 { 0.3 } else { 0.0 }, 0.95, 3.5, 0.0));
        }
        assert_eq!(after_reset, fresh);
    }

    /// Invariant 6: the three-way velum junction conserves the summed outgoing flow against
    /// the summed incoming flow.
    #[test]
    fn velum_junction_conserves_flow() {
        let mut wg = make_flow();
        wg.set_damping_factor(1.0);
        let (out, ip) = (wg.out_ptr, wg.in_ptr);
        wg.oro_top[wg.or_i(11, out)] = 0.4;
        wg.oro_bottom[wg.or_i(12, out)] = -0.2;
        wg.nasal_bottom[wg.na_i(0, out)] = 0.1;
        let lt = wg.oro_top[wg.or_i(11, out)];
        let rb = wg.oro_bottom[wg.or_i(12, out)];
        let ub = wg.nasal_bottom[wg.na_i(0, out)];

        wg.velum_junction(11, 12);

        let sum_out = wg.oro_bottom[wg.or_i(11, ip)] + wg.oro_top[wg.or_i(12, ip)] + wg.nasal_top[wg.na_i(0, ip)];
        let sum_in = lt + rb + ub;
        assert!((sum_out - sum_in).abs() < 1e-9, "sum_out={} sum_in={}", sum_out, sum_in);
    }

    #[test]
    fn init_nasal_cavity_sets_fixed_junctions_only() {
        let mut wg = FlowWaveguide::<f64>::new(0, 48000.0).unwrap();
        assert_eq!(wg.nasal_junction, vec![0.0; 6]);
        wg.init_nasal_cavity(&[1.35, 1.96, 1.91, 1.3, 0.73, 0.3]);
        assert_eq!(wg.nasal_junction[0], 0.0, "NJ1 stays dynamic, untouched by init_nasal_cavity");
        for coeff in &wg.nasal_junction[1..] {
            assert_ne!(*coeff, 0.0);
        }
    }
}
