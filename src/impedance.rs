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

//! Flow-domain radiation impedance boundary used by waveguide variant 5.
//!
//! The impedance is a pole-zero approximation of a circular piston in a spherical baffle,
//! matched so that `Re(Zr) = 1/2` at a radius-dependent transition frequency and `Zr = 1` at
//! Nyquist. See Liljencrants (1985) and Laine (1992) for the underlying derivation.

use crate::error::ImpedanceError;
use crate::float::VtmFloat;
use std::f64::consts::PI;

const TRANSITION_RADIUS: f64 = 0.5e-2;
const MIN_SAMPLE_RATE: f64 = 50_000.0;

/// A pole-zero radiation impedance boundary: transforms an incident flow into transmitted
/// (radiated) and reflected flows.
#[derive(Copy, Clone, Debug)]
pub struct PoleZeroRadiationImpedance<F: VtmFloat> {
    sample_period: F,
    in1: F,
    out_t1: F,
    out_r1: F,
    c_t1: F,
    c_t2: F,
    c_t3: F,
    c_r1: F,
    c_r2: F,
    c_r3: F,
    prev_radius: F,
}

impl<F: VtmFloat> PoleZeroRadiationImpedance<F> {
    /// `sample_rate` must be at least 50 kHz; the pole-zero fit is only valid there.
    pub fn new(sample_rate: F) -> Result<Self, ImpedanceError> {
        if sample_rate.to_f64() < MIN_SAMPLE_RATE {
            return Err(ImpedanceError::SampleRateTooLow(sample_rate.to_f64()));
        }
        Ok(Self {
            sample_period: F::one() / sample_rate,
            in1: F::zero(),
            out_t1: F::zero(),
            out_r1: F::zero(),
            c_t1: F::zero(),
            c_t2: F::zero(),
            c_t3: F::zero(),
            c_r1: F::zero(),
            c_r2: F::zero(),
            c_r3: F::zero(),
            prev_radius: F::from_f64(-1.0),
        })
    }

    pub fn reset(&mut self) {
        self.in1 = F::zero();
        self.out_t1 = F::zero();
        self.out_r1 = F::zero();
        self.prev_radius = F::from_f64(-1.0);
    }

    fn transition_frequency(radius: F) -> F {
        let radius = if radius.to_f64() < TRANSITION_RADIUS {
            F::from_f64(TRANSITION_RADIUS)
        } else {
            radius
        };
        F::from_f64(62.3371) / radius + F::from_f64(320.204)
    }

    /// Recomputes the pole/zero coefficients for a new boundary radius. A no-op if the
    /// radius hasn't changed since the last call.
    pub fn update(&mut self, radius: F) {
        if radius == self.prev_radius {
            return;
        }
        self.prev_radius = radius;

        let trans_freq = Self::transition_frequency(radius);
        let cos_wt = (F::from_f64(2.0 * PI) * trans_freq * self.sample_period).cos();

        let qa = F::from_f64(2.0) * cos_wt;
        let qb = F::from_f64(-2.0) * (cos_wt + F::one());
        let qc = cos_wt + F::one();
        let delta = qb * qb - F::from_f64(4.0) * qa * qc;
        let mut a = (-qb - delta.sqrt()) / (F::from_f64(2.0) * qa);
        let b = F::from_f64(2.0) * a - F::one();

        if radius.to_f64() < TRANSITION_RADIUS {
            a = a * F::from_f64(40391.2) * (radius * radius);
        }

        let coef = F::one() / (a + F::one());
        let a_plus_b = a + b;

        self.c_t1 = a_plus_b * coef;
        self.c_t2 = F::from_f64(2.0) * coef;
        self.c_t3 = F::from_f64(-2.0) * b * coef;

        self.c_r1 = a_plus_b * coef;
        self.c_r2 = (a - F::one()) * coef;
        self.c_r3 = (b - a) * coef;
    }

    /// Returns `(transmitted, reflected)` flow for the given incident flow.
    pub fn process(&mut self, input: F) -> (F, F) {
        let out_t = self.c_t1 * self.out_t1 + self.c_t2 * input + self.c_t3 * self.in1;
        let out_r = self.c_r1 * self.out_r1 + self.c_r2 * input + self.c_r3 * self.in1;
        self.in1 = input;
        self.out_t1 = out_t;
        self.out_r1 = out_r;
        (out_t, out_r)
    }
}
