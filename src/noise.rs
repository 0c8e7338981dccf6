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

//! The pseudo-random source feeding the noise-shaping filter and, downstream, aspiration and
//! frication.

use crate::float::VtmFloat;

const INITIAL_SEED: f64 = 0.7892347;
const FACTOR: f64 = 377.0;

/// A multiplicative congruential generator: deterministic, reproducible given the same
/// initial seed, with no dependency on OS entropy.
#[derive(Copy, Clone, Debug)]
pub struct NoiseSource<F: VtmFloat> {
    seed: F,
}

impl<F: VtmFloat> NoiseSource<F> {
    pub fn new() -> Self {
        Self {
            seed: F::from_f64(INITIAL_SEED),
        }
    }

    pub fn reset(&mut self) {
        self.seed = F::from_f64(INITIAL_SEED);
    }

    pub fn get_sample(&mut self) -> F {
        let product = self.seed * F::from_f64(FACTOR);
        let truncated = F::from_f64(product.to_f64().trunc());
        self.seed = product - truncated;
        self.seed - F::from_f64(0.5)
    }
}

impl<F: VtmFloat> Default for NoiseSource<F> {
    fn default() -> Self {
        Self::new()
    }
}
