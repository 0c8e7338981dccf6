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

//! A real-time digital waveguide simulation of the human vocal tract.
//!
//! [`Model`](model::Model) drives a source-filter articulatory synthesizer: a glottal/frication
//! source feeds a scattering-junction transmission line (the [`waveguide`] module), whose output
//! is converted to the caller's output rate by the [`resampler`].

pub mod config;
pub mod error;
pub mod filters;
pub mod float;
pub mod glottal;
pub mod impedance;
pub mod model;
pub mod noise;
pub mod resampler;
pub mod waveguide;

pub use config::Configuration;
pub use error::{ConfigError, FilterError, ImpedanceError, ModelError, ParamError, SourceError};
pub use float::VtmFloat;
pub use model::{parse_parameter_line, Model, VtmVariant};

/// Number of articulatory control parameters in one frame.
pub const TOTAL_PARAMETERS: usize = 16;

/// Floor applied to every radius so scattering coefficients never divide by zero.
pub const MIN_RADIUS: f64 = 0.01;

/// Number of frication injection points in the oropharynx.
pub const TOTAL_FRIC_COEFFICIENTS: usize = 8;

/// Empirical input scaling factor carried over from the reference DSP implementation.
///
/// The theoretically correct value is `0.03125` (2⁻⁵); `0.125` is kept because it matches
/// the reference synthesizer's recorded output. See DESIGN.md.
pub const VT_SCALE: f64 = 0.125;
