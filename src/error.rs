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

use thiserror::Error;

/// Errors raised while extracting a [`Configuration`](crate::Configuration) from a key/value map.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("required configuration key '{0}' is missing")]
    Missing(String),

    #[error("configuration key '{key}' has value '{value}' that could not be parsed as {expected}")]
    Parse {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("configuration key '{key}' has value {value} outside the valid range [{min}, {max}]")]
    Range {
        key: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Errors raised by scalar filters whose coefficients depend on a caller-supplied cutoff.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum FilterError {
    #[error("cutoff frequency {cutoff} Hz is outside the valid range [{min}, {max}] for a sample rate of {sample_rate} Hz")]
    CutoffOutOfRange {
        cutoff: f64,
        sample_rate: f64,
        min: f64,
        max: f64,
    },
}

/// Errors raised while constructing the wavetable glottal source.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum SourceError {
    #[error("glottal pulse shape is invalid: tp={tp}, tn_min={tn_min}, tn_max={tn_max} percent of period (require tp, tn_min > 0 and tp + tn_max <= 100)")]
    InvalidShape { tp: f64, tn_min: f64, tn_max: f64 },
}

/// Errors raised by the pole-zero radiation impedance used by waveguide variant 5.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ImpedanceError {
    #[error("internal sample rate {0} Hz is too low for a pole-zero radiation impedance (minimum 50000 Hz)")]
    SampleRateTooLow(f64),
}

/// Errors raised while parsing one line of a batch parameter stream.
///
/// Not used by [`Model`](crate::Model) itself, which only ever accepts already-sized slices;
/// this exists for the optional helper that splits a text stream into parameter frames.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamError {
    #[error("parameter frame has {found} fields, expected {expected}")]
    ShortFrame { found: usize, expected: usize },
}

/// The union of every way [`Model::new`](crate::Model::new) can fail.
///
/// Most variants only ever fail while loading the configuration; variant 5 additionally
/// constructs a radiation impedance per boundary, which can itself reject a sample rate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Impedance(#[from] ImpedanceError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}
