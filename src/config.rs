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

//! Typed extraction of a [`Configuration`] from a `key = value` text map.
//!
//! Mirrors the reference synthesizer's `ConfigurationData::value<T>`: a required key that is
//! absent fails with [`ConfigError::Missing`], a value that won't parse fails with
//! [`ConfigError::Parse`], and a value outside an explicit range fails with
//! [`ConfigError::Range`].

use crate::error::ConfigError;
use std::collections::HashMap;

/// An immutable, validated set of construction-time parameters for [`Model`](crate::Model).
///
/// Built once via [`Configuration::from_map`]; every waveguide variant reads the subset of
/// fields it needs and ignores the rest.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    pub variant: u8,
    pub section_delay: usize,

    pub output_rate: f64,

    pub waveform: u8,
    pub glottal_pulse_tp: f64,
    pub glottal_pulse_tn_min: f64,
    pub glottal_pulse_tn_max: f64,
    pub breathiness: f64,

    pub vocal_tract_length: f64,
    pub vocal_tract_length_offset: f64,
    pub nasal_radius: [f64; 6],
    /// Variant 5's nasal geometry: `[NR2, NR3, NR4, NR5, NR6, NR7]`. Distinct from
    /// `nasal_radius` above (variants 0/2/4's `NR1..NR6`, with `NR1` a placeholder always
    /// zero) because variant 5 has a seventh nasal region and loads a disjoint key range
    /// (`nasal_radius_2` through `nasal_radius_7`, with `NR1`/velum not a config key at all).
    /// Only populated when `variant == 5`; left zeroed otherwise.
    pub nasal_radius_v5: [f64; 6],
    pub radius_coef: [f64; 8],
    pub global_radius_coef: f64,
    pub global_nasal_radius_coef: f64,
    pub aperture_radius: f64,

    pub temperature: f64,
    pub loss_factor: f64,

    pub mouth_coefficient: f64,
    pub nose_coefficient: f64,
    pub bypass: bool,

    pub throat_cutoff: f64,
    pub throat_volume: f64,

    pub noise_modulation: bool,
    pub mix_offset: f64,

    pub glottal_noise_cutoff: f64,
    pub frication_noise_cutoff: f64,
    pub frication_factor: f64,
    pub min_glottal_loss: f64,
    pub max_glottal_loss: f64,
    pub glottal_lowpass_cutoff: f64,
    pub constant_radius_mouth_impedance: bool,
    pub mouth_impedance_radius: f64,
}

/// A `key = value` text map, as read from a configuration file or assembled in memory.
type Map = HashMap<String, String>;

fn convert<T: std::str::FromStr>(map: &Map, key: &str, expected: &'static str) -> Result<T, ConfigError> {
    let raw = map.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))?;
    raw.trim().parse::<T>().map_err(|_| ConfigError::Parse {
        key: key.to_string(),
        value: raw.clone(),
        expected,
    })
}

fn convert_opt<T: std::str::FromStr>(map: &Map, key: &str, default: T, expected: &'static str) -> Result<T, ConfigError> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Parse {
            key: key.to_string(),
            value: raw.clone(),
            expected,
        }),
    }
}

fn f64_value(map: &Map, key: &str) -> Result<f64, ConfigError> {
    convert::<f64>(map, key, "a floating-point number")
}

fn f64_ranged(map: &Map, key: &str, min: f64, max: f64) -> Result<f64, ConfigError> {
    let v = f64_value(map, key)?;
    if v < min || v > max {
        return Err(ConfigError::Range {
            key: key.to_string(),
            value: v,
            min,
            max,
        });
    }
    Ok(v)
}

fn f64_default(map: &Map, key: &str, default: f64) -> Result<f64, ConfigError> {
    convert_opt::<f64>(map, key, default, "a floating-point number")
}

fn bool_default(map: &Map, key: &str, default: bool) -> Result<bool, ConfigError> {
    match map.get(key) {
        None => Ok(default),
        Some(raw) => match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => other.parse::<bool>().map_err(|_| ConfigError::Parse {
                key: key.to_string(),
                value: raw.clone(),
                expected: "0, 1, true, or false",
            }),
        },
    }
}

impl Configuration {
    /// Builds a validated `Configuration` from a `key = value` map. Accepts anything
    /// convertible into an iterator of owned `(String, String)` pairs, matching the shape a
    /// caller gets from parsing a configuration file line by line.
    pub fn from_map(entries: impl IntoIterator<Item = (String, String)>) -> Result<Self, ConfigError> {
        let map: Map = entries.into_iter().collect();

        let variant = convert::<u8>(&map, "variant", "0, 2, 4, or 5")?;
        if !matches!(variant, 0 | 2 | 4 | 5) {
            return Err(ConfigError::Range {
                key: "variant".to_string(),
                value: variant as f64,
                min: 0.0,
                max: 5.0,
            });
        }
        let section_delay = convert_opt::<usize>(&map, "section_delay", 1, "a positive integer")?;

        let output_rate = f64_ranged(&map, "output_rate", 1000.0, 200_000.0)?;

        let waveform = convert::<u8>(&map, "waveform", "0 or 1")?;

        let glottal_pulse_tp = f64_value(&map, "glottal_pulse_tp")?;
        let glottal_pulse_tn_min = f64_value(&map, "glottal_pulse_tn_min")?;
        let glottal_pulse_tn_max = f64_value(&map, "glottal_pulse_tn_max")?;
        let breathiness = f64_ranged(&map, "breathiness", 0.0, 100.0)?;

        let vocal_tract_length = f64_value(&map, "vocal_tract_length")?;
        let vocal_tract_length_offset = f64_default(&map, "vocal_tract_length_offset", 0.0)?;

        let mut nasal_radius = [0.0_f64; 6];
        let mut nasal_radius_v5 = [0.0_f64; 6];
        if variant == 5 {
            for (i, slot) in nasal_radius_v5.iter_mut().enumerate() {
                *slot = f64_value(&map, &format!("nasal_radius_{}", i + 2))?;
            }
        } else {
            for (i, slot) in nasal_radius.iter_mut().enumerate() {
                *slot = f64_value(&map, &format!("nasal_radius_{}", i + 1))?;
            }
        }

        let mut radius_coef = [1.0_f64; 8];
        for (i, slot) in radius_coef.iter_mut().enumerate() {
            *slot = f64_default(&map, &format!("radius_{}_coef", i + 1), 1.0)?;
        }
        let global_radius_coef = f64_default(&map, "global_radius_coef", 1.0)?;
        let global_nasal_radius_coef = f64_default(&map, "global_nasal_radius_coef", 1.0)?;
        let aperture_radius = f64_value(&map, "aperture_radius")?;

        let temperature = f64_value(&map, "temperature")?;
        let loss_factor = f64_ranged(&map, "loss_factor", 0.0, 100.0)?;

        let mouth_coefficient = f64_default(&map, "mouth_coefficient", 5000.0)?;
        let nose_coefficient = f64_default(&map, "nose_coefficient", 5000.0)?;
        let bypass = bool_default(&map, "bypass", false)?;

        let throat_cutoff = f64_value(&map, "throat_cutoff")?;
        let throat_volume = f64_ranged(&map, "throat_volume", 0.0, 48.0)?;

        let noise_modulation = bool_default(&map, "noise_modulation", true)?;
        let mix_offset = f64_ranged(&map, "mix_offset", 30.0, 60.0)?;

        let glottal_noise_cutoff = f64_default(&map, "glottal_noise_cutoff", 1000.0)?;
        let frication_noise_cutoff = f64_default(&map, "frication_noise_cutoff", 1000.0)?;
        let frication_factor = f64_default(&map, "frication_factor", 1.0)?;
        let min_glottal_loss = f64_ranged(&map, "min_glottal_loss", 0.0, 100.0).or_else(|e| match e {
            ConfigError::Missing(_) => Ok(5.0),
            other => Err(other),
        })?;
        let max_glottal_loss = f64_ranged(&map, "max_glottal_loss", 0.0, 100.0).or_else(|e| match e {
            ConfigError::Missing(_) => Ok(20.0),
            other => Err(other),
        })?;
        let glottal_lowpass_cutoff = f64_default(&map, "glottal_lowpass_cutoff", 2000.0)?;
        let constant_radius_mouth_impedance = bool_default(&map, "constant_radius_mouth_impedance", false)?;
        let mouth_impedance_radius = f64_default(&map, "mouth_impedance_radius", 1.0)?;

        Ok(Self {
            variant,
            section_delay,
            output_rate,
            waveform,
            glottal_pulse_tp,
            glottal_pulse_tn_min,
            glottal_pulse_tn_max,
            breathiness,
            vocal_tract_length,
            vocal_tract_length_offset,
            nasal_radius,
            nasal_radius_v5,
            radius_coef,
            global_radius_coef,
            global_nasal_radius_coef,
            aperture_radius,
            temperature,
            loss_factor,
            mouth_coefficient,
            nose_coefficient,
            bypass,
            throat_cutoff,
            throat_volume,
            noise_modulation,
            mix_offset,
            glottal_noise_cutoff,
            frication_noise_cutoff,
            frication_factor,
            min_glottal_loss,
            max_glottal_loss,
            glottal_lowpass_cutoff,
            constant_radius_mouth_impedance,
            mouth_impedance_radius,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_entries() -> Vec<(String, String)> {
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
        ];
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_a_well_formed_map() {
        let config = Configuration::from_map(base_entries()).unwrap();
        assert_eq!(config.variant, 0);
        assert_eq!(config.section_delay, 1);
        assert_eq!(config.output_rate, 44100.0);
        assert_eq!(config.nasal_radius[1], 1.35);
    }

    #[test]
    fn missing_required_key_fails() {
        let entries: Vec<_> = base_entries().into_iter().filter(|(k, _)| k != "vocal_tract_length").collect();
        let err = Configuration::from_map(entries).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(k) if k == "vocal_tract_length"));
    }

    #[test]
    fn unparseable_value_fails() {
        let mut entries = base_entries();
        entries.push(("temperature".to_string(), "warm".to_string()));
        let err = Configuration::from_map(entries).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { key, .. } if key == "temperature"));
    }

    #[test]
    fn out_of_range_value_fails() {
        let mut entries = base_entries();
        entries.push(("loss_factor".to_string(), "150".to_string()));
        let err = Configuration::from_map(entries).unwrap_err();
        assert!(matches!(err, ConfigError::Range { key, .. } if key == "loss_factor"));
    }

    #[test]
    fn invalid_variant_is_rejected() {
        let mut entries = base_entries();
        entries.retain(|(k, _)| k != "variant");
        entries.push(("variant".to_string(), "1".to_string()));
        let err = Configuration::from_map(entries).unwrap_err();
        assert!(matches!(err, ConfigError::Range { key, .. } if key == "variant"));
    }

    fn v5_entries() -> Vec<(String, String)> {
        let mut entries: Vec<_> = base_entries()
            .into_iter()
            .filter(|(k, _)| !k.starts_with("nasal_radius_"))
            .collect();
        entries.retain(|(k, _)| k != "variant");
        entries.push(("variant".to_string(), "5".to_string()));
        for (i, v) in ["1.35", "1.96", "1.91", "1.3", "0.73", "0.3"].iter().enumerate() {
            entries.push((format!("nasal_radius_{}", i + 2), v.to_string()));
        }
        entries
    }

    #[test]
    fn variant_5_loads_the_nr2_through_nr7_key_range() {
        let config = Configuration::from_map(v5_entries()).unwrap();
        assert_eq!(config.variant, 5);
        assert_eq!(config.nasal_radius_v5, [1.35, 1.96, 1.91, 1.3, 0.73, 0.3]);
        assert_eq!(config.nasal_radius, [0.0; 6], "variant 5 doesn't populate the variant 0/2/4 field");
    }

    #[test]
    fn variant_5_missing_nasal_radius_7_fails() {
        let entries: Vec<_> = v5_entries().into_iter().filter(|(k, _)| k != "nasal_radius_7").collect();
        let err = Configuration::from_map(entries).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(k) if k == "nasal_radius_7"));
    }
}
