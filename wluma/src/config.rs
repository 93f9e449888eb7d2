// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Environment-variable configuration.

use std::env;
use std::path::PathBuf;

const LIGHT_SENSOR_BASE_PATH_VAR: &str = "WLUMA_LIGHT_SENSOR_BASE_PATH";
const BACKLIGHT_BASE_PATH_VAR: &str = "WLUMA_BACKLIGHT_BASE_PATH";
const OUTPUT_NAME_VAR: &str = "WLUMA_OUTPUT_NAME";

/// Everything the daemon reads from the environment, resolved once at
/// startup. (The training-store location under `$XDG_DATA_HOME` is
/// resolved by the store itself.)
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory scanned for IIO ambient-light sensors.
    pub light_sensor_base: PathBuf,
    /// Directory scanned for backlight devices.
    pub backlight_base: PathBuf,
    /// Substring selecting the capture output; the last advertised output
    /// is used when unset.
    pub output_name: Option<String>,
}

impl Config {
    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            light_sensor_base: env::var_os(LIGHT_SENSOR_BASE_PATH_VAR)
                .filter(|value| !value.is_empty())
                .map_or_else(|| PathBuf::from("/sys/bus/iio/devices"), PathBuf::from),
            backlight_base: env::var_os(BACKLIGHT_BASE_PATH_VAR)
                .filter(|value| !value.is_empty())
                .map_or_else(|| PathBuf::from("/sys/class/backlight"), PathBuf::from),
            output_name: env::var(OUTPUT_NAME_VAR)
                .ok()
                .filter(|value| !value.is_empty()),
        }
    }
}
