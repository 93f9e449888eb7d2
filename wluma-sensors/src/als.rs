// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! IIO ambient-light sensor discovery and reads.

use std::fs;
use std::os::fd::OwnedFd;
use std::path::Path;

use rustix::fs::{Mode, OFlags};
use tracing::debug;

use crate::SensorError;
use crate::device::read_f64;

/// An open ambient-light sensor.
///
/// Raw readings are converted to lux as `(raw + offset) · scale`, with the
/// scale and offset taken from the sensor's optional calibration attributes.
#[derive(Debug)]
pub struct AmbientLightSensor {
    raw: OwnedFd,
    scale: f64,
    offset: f64,
}

impl AmbientLightSensor {
    /// Scans the immediate subdirectories of `base` for the first IIO
    /// device whose `name` attribute is exactly `als`, and opens its
    /// `in_illuminance_raw` node for the process lifetime.
    pub fn discover(base: &Path) -> Result<Self, SensorError> {
        let entries = base.read_dir().map_err(|source| SensorError::Scan {
            path: base.to_path_buf(),
            source,
        })?;

        for entry in entries.flatten() {
            let device = entry.path();
            let is_als = fs::read_to_string(device.join("name"))
                .is_ok_and(|name| name.trim() == "als");
            if !is_als {
                continue;
            }

            let Ok(raw) = rustix::fs::open(
                device.join("in_illuminance_raw"),
                OFlags::RDONLY | OFlags::CLOEXEC,
                Mode::empty(),
            ) else {
                continue;
            };

            let scale = read_attribute(&device, "in_illuminance_scale").unwrap_or(1.0);
            let offset = read_attribute(&device, "in_illuminance_offset").unwrap_or(0.0);

            debug!(
                device = %device.display(),
                scale,
                offset,
                "using ambient light sensor"
            );
            return Ok(Self { raw, scale, offset });
        }

        Err(SensorError::NoLightSensor(base.to_path_buf()))
    }

    /// Reads one illuminance sample, in lux.
    pub fn read_lux(&self) -> Result<i64, SensorError> {
        let raw = read_f64(&self.raw)?;
        Ok(((raw + self.offset) * self.scale).round().max(0.0) as i64)
    }
}

fn read_attribute(device: &Path, attribute: &str) -> Option<f64> {
    fs::read_to_string(device.join(attribute))
        .ok()?
        .trim()
        .parse()
        .ok()
}
