// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backlight device discovery, reads and writes.

use std::os::fd::OwnedFd;
use std::path::Path;

use rustix::fs::{Mode, OFlags};
use tracing::debug;

use crate::SensorError;
use crate::device::{read_f64, write_decimal};

/// An open backlight device.
///
/// The `brightness` node stays open read-write for the process lifetime.
/// Levels cross this API as percentages of the device's `max_brightness`;
/// raw values only exist on the far side of the node.
#[derive(Debug)]
pub struct Backlight {
    brightness: OwnedFd,
    max_brightness: u64,
}

impl Backlight {
    /// Scans the immediate subdirectories of `base` and opens the first one
    /// whose `max_brightness` and `brightness` are both usable.
    pub fn discover(base: &Path) -> Result<Self, SensorError> {
        let entries = base.read_dir().map_err(|source| SensorError::Scan {
            path: base.to_path_buf(),
            source,
        })?;

        for entry in entries.flatten() {
            let device = entry.path();

            let Ok(max) = rustix::fs::open(
                device.join("max_brightness"),
                OFlags::RDONLY | OFlags::CLOEXEC,
                Mode::empty(),
            ) else {
                continue;
            };
            let Ok(max_brightness) = read_f64(&max) else {
                continue;
            };
            if max_brightness < 1.0 {
                continue;
            }

            let Ok(brightness) = rustix::fs::open(
                device.join("brightness"),
                OFlags::RDWR | OFlags::CLOEXEC,
                Mode::empty(),
            ) else {
                continue;
            };

            debug!(
                device = %device.display(),
                max_brightness,
                "using backlight device"
            );
            return Ok(Self {
                brightness,
                max_brightness: max_brightness as u64,
            });
        }

        Err(SensorError::NoBacklight(base.to_path_buf()))
    }

    /// Current backlight level as a percentage of `max_brightness`.
    pub fn percent(&self) -> Result<u8, SensorError> {
        let raw = read_f64(&self.brightness)?;
        Ok((raw * 100.0 / self.max_brightness as f64).round() as u8)
    }

    /// Writes a percentage to the device as the corresponding raw value.
    pub fn set_percent(&self, percent: u8) -> Result<(), SensorError> {
        let raw = u64::from(percent.min(100)) * self.max_brightness / 100;
        write_decimal(&self.brightness, raw)?;
        Ok(())
    }

    /// The device's raw full-scale value.
    #[must_use]
    pub fn max_brightness(&self) -> u64 {
        self.max_brightness
    }
}
