// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! sysfs device access for the wluma daemon.
//!
//! Two device classes are discovered at startup and then held open for the
//! process lifetime:
//!
//! - **[`als`]** — the IIO ambient-light sensor, read-only;
//! - **[`backlight`]** — the backlight node, read-write.
//!
//! Both speak the same tiny sysfs dialect, implemented in **[`device`]**:
//! positional reads of short decimal strings and truncate-then-write
//! updates.

pub mod als;
pub mod backlight;
pub mod device;

use std::path::PathBuf;

use thiserror::Error;

pub use als::AmbientLightSensor;
pub use backlight::Backlight;
pub use device::DeviceError;

/// Errors from device discovery and I/O.
#[derive(Debug, Error)]
pub enum SensorError {
    /// No usable ambient light sensor below the base directory.
    #[error("no ambient light sensor found under {0}")]
    NoLightSensor(PathBuf),
    /// No usable backlight below the base directory.
    #[error("no backlight device found under {0}")]
    NoBacklight(PathBuf),
    /// The base directory itself could not be scanned.
    #[error("unable to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Reading or writing an already-open device node failed.
    #[error(transparent)]
    Device(#[from] DeviceError),
}
