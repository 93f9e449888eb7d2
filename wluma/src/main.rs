// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The wluma daemon: wiring, signal handling and process lifecycle.
//!
//! Initialization failures exit non-zero with an actionable message; so
//! does a permanent capture failure. A SIGINT raises the quit flag, the
//! in-flight cycle finishes without touching the backlight, and the
//! process exits zero.

mod config;

use std::ffi::c_int;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context as _;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wluma_backend_wayland::Capturer;
use wluma_core::{Controller, TrainingSet, TrainingStore};
use wluma_sensors::{AmbientLightSensor, Backlight};
use wluma_vulkan::Gpu;

use crate::config::Config;

/// Raised by the SIGINT handler, polled by the capture loop.
static QUIT: AtomicBool = AtomicBool::new(false);

extern "C" fn on_quit_signal(_signal: c_int) {
    // Only flag-setting is allowed here; the dispatcher notices at its
    // next suspension point.
    QUIT.store(true, Ordering::Relaxed);
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = Config::from_env();

    let quit_action = SigAction::new(
        SigHandler::Handler(on_quit_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGINT, &quit_action) }
        .context("unable to install SIGINT handler")?;

    let backlight = Backlight::discover(&config.backlight_base)
        .context("unable to find a controllable backlight")?;
    let als = AmbientLightSensor::discover(&config.light_sensor_base)
        .context("unable to find an ambient light sensor")?;

    let mut store = TrainingStore::open_default().context("unable to open the training store")?;
    let training = match store.load() {
        Ok(training) => training,
        Err(err) => {
            warn!("starting from scratch, training data is unreadable: {err}");
            TrainingSet::default()
        }
    };
    info!(points = training.len(), "loaded training data");
    let controller = Controller::new(training, Some(store));

    let gpu = Gpu::new().context("unable to initialize the GPU context")?;

    info!("keep adjusting the backlight and wluma will learn your preference over time");
    Capturer::new(
        gpu,
        controller,
        als,
        backlight,
        config.output_name,
        &QUIT,
    )
    .run()
    .context("capture loop failed")?;

    info!("shut down cleanly");
    Ok(())
}
