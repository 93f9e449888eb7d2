// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wayland capture backend for the wluma daemon.
//!
//! This crate owns the outermost loop. It binds the
//! `zwlr_export_dmabuf_manager_v1` global, picks one output at startup,
//! and then cycles:
//!
//! ```text
//! request capture ─► Frame / Object events ─► Ready
//!                                              │
//!        luma ◄─ GPU reduction ◄───────────────┘
//!        lux  ◄─ ambient light sensor
//!        backlight ◄─ backlight device
//!                │
//!                ▼
//!        Controller::cycle() ─► transition writes (quit-aware)
//!                │
//!                ▼
//!        free frame, sleep 100 ms, re-arm
//! ```
//!
//! At most one capture request is outstanding; a new one is armed only
//! after the previous frame's `Ready` or a retryable `Cancel`. A permanent
//! `Cancel`, a frame topology the importer rejects, or a resolution change
//! ends the loop with an error. The quit flag is polled after every
//! dispatch iteration, before any backlight write inside a cycle, and
//! between individual transition steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use wayland_client::protocol::wl_output::{self, WlOutput};
use wayland_client::protocol::wl_registry::{self, WlRegistry};
use wayland_client::{
    ConnectError, Connection, Dispatch, DispatchError, Proxy, QueueHandle, WEnum,
};
use wayland_protocols_wlr::export_dmabuf::v1::client::zwlr_export_dmabuf_frame_v1::{
    CancelReason, Event as FrameEvent, ZwlrExportDmabufFrameV1,
};
use wayland_protocols_wlr::export_dmabuf::v1::client::zwlr_export_dmabuf_manager_v1::{
    self, ZwlrExportDmabufManagerV1,
};

use wluma_core::{Controller, Decision, LuxWindow, TransitionPlan};
use wluma_sensors::{AmbientLightSensor, Backlight};
use wluma_vulkan::{FrameDescriptor, Gpu, GpuError};

/// Pause between a finished cycle and the next capture request.
const FRAME_REQUEST_DELAY: Duration = Duration::from_millis(100);

/// Errors that end the capture loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No Wayland display to connect to.
    #[error("unable to connect to the Wayland display: {0}")]
    Connect(#[from] ConnectError),
    /// Event dispatching failed at the protocol level.
    #[error("wayland dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    /// The compositor advertised no outputs.
    #[error("compositor advertised no outputs")]
    NoOutputs,
    /// An output name was configured but nothing matched it.
    #[error("no output matches {0:?}")]
    NoMatchingOutput(String),
    /// The compositor does not speak the export-dmabuf protocol.
    #[error("compositor does not support zwlr_export_dmabuf_manager_v1")]
    ProtocolUnsupported,
    /// The compositor cancelled capturing for good.
    #[error("compositor permanently cancelled capture")]
    CancelledPermanently,
    /// The GPU rejected the frames in a way no retry can fix.
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

struct OutputInfo {
    proxy: WlOutput,
    name: Option<String>,
    description: Option<String>,
}

/// The capture loop and everything one cycle touches.
pub struct Capturer {
    gpu: Gpu,
    controller: Controller,
    lux_window: LuxWindow,
    als: AmbientLightSensor,
    backlight: Backlight,
    desired_output: Option<String>,
    quit: &'static AtomicBool,

    outputs: Vec<OutputInfo>,
    dmabuf_manager: Option<ZwlrExportDmabufManagerV1>,
    pending_frame: Option<FrameDescriptor>,
    cycle_done: bool,
    fatal: Option<CaptureError>,
}

impl Capturer {
    /// Wires up a capturer; nothing talks to the compositor until
    /// [`run`](Self::run).
    #[must_use]
    pub fn new(
        gpu: Gpu,
        controller: Controller,
        als: AmbientLightSensor,
        backlight: Backlight,
        desired_output: Option<String>,
        quit: &'static AtomicBool,
    ) -> Self {
        Self {
            gpu,
            controller,
            lux_window: LuxWindow::new(),
            als,
            backlight,
            desired_output,
            quit,
            outputs: Vec::new(),
            dmabuf_manager: None,
            pending_frame: None,
            cycle_done: false,
            fatal: None,
        }
    }

    /// Runs the capture loop until the quit flag is raised (clean
    /// shutdown) or a permanent failure occurs.
    pub fn run(mut self) -> Result<(), CaptureError> {
        let connection = Connection::connect_to_env()?;
        let display = connection.display();
        let mut event_queue = connection.new_event_queue();
        let queue_handle = event_queue.handle();

        display.get_registry(&queue_handle, ());

        // First roundtrip binds the globals, second collects the bound
        // outputs' name and description events.
        event_queue.roundtrip(&mut self)?;
        event_queue.roundtrip(&mut self)?;

        let output = self.select_output()?;
        let manager = self
            .dmabuf_manager
            .clone()
            .ok_or(CaptureError::ProtocolUnsupported)?;

        info!("starting capture loop");
        loop {
            self.cycle_done = false;
            manager.capture_output(0, &output, &queue_handle, ());

            while !self.cycle_done {
                let dispatched = event_queue.blocking_dispatch(&mut self);
                if self.quit.load(Ordering::Relaxed) {
                    // A signal may surface as an interrupted dispatch;
                    // shutting down on request is not an error.
                    info!("quit requested, shutting down");
                    return Ok(());
                }
                dispatched?;
                if let Some(err) = self.fatal.take() {
                    return Err(err);
                }
            }

            thread::sleep(FRAME_REQUEST_DELAY);
            if self.quit.load(Ordering::Relaxed) {
                info!("quit requested, shutting down");
                return Ok(());
            }
        }
    }

    fn select_output(&self) -> Result<WlOutput, CaptureError> {
        if self.outputs.is_empty() {
            return Err(CaptureError::NoOutputs);
        }

        let selected = match &self.desired_output {
            Some(desired) => self
                .outputs
                .iter()
                .find(|info| {
                    matches_desired(info.name.as_deref(), info.description.as_deref(), desired)
                })
                .ok_or_else(|| CaptureError::NoMatchingOutput(desired.clone()))?,
            // Without configuration, the most recently advertised output
            // is captured.
            None => self.outputs.last().expect("outputs not empty"),
        };

        debug!(
            name = selected.name.as_deref().unwrap_or("?"),
            description = selected.description.as_deref().unwrap_or("?"),
            "selected capture output"
        );
        Ok(selected.proxy.clone())
    }

    /// Steps 3–5 of a cycle, entered from the frame's `Ready` event.
    fn process_frame(&mut self, frame: FrameDescriptor) {
        let luma = match self.gpu.luma_percent(&frame) {
            Ok(luma) => luma,
            Err(err) if err.is_permanent() => {
                self.fatal = Some(CaptureError::Gpu(err));
                return;
            }
            Err(err) => {
                warn!("skipping frame: {err}");
                return;
            }
        };

        let lux = match self.als.read_lux() {
            Ok(lux) => lux,
            Err(err) => {
                warn!("skipping cycle, ambient light read failed: {err}");
                return;
            }
        };
        let backlight = match self.backlight.percent() {
            Ok(backlight) => backlight,
            Err(err) => {
                warn!("skipping cycle, backlight read failed: {err}");
                return;
            }
        };

        self.lux_window.push(lux);
        if !self.lux_window.ready() {
            // Warm-up: observe, never write.
            self.controller.sync_observed(backlight);
            return;
        }

        match self
            .controller
            .cycle(self.lux_window.value(), luma, backlight)
        {
            Decision::Idle => {}
            Decision::Transition(plan) => self.apply_transition(plan),
        }

        // The descriptor, and with it the compositor's fds, goes away here;
        // the duplicated descriptor inside the GPU import is already gone.
        drop(frame);
    }

    fn apply_transition(&mut self, plan: TransitionPlan) {
        debug!(from = plan.from, to = plan.to, "driving backlight");
        let delay = plan.step_delay();
        for step in plan.steps() {
            if self.quit.load(Ordering::Relaxed) {
                return;
            }
            if let Err(err) = self.backlight.set_percent(step) {
                warn!("abandoning transition, backlight write failed: {err}");
                return;
            }
            thread::sleep(delay);
        }
    }
}

/// Whether an output's advertised name or description matches the
/// configured selector.
fn matches_desired(name: Option<&str>, description: Option<&str>, desired: &str) -> bool {
    name.is_some_and(|name| name.contains(desired))
        || description.is_some_and(|description| description.contains(desired))
}

impl Dispatch<WlRegistry, ()> for Capturer {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        queue_handle: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        {
            match interface.as_str() {
                // Version 4 brings the name/description events used for
                // output selection.
                "wl_output" => {
                    let proxy =
                        registry.bind::<WlOutput, _, _>(name, version.min(4), queue_handle, ());
                    state.outputs.push(OutputInfo {
                        proxy,
                        name: None,
                        description: None,
                    });
                }
                "zwlr_export_dmabuf_manager_v1" => {
                    state.dmabuf_manager = Some(registry.bind::<ZwlrExportDmabufManagerV1, _, _>(
                        name,
                        version.min(1),
                        queue_handle,
                        (),
                    ));
                }
                _ => {}
            }
        }
    }
}

impl Dispatch<WlOutput, ()> for Capturer {
    fn event(
        state: &mut Self,
        output: &WlOutput,
        event: wl_output::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let Some(info) = state
            .outputs
            .iter_mut()
            .find(|info| info.proxy.id() == output.id())
        else {
            return;
        };

        match event {
            wl_output::Event::Name { name } => info.name = Some(name),
            wl_output::Event::Description { description } => info.description = Some(description),
            _ => {}
        }
    }
}

impl Dispatch<ZwlrExportDmabufManagerV1, ()> for Capturer {
    fn event(
        _: &mut Self,
        _: &ZwlrExportDmabufManagerV1,
        _: zwlr_export_dmabuf_manager_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<ZwlrExportDmabufFrameV1, ()> for Capturer {
    fn event(
        state: &mut Self,
        frame: &ZwlrExportDmabufFrameV1,
        event: FrameEvent,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            FrameEvent::Frame {
                width,
                height,
                num_objects,
                mod_high,
                mod_low,
                ..
            } => {
                let modifier = (u64::from(mod_high) << 32) | u64::from(mod_low);
                state.pending_frame =
                    Some(FrameDescriptor::new(width, height, num_objects, modifier));
            }

            FrameEvent::Object { fd, size, .. } => {
                if let Some(pending) = state.pending_frame.as_mut() {
                    pending.push_plane(fd, size);
                }
            }

            FrameEvent::Ready { .. } => {
                if let Some(pending) = state.pending_frame.take() {
                    if !state.quit.load(Ordering::Relaxed) {
                        state.process_frame(pending);
                    }
                }
                frame.destroy();
                state.cycle_done = true;
            }

            FrameEvent::Cancel { reason } => {
                state.pending_frame = None;
                frame.destroy();
                state.cycle_done = true;

                if reason == WEnum::Value(CancelReason::Permanent) {
                    state.fatal = Some(CaptureError::CancelledPermanently);
                } else {
                    warn!("capture cancelled by compositor, retrying");
                }
            }

            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::matches_desired;

    #[test]
    fn matches_on_name_or_description_substring() {
        assert!(matches_desired(Some("eDP-1"), None, "eDP"));
        assert!(matches_desired(
            None,
            Some("Dell U2720Q (DisplayPort-1)"),
            "U2720Q"
        ));
        assert!(!matches_desired(Some("HDMI-A-1"), Some("TV"), "eDP"));
    }

    #[test]
    fn unnamed_outputs_never_match() {
        assert!(!matches_desired(None, None, "eDP"));
    }
}
