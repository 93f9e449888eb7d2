// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU-side luma extraction for the wluma daemon.
//!
//! A captured frame arrives as a DMA-BUF descriptor, is imported as an
//! external-memory Vulkan image, reduced to a single pixel through a
//! mipmap chain, and read back as four bytes. Only those four bytes ever
//! cross the bus; the averaging of several megapixels happens entirely on
//! the GPU.
//!
//! ```text
//!   FrameDescriptor (fd) ──► imported image ──blit──► staging mip 0
//!                                                        │ blit ÷2 …
//!                                                        ▼
//!                                                staging mip N (1×1)
//!                                                        │ copy
//!                                                        ▼
//!                                             4-byte readback buffer
//! ```
//!
//! **[`context`]** — [`Gpu`]: instance/device/queue, the reusable command
//! buffer, the readback buffer and the fence.
//!
//! **[`frame`]** — the frame descriptor handed over by the capture backend
//! and its per-cycle import as an aliased external-memory image.
//!
//! **[`luma`]** — the persistent staging mip chain, command recording, and
//! the perceived-lightness conversion.

pub mod context;
pub mod frame;
pub mod luma;

pub use context::Gpu;
pub use frame::{FrameDescriptor, FramePlane};

use thiserror::Error;

/// Errors from GPU initialization and per-frame processing.
///
/// [`is_permanent`](Self::is_permanent) splits the per-cycle taxonomy: a
/// permanent error means capture can never succeed again (wrong frame
/// topology, changed resolution) and the loop should shut down; everything
/// else is transient and the cycle is simply skipped.
#[derive(Debug, Error)]
pub enum GpuError {
    /// A Vulkan call failed.
    #[error("vulkan call failed: {0}")]
    Vulkan(#[from] ash::vk::Result),
    /// Instance creation found no devices.
    #[error("no physical device supports Vulkan")]
    NoPhysicalDevice,
    /// No queue family on the device can run transfer/graphics work.
    #[error("no graphics-capable queue family")]
    NoGraphicsQueue,
    /// No memory type satisfies the stated requirement.
    #[error("no suitable memory type for the {0}")]
    NoMemoryType(&'static str),
    /// The fence deadline elapsed before the reduction finished.
    #[error("timed out waiting for GPU readback")]
    ReadbackDeadline,
    /// Duplicating the DMA-BUF descriptor for import failed.
    #[error("unable to duplicate DMA-BUF descriptor: {0}")]
    DupFd(#[from] std::io::Error),
    /// The compositor delivered a multi-planar frame.
    #[error("frame has {0} planes; only single-plane frames are supported")]
    MultiPlanarFrame(u32),
    /// The compositor delivered a frame with a non-default DRM modifier.
    #[error("frame uses DRM modifier {0:#x}; only default-layout frames are supported")]
    UnsupportedModifier(u64),
    /// The capture resolution changed mid-run.
    #[error("capture size changed from {previous:?} to {current:?}")]
    FrameResized {
        previous: (u32, u32),
        current: (u32, u32),
    },
}

impl GpuError {
    /// Whether retrying with another frame can ever succeed.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::MultiPlanarFrame(_) | Self::UnsupportedModifier(_) | Self::FrameResized { .. }
        )
    }
}
