// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Captured-frame descriptors and their import as Vulkan images.
//!
//! The capture backend assembles a [`FrameDescriptor`] from the
//! compositor's frame metadata and per-plane descriptors. The descriptor
//! owns the DMA-BUF fds; importing duplicates plane 0's descriptor and
//! hands the duplicate to Vulkan, which closes it when the imported memory
//! is freed. The originals are closed exactly once when the descriptor is
//! dropped at the end of the cycle.

use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd};

use ash::vk;

use crate::GpuError;
use crate::context::Gpu;

/// One plane of an exported frame.
#[derive(Debug)]
pub struct FramePlane {
    /// The DMA-BUF descriptor for this plane.
    pub fd: OwnedFd,
    /// Size of the plane's backing buffer in bytes.
    pub size: u32,
}

/// A frame exported by the compositor, as delivered over the capture
/// protocol.
#[derive(Debug)]
pub struct FrameDescriptor {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Number of planes the compositor announced.
    pub plane_count: u32,
    /// DRM format modifier; only the default (linear, 0) is importable.
    pub modifier: u64,
    planes: Vec<FramePlane>,
}

impl FrameDescriptor {
    /// Creates a descriptor from the frame-start metadata; planes are
    /// attached as their events arrive.
    #[must_use]
    pub fn new(width: u32, height: u32, plane_count: u32, modifier: u64) -> Self {
        Self {
            width,
            height,
            plane_count,
            modifier,
            planes: Vec::with_capacity(plane_count.min(4) as usize),
        }
    }

    /// Attaches one announced plane, taking ownership of its descriptor.
    pub fn push_plane(&mut self, fd: OwnedFd, size: u32) {
        self.planes.push(FramePlane { fd, size });
    }

    /// The planes received so far.
    #[must_use]
    pub fn planes(&self) -> &[FramePlane] {
        &self.planes
    }

    /// Checks the frame is importable and returns its only plane.
    pub(crate) fn importable_plane(&self) -> Result<&FramePlane, GpuError> {
        if self.plane_count != 1 || self.planes.len() != 1 {
            return Err(GpuError::MultiPlanarFrame(
                self.plane_count.max(self.planes.len() as u32),
            ));
        }
        if self.modifier != 0 {
            return Err(GpuError::UnsupportedModifier(self.modifier));
        }
        Ok(&self.planes[0])
    }
}

/// A frame imported for one cycle: an image aliased over the DMA-BUF plus
/// the imported memory object that owns the duplicated descriptor.
pub(crate) struct ImportedFrame {
    pub(crate) image: vk::Image,
    memory: vk::DeviceMemory,
}

impl Gpu {
    /// Imports plane 0 of the frame as an external-memory image.
    pub(crate) fn import_frame(
        &self,
        frame: &FrameDescriptor,
    ) -> Result<ImportedFrame, GpuError> {
        let plane = frame.importable_plane()?;

        let mut external_info = vk::ExternalMemoryImageCreateInfo::default()
            .handle_types(vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT);
        let image_info = vk::ImageCreateInfo::default()
            .push_next(&mut external_info)
            .flags(vk::ImageCreateFlags::ALIAS)
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width: frame.width,
                height: frame.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);
        let image = unsafe { self.device.create_image(&image_info, None)? };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let memory_type_index = requirements.memory_type_bits.trailing_zeros();

        // Vulkan takes ownership of the descriptor only if the allocation
        // succeeds; until then the duplicate is ours to close.
        let duplicate = match plane.fd.try_clone() {
            Ok(duplicate) => duplicate,
            Err(err) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(GpuError::DupFd(err));
            }
        };
        let raw_fd = duplicate.into_raw_fd();

        let mut import_info = vk::ImportMemoryFdInfoKHR::default()
            .handle_type(vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT)
            .fd(raw_fd);
        let alloc_info = vk::MemoryAllocateInfo::default()
            .push_next(&mut import_info)
            .allocation_size(requirements.size.max(u64::from(plane.size)))
            .memory_type_index(memory_type_index);

        let memory = match unsafe { self.device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(err) => {
                drop(unsafe { OwnedFd::from_raw_fd(raw_fd) });
                unsafe { self.device.destroy_image(image, None) };
                return Err(GpuError::Vulkan(err));
            }
        };

        if let Err(err) = unsafe { self.device.bind_image_memory(image, memory, 0) } {
            unsafe {
                self.device.free_memory(memory, None);
                self.device.destroy_image(image, None);
            }
            return Err(GpuError::Vulkan(err));
        }

        Ok(ImportedFrame { image, memory })
    }

    /// Destroys the per-cycle image and frees the imported memory, closing
    /// the duplicated descriptor with it.
    pub(crate) fn destroy_frame(&self, frame: ImportedFrame) {
        unsafe {
            self.device.destroy_image(frame.image, None);
            self.device.free_memory(frame.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::fd::OwnedFd;

    use super::FrameDescriptor;
    use crate::GpuError;

    fn dummy_fd() -> OwnedFd {
        std::fs::File::open("/dev/null").unwrap().into()
    }

    #[test]
    fn single_linear_plane_is_importable() {
        let mut frame = FrameDescriptor::new(1920, 1080, 1, 0);
        frame.push_plane(dummy_fd(), 1920 * 1080 * 4);

        let plane = frame.importable_plane().unwrap();
        assert_eq!(plane.size, 1920 * 1080 * 4);
    }

    #[test]
    fn multi_planar_frames_are_a_permanent_failure() {
        let mut frame = FrameDescriptor::new(1920, 1080, 2, 0);
        frame.push_plane(dummy_fd(), 100);
        frame.push_plane(dummy_fd(), 100);

        let err = frame.importable_plane().unwrap_err();
        assert!(matches!(err, GpuError::MultiPlanarFrame(2)));
        assert!(err.is_permanent());
    }

    #[test]
    fn missing_plane_event_counts_as_multi_planar_mismatch() {
        let frame = FrameDescriptor::new(1920, 1080, 1, 0);
        assert!(matches!(
            frame.importable_plane(),
            Err(GpuError::MultiPlanarFrame(1))
        ));
    }

    #[test]
    fn nonzero_modifier_is_a_permanent_failure() {
        let mut frame = FrameDescriptor::new(1920, 1080, 1, 0x0100_0000_0000_0001);
        frame.push_plane(dummy_fd(), 100);

        let err = frame.importable_plane().unwrap_err();
        assert!(matches!(err, GpuError::UnsupportedModifier(_)));
        assert!(err.is_permanent());
    }
}
