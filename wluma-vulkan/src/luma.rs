// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Mipmap reduction and perceived-lightness conversion.
//!
//! The staging image is half the captured frame in each dimension (the
//! first blit downsamples by two to amortize cost) and carries a mip chain
//! down to a single pixel. Each cycle re-records the same command buffer:
//! transition, blit frame → mip 0, halve mip by mip, copy the top mip's
//! pixel into the readback buffer.

use ash::vk;
use tracing::{debug, warn};

use crate::GpuError;
use crate::context::{Gpu, find_memory_type_index};
use crate::frame::FrameDescriptor;

/// The persistent reduction target, created on the first observed frame
/// and kept for the process lifetime.
pub(crate) struct StagingTarget {
    pub(crate) image: vk::Image,
    pub(crate) memory: vk::DeviceMemory,
    /// Mip 0 extent (half the frame, clamped to 1).
    extent: (u32, u32),
    mip_levels: u32,
    /// Extent of the frames this target was built for.
    frame_extent: (u32, u32),
}

/// Mip 0 extent of the staging image for a frame of `width` × `height`.
pub(crate) fn staging_extent(width: u32, height: u32) -> (u32, u32) {
    ((width / 2).max(1), (height / 2).max(1))
}

/// Length of the staging mip chain for a frame of `width` × `height`.
///
/// `⌊log₂(max(w, h))⌋` levels starting from the half-resolution mip 0
/// reduce the larger dimension to one pixel; degenerate 1×1 frames still
/// get their single level.
pub(crate) fn mip_chain_len(width: u32, height: u32) -> u32 {
    let longest = f64::from(width.max(height));
    (longest.log2().floor() as u32).max(1)
}

/// Converts an average sRGB pixel into a perceived-lightness percentage.
///
/// The weights are the HSP colour-model coefficients rather than BT.601
/// luma: the signal drives human brightness preference, not video
/// encoding.
pub(crate) fn perceived_lightness_percent(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let lightness = (0.241 * r * r + 0.691 * g * g + 0.068 * b * b).sqrt();
    (lightness / 255.0 * 100.0).round() as u8
}

impl Gpu {
    /// Reduces one captured frame to its perceived-lightness percentage.
    ///
    /// Transient failures (submission, fence deadline, mapping) leave the
    /// context reusable and the caller skips the cycle. Permanent failures
    /// ([`GpuError::is_permanent`]) mean no later frame can succeed either.
    pub fn luma_percent(&mut self, frame: &FrameDescriptor) -> Result<u8, GpuError> {
        if self.fence_in_flight {
            // A previous cycle missed the readback deadline; its submission
            // must retire before the command buffer can be reused.
            self.await_fence()?;
            warn!("late GPU readback retired; resuming");
        }

        let staging = self.ensure_staging(frame)?;
        let imported = self.import_frame(frame)?;
        let result = self.record_and_read(imported.image, frame, staging);
        self.destroy_frame(imported);

        result
    }

    fn record_and_read(
        &mut self,
        frame_image: vk::Image,
        frame: &FrameDescriptor,
        (staging_image, base_extent, mip_levels): (vk::Image, (u32, u32), u32),
    ) -> Result<u8, GpuError> {
        let recorder = Recorder {
            device: &self.device,
            command_buffer: self.command_buffer,
        };

        recorder.begin()?;

        recorder.transition(
            frame_image,
            0,
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        recorder.transition(
            staging_image,
            0,
            mip_levels,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );

        // Downsample by two straight into mip 0.
        recorder.blit(
            frame_image,
            (frame.width, frame.height),
            0,
            staging_image,
            base_extent,
            0,
        );

        let (mut mip_width, mut mip_height) = base_extent;
        for level in 1..mip_levels {
            recorder.transition(
                staging_image,
                level - 1,
                1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            );

            let next = ((mip_width / 2).max(1), (mip_height / 2).max(1));
            recorder.blit(
                staging_image,
                (mip_width, mip_height),
                level - 1,
                staging_image,
                next,
                level,
            );
            (mip_width, mip_height) = next;
        }

        recorder.transition(
            staging_image,
            mip_levels - 1,
            1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        recorder.copy_top_pixel(staging_image, mip_levels - 1, self.readback_buffer);

        self.submit_and_wait()?;

        let [r, g, b, _] = self.read_reduced_pixel()?;
        Ok(perceived_lightness_percent(r, g, b))
    }

    /// Builds the staging image on the first frame; later frames must keep
    /// the same extent. Returns the image with its mip-0 extent and chain
    /// length.
    fn ensure_staging(
        &mut self,
        frame: &FrameDescriptor,
    ) -> Result<(vk::Image, (u32, u32), u32), GpuError> {
        if let Some(staging) = &self.staging {
            if staging.frame_extent == (frame.width, frame.height) {
                return Ok((staging.image, staging.extent, staging.mip_levels));
            }
            return Err(GpuError::FrameResized {
                previous: staging.frame_extent,
                current: (frame.width, frame.height),
            });
        }

        let extent = staging_extent(frame.width, frame.height);
        let mip_levels = mip_chain_len(frame.width, frame.height);

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::B8G8R8A8_UNORM)
            .extent(vk::Extent3D {
                width: extent.0,
                height: extent.1,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(
                vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::SAMPLED,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);
        let image = unsafe { self.device.create_image(&image_info, None)? };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let memory_properties = unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        };
        // Prefer device-local; any supported type will do for a target the
        // CPU never touches.
        let memory_type_index = find_memory_type_index(
            &requirements,
            &memory_properties,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap_or_else(|| requirements.memory_type_bits.trailing_zeros());

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = match unsafe { self.device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(err) => {
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

        debug!(
            frame_width = frame.width,
            frame_height = frame.height,
            mip_levels,
            "created staging mip chain"
        );
        self.staging = Some(StagingTarget {
            image,
            memory,
            extent,
            mip_levels,
            frame_extent: (frame.width, frame.height),
        });
        Ok((image, extent, mip_levels))
    }
}

/// Thin wrapper recording the reduction into the reusable command buffer.
struct Recorder<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
}

impl Recorder<'_> {
    fn begin(&self) -> Result<(), GpuError> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)?;
        }
        Ok(())
    }

    /// Transitions `level_count` mips starting at `base_mip` between
    /// transfer layouts, with access masks derived from the layouts.
    fn transition(
        &self,
        image: vk::Image,
        base_mip: u32,
        level_count: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let (src_access, src_stage) = if old_layout == vk::ImageLayout::UNDEFINED {
            (vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE)
        } else {
            (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TRANSFER,
            )
        };
        let dst_access = if new_layout == vk::ImageLayout::TRANSFER_SRC_OPTIMAL {
            vk::AccessFlags::TRANSFER_READ
        } else {
            vk::AccessFlags::TRANSFER_WRITE
        };

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(base_mip)
                    .level_count(level_count)
                    .layer_count(1),
            );

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Linearly blits one mip into another at the given extents.
    fn blit(
        &self,
        src_image: vk::Image,
        src_extent: (u32, u32),
        src_mip: u32,
        dst_image: vk::Image,
        dst_extent: (u32, u32),
        dst_mip: u32,
    ) {
        let region = vk::ImageBlit::default()
            .src_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(src_mip)
                    .layer_count(1),
            )
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: src_extent.0 as i32,
                    y: src_extent.1 as i32,
                    z: 1,
                },
            ])
            .dst_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(dst_mip)
                    .layer_count(1),
            )
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: dst_extent.0 as i32,
                    y: dst_extent.1 as i32,
                    z: 1,
                },
            ]);

        unsafe {
            self.device.cmd_blit_image(
                self.command_buffer,
                src_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::LINEAR,
            );
        }
    }

    /// Copies the 1×1 top mip into the readback buffer.
    fn copy_top_pixel(&self, image: vk::Image, mip_level: u32, buffer: vk::Buffer) {
        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(mip_level)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            });

        unsafe {
            self.device.cmd_copy_image_to_buffer(
                self.command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                buffer,
                &[region],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{mip_chain_len, perceived_lightness_percent, staging_extent};

    #[test]
    fn mip_chain_reduces_to_one_pixel() {
        // Walk the chain the way the recorder does and check it bottoms
        // out at 1×1 for a spread of frame sizes.
        for (width, height) in [(1920, 1080), (3840, 2160), (1366, 768), (640, 480), (2, 2)] {
            let (mut w, mut h) = staging_extent(width, height);
            for _ in 1..mip_chain_len(width, height) {
                (w, h) = ((w / 2).max(1), (h / 2).max(1));
            }
            assert_eq!((w, h), (1, 1), "chain for {width}x{height} ends at {w}x{h}");
        }
    }

    #[test]
    fn one_by_one_frame_still_has_a_valid_chain() {
        assert_eq!(staging_extent(1, 1), (1, 1));
        assert_eq!(mip_chain_len(1, 1), 1);
    }

    #[test]
    fn chain_length_matches_log2_of_longest_side() {
        assert_eq!(mip_chain_len(1920, 1080), 10);
        assert_eq!(mip_chain_len(1080, 1920), 10);
        assert_eq!(mip_chain_len(4096, 4096), 12);
        assert_eq!(mip_chain_len(3, 1), 1);
    }

    #[test]
    fn lightness_spans_the_full_percent_range() {
        assert_eq!(perceived_lightness_percent(0, 0, 0), 0);
        assert_eq!(perceived_lightness_percent(255, 255, 255), 100);
    }

    #[test]
    fn lightness_weights_green_highest() {
        let green = perceived_lightness_percent(0, 128, 0);
        let red = perceived_lightness_percent(128, 0, 0);
        let blue = perceived_lightness_percent(0, 0, 128);
        assert!(green > red, "{green} vs {red}");
        assert!(red > blue, "{red} vs {blue}");
    }

    #[test]
    fn lightness_of_mid_grey_is_half() {
        // Weights sum to one, so a uniform grey maps straight through.
        assert_eq!(perceived_lightness_percent(128, 128, 128), 50);
    }
}
