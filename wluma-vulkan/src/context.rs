// Copyright 2026 the Wluma Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vulkan device context and reusable per-cycle resources.

use ash::{Device, Entry, Instance, vk};
use tracing::{debug, error};

use crate::GpuError;
use crate::luma::StagingTarget;

/// Upper bound on one reduction, matching the capture cadence. A frame
/// that takes longer than this to average is dropped.
const FENCE_DEADLINE_NS: u64 = 100_000_000;

/// The long-lived GPU context.
///
/// Everything here is created once at startup and destroyed once at
/// shutdown: instance, device, one graphics-capable queue, a resettable
/// primary command buffer, the 4-byte host-visible readback buffer, and a
/// fence. The staging mip chain is the one lazily-created member, sized on
/// the first observed frame.
pub struct Gpu {
    // Field order is drop-safety-relevant only through `Drop` below; the
    // entry is kept to hold the loaded library alive.
    _entry: Entry,
    pub(crate) instance: Instance,
    pub(crate) device: Device,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) queue: vk::Queue,
    pub(crate) command_pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    pub(crate) readback_buffer: vk::Buffer,
    pub(crate) readback_memory: vk::DeviceMemory,
    pub(crate) fence: vk::Fence,
    pub(crate) fence_in_flight: bool,
    pub(crate) staging: Option<StagingTarget>,
}

impl Gpu {
    /// Initializes the context on the first available physical device.
    ///
    /// Any failure here is fatal for the daemon; there is no fallback
    /// processing path.
    pub fn new() -> Result<Self, GpuError> {
        let entry = Entry::linked();

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"wluma")
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"wluma")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::make_api_version(0, 1, 2, 0));

        let instance_extensions = [
            vk::KHR_EXTERNAL_MEMORY_CAPABILITIES_NAME.as_ptr(),
            vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_NAME.as_ptr(),
        ];
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&instance_extensions);
        let instance = unsafe { entry.create_instance(&instance_info, None)? };

        let physical_devices = unsafe { instance.enumerate_physical_devices()? };
        let physical_device = physical_devices
            .first()
            .copied()
            .ok_or(GpuError::NoPhysicalDevice)?;

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_family_index = queue_families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .ok_or(GpuError::NoGraphicsQueue)? as u32;

        let queue_priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)];
        let device_extensions = [
            vk::KHR_EXTERNAL_MEMORY_FD_NAME.as_ptr(),
            vk::EXT_EXTERNAL_MEMORY_DMA_BUF_NAME.as_ptr(),
        ];
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&device_extensions);
        let device = unsafe { instance.create_device(physical_device, &device_info, None)? };

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let buffer_alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&buffer_alloc_info)? }[0];

        // One pixel of B8G8R8A8: the entire CPU-visible result of a cycle.
        let readback_info = vk::BufferCreateInfo::default()
            .size(4)
            .usage(vk::BufferUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let readback_buffer = unsafe { device.create_buffer(&readback_info, None)? };

        let requirements = unsafe { device.get_buffer_memory_requirements(readback_buffer) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let memory_type_index = find_memory_type_index(
            &requirements,
            &memory_properties,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .ok_or(GpuError::NoMemoryType("readback buffer"))?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let readback_memory = unsafe { device.allocate_memory(&alloc_info, None)? };
        unsafe { device.bind_buffer_memory(readback_buffer, readback_memory, 0)? };

        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None)? };

        debug!("vulkan context initialized");

        Ok(Self {
            _entry: entry,
            instance,
            device,
            physical_device,
            queue,
            command_pool,
            command_buffer,
            readback_buffer,
            readback_memory,
            fence,
            fence_in_flight: false,
            staging: None,
        })
    }

    /// Ends the recorded command buffer, submits it, and waits for the
    /// fence within the readback deadline.
    pub(crate) fn submit_and_wait(&mut self) -> Result<(), GpuError> {
        unsafe { self.device.end_command_buffer(self.command_buffer)? };

        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info], self.fence)?;
        }
        self.fence_in_flight = true;

        self.await_fence()
    }

    /// Waits for the in-flight submission within the deadline and resets
    /// the fence on success.
    ///
    /// On a deadline miss the fence stays armed; the next cycle calls this
    /// again before reusing the command buffer, so a slow frame costs
    /// skipped cycles rather than invalid reuse.
    pub(crate) fn await_fence(&mut self) -> Result<(), GpuError> {
        match unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, FENCE_DEADLINE_NS)
        } {
            Ok(()) => {
                unsafe { self.device.reset_fences(&[self.fence])? };
                self.fence_in_flight = false;
                Ok(())
            }
            Err(vk::Result::TIMEOUT) => Err(GpuError::ReadbackDeadline),
            Err(other) => Err(GpuError::Vulkan(other)),
        }
    }

    /// Maps the readback buffer and copies out the single reduced pixel.
    pub(crate) fn read_reduced_pixel(&self) -> Result<[u8; 4], GpuError> {
        let mut pixel = [0u8; 4];
        unsafe {
            let pointer = self.device.map_memory(
                self.readback_memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )? as *const u8;
            std::ptr::copy_nonoverlapping(pointer, pixel.as_mut_ptr(), pixel.len());
            self.device.unmap_memory(self.readback_memory);
        }
        Ok(pixel)
    }
}

impl Drop for Gpu {
    fn drop(&mut self) {
        unsafe {
            // Outstanding reduction work must finish before its resources
            // disappear under it.
            if let Err(err) = self.device.device_wait_idle() {
                error!("device_wait_idle failed during teardown: {err}");
            }

            if let Some(staging) = self.staging.take() {
                self.device.destroy_image(staging.image, None);
                self.device.free_memory(staging.memory, None);
            }

            self.device.destroy_fence(self.fence, None);
            self.device.destroy_buffer(self.readback_buffer, None);
            self.device.free_memory(self.readback_memory, None);
            self.device
                .free_command_buffers(self.command_pool, &[self.command_buffer]);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Finds the first memory type allowed by `requirements` that has all of
/// `flags`.
pub(crate) fn find_memory_type_index(
    requirements: &vk::MemoryRequirements,
    properties: &vk::PhysicalDeviceMemoryProperties,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    properties.memory_types[..properties.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            requirements.memory_type_bits & (1 << index) != 0
                && memory_type.property_flags.contains(flags)
        })
        .map(|(index, _)| index as u32)
}

#[cfg(test)]
mod tests {
    use ash::vk;

    use super::find_memory_type_index;

    fn properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &property_flags) in flags.iter().enumerate() {
            properties.memory_types[i].property_flags = property_flags;
        }
        properties
    }

    #[test]
    fn picks_first_allowed_type_with_matching_flags() {
        let properties = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let requirements = vk::MemoryRequirements {
            memory_type_bits: 0b11,
            ..Default::default()
        };

        let index = find_memory_type_index(
            &requirements,
            &properties,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(index, Some(1));
    }

    #[test]
    fn respects_the_requirements_mask() {
        let properties = properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let requirements = vk::MemoryRequirements {
            memory_type_bits: 0b10,
            ..Default::default()
        };

        let index = find_memory_type_index(
            &requirements,
            &properties,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        );
        assert_eq!(index, Some(1));
    }

    #[test]
    fn reports_no_match() {
        let properties = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let requirements = vk::MemoryRequirements {
            memory_type_bits: 0b1,
            ..Default::default()
        };

        assert_eq!(
            find_memory_type_index(
                &requirements,
                &properties,
                vk::MemoryPropertyFlags::HOST_VISIBLE,
            ),
            None
        );
    }
}
