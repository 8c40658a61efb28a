//! Memory type selection and image packing

use ash::vk;

use crate::render::api::{DeviceError, DeviceResult, MemoryLocation};

/// Property flags a location needs
pub(super) fn location_flags(location: MemoryLocation) -> vk::MemoryPropertyFlags {
    match location {
        MemoryLocation::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        MemoryLocation::HostVisible => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
    }
}

/// First memory type allowed by `type_filter` that has every flag in `properties`
pub(super) fn find_memory_type(
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
) -> DeviceResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(DeviceError::NoSuitableMemoryType)
}

/// Layout of several resources sharing one allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct PackedLayout {
    pub offsets: Vec<u64>,
    pub size: u64,
    pub type_filter: u32,
}

/// Place each requirement after the previous one at its own alignment
pub(super) fn pack(requirements: &[vk::MemoryRequirements]) -> PackedLayout {
    let mut offsets = Vec::with_capacity(requirements.len());
    let mut size: u64 = 0;
    let mut type_filter = u32::MAX;

    for requirement in requirements {
        let alignment = requirement.alignment.max(1);
        let offset = size.div_ceil(alignment) * alignment;
        offsets.push(offset);
        size = offset + requirement.size;
        type_filter &= requirement.memory_type_bits;
    }

    PackedLayout {
        offsets,
        size,
        type_filter,
    }
}
