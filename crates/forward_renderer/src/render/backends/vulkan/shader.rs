//! SPIR-V loading

use std::ffi::CStr;
use std::fs;
use std::path::Path;

use ash::{vk, Device};

use super::conversions::api_error;
use crate::render::api::{DeviceError, DeviceResult};

/// Entry point every forward shader exports
pub(super) const ENTRY_POINT: &CStr = c"main";

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V words from a little-endian byte stream
///
/// Returns `None` when the length is not a whole number of words or the magic
/// number is missing.
pub(super) fn decode_spirv(bytes: &[u8]) -> Option<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect();
    (words[0] == SPIRV_MAGIC).then_some(words)
}

/// Shader module destroyed on drop
///
/// Modules only need to live until the pipeline that uses them is created.
pub(super) struct ShaderModule<'a> {
    device: &'a Device,
    module: vk::ShaderModule,
}

impl<'a> ShaderModule<'a> {
    /// Load a SPIR-V binary from disk
    pub fn from_file(device: &'a Device, path: &Path) -> DeviceResult<Self> {
        let bytes = fs::read(path).map_err(|source| DeviceError::Shader {
            path: path.to_path_buf(),
            source,
        })?;
        let code =
            decode_spirv(&bytes).ok_or_else(|| DeviceError::InvalidShader(path.to_path_buf()))?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(api_error("vkCreateShaderModule"))?
        };

        Ok(Self { device, module })
    }

    /// Stage description for pipeline creation
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_spirv() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000_u32.to_le_bytes());
        assert_eq!(decode_spirv(&bytes), Some(vec![SPIRV_MAGIC, 0x0001_0000]));
    }

    #[test]
    fn test_decode_spirv_rejects_garbage() {
        assert_eq!(decode_spirv(&[]), None);
        assert_eq!(decode_spirv(&[3, 2, 35, 7, 0]), None);
        assert_eq!(decode_spirv(b"#version 450"), None);
    }
}
