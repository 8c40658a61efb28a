//! Configuration system
//!
//! [`Config`] gives any serde type TOML/RON file loading. [`ForwardConfig`]
//! carries every tunable of the forward technique: shader locations, pool
//! sizing, queue capacity and the frame's clear values.

use std::path::{Path, PathBuf};

pub use serde::{Deserialize, Serialize};

use crate::render::api::Format;
use crate::render::lighting::LightType;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its valid range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// SPIR-V binaries used by the forward technique
///
/// One vertex shader is shared by every pipeline; each light type has its own
/// fragment shader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardShaderConfig {
    /// Directory the file names below are resolved against
    pub root: PathBuf,
    /// Vertex shader file
    pub vertex: String,
    /// Fragment shader for directional lights
    pub directional: String,
    /// Fragment shader for point lights
    pub point: String,
    /// Fragment shader for spot lights
    pub spot: String,
}

impl ForwardShaderConfig {
    /// Full path of the vertex shader
    pub fn vertex_path(&self) -> PathBuf {
        self.root.join(&self.vertex)
    }

    /// Full path of a fragment shader file name
    pub fn resolve(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    /// Full path of the fragment shader lighting with `light_type`
    pub fn fragment_path(&self, light_type: LightType) -> PathBuf {
        match light_type {
            LightType::Directional => self.resolve(&self.directional),
            LightType::Point => self.resolve(&self.point),
            LightType::Spot => self.resolve(&self.spot),
        }
    }
}

impl Default for ForwardShaderConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("shaders"),
            vertex: "shader.vert.spv".to_string(),
            directional: "shader-directional.frag.spv".to_string(),
            point: "shader-point.frag.spv".to_string(),
            spot: "shader-spot.frag.spv".to_string(),
        }
    }
}

/// Forward technique settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Shader binaries
    pub shaders: ForwardShaderConfig,

    /// Light uniform slots per frame in flight
    pub lights_per_frame: u32,

    /// Camera uniform slots beyond one per frame in flight
    ///
    /// A camera that changes every frame retires one slot per frame and only
    /// gets it back when that frame's slot comes around again, so the pool
    /// needs at least one slot more than there are frames.
    pub camera_slack_slots: u32,

    /// Capacity of each render queue sequence
    pub render_queue_capacity: usize,

    /// Upper bound for the frame fence wait, in nanoseconds; unset waits indefinitely
    pub fence_timeout_ns: Option<u64>,

    /// Color attachment clear value
    pub clear_color: [f32; 4],

    /// Depth attachment clear value
    pub clear_depth: f32,

    /// Depth formats in order of preference
    pub depth_formats: Vec<Format>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            shaders: ForwardShaderConfig::default(),
            lights_per_frame: 50,
            camera_slack_slots: 1,
            render_queue_capacity: 4000,
            fence_timeout_ns: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            depth_formats: vec![
                Format::D32Sfloat,
                Format::D32SfloatS8Uint,
                Format::D24UnormS8Uint,
            ],
        }
    }
}

impl Config for ForwardConfig {}

impl ForwardConfig {
    /// Reject settings the technique cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lights_per_frame == 0 {
            return Err(ConfigError::Invalid("lights_per_frame must be non-zero".into()));
        }
        if self.render_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "render_queue_capacity must be non-zero".into(),
            ));
        }
        if self.depth_formats.is_empty() {
            return Err(ConfigError::Invalid("depth_formats is empty".into()));
        }
        if let Some(format) = self.depth_formats.iter().find(|f| !f.is_depth()) {
            return Err(ConfigError::Invalid(format!(
                "{format:?} is not a depth format"
            )));
        }
        if !(0.0..=1.0).contains(&self.clear_depth) {
            return Err(ConfigError::Invalid(format!(
                "clear_depth {} outside [0, 1]",
                self.clear_depth
            )));
        }
        Ok(())
    }

    /// Fence wait timeout handed to the device
    pub fn fence_timeout(&self) -> u64 {
        self.fence_timeout_ns.unwrap_or(u64::MAX)
    }

    /// Camera pool capacity for `frames` frames in flight
    pub fn camera_pool_capacity(&self, frames: usize) -> u32 {
        frames as u32 + self.camera_slack_slots
    }

    /// Light pool capacity for `frames` frames in flight
    pub fn light_pool_capacity(&self, frames: usize) -> u32 {
        frames as u32 * self.lights_per_frame
    }

    /// Load and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::load_from_file(&path.to_string_lossy())?;
        config.validate()?;
        Ok(config)
    }
}
