//! Backend abstraction for the frame pipeline
//!
//! The core records and submits GPU work exclusively through
//! [`GraphicsDevice`], which keeps it independent of the Vulkan bindings and
//! testable against a recording device.

pub mod commands;
pub mod device;
pub mod error;
pub mod handles;
pub mod types;

pub use commands::{ActiveRenderPass, CommandRecorder};
pub use device::GraphicsDevice;
pub use error::{DeviceError, DeviceResult};
pub use handles::*;
pub use types::*;
