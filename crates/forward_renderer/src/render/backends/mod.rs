//! Device implementations
//!
//! [`vulkan`] is the production backend. Tests run the core against a
//! recording device that validates usage and tracks object lifetimes.

pub mod vulkan;

#[cfg(test)]
#[allow(missing_docs)]
pub mod mock;

pub use vulkan::VulkanDevice;
