//! Bindless, frame-pipelined Vulkan 1.3 device abstraction: one logical
//! device, one global descriptor heap, dynamic rendering instead of render
//! passes, and reverse-Z depth throughout.

pub mod vulkan;

pub use vulkan::Device;
