/// "Core" refers to the Vulkan objects that live for the whole run of the renderer:
/// the instance and surface, the device and its queues, and the presentation target.

pub mod device;
pub mod instance;
pub mod target;
