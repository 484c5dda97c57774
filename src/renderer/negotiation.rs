//! Capability negotiation for bringing up a presentation-capable device.
//!
//! Everything in here is a pure decision over capability listings that the
//! caller already queried from the driver. Nothing is created or logged.

use std::ffi::{CStr, CString};
use ash::vk;

/// Returns true if every required name is present in `available`
pub fn extensions_satisfied(
    required: &[&CStr],
    available: &[&CStr],
) -> bool {
    required
        .iter()
        .all(|req| available.contains(req))
}

/// Same contract as [`extensions_satisfied`]. A false result only disables
/// diagnostics, it never rules out a device.
pub fn layers_satisfied(
    requested: &[&CStr],
    available: &[&CStr],
) -> bool {
    extensions_satisfied(requested, available)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, sorted. A family serving both roles appears once.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = [self.graphics, self.present]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// Scans queue families in index order. The first graphics-capable family and
/// the first present-capable family win, and the scan stops once both are known.
pub fn select_queue_families(
    families: &[vk::QueueFlags],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, flags) in families.iter().enumerate() {
        let i = i as u32;

        if indices.graphics.is_none() && flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(i);
        }
        if indices.present.is_none() && supports_present(i) {
            indices.present = Some(i);
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Surface capabilities of a (device, surface) pair
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Read-only view of a candidate device and the target surface
pub trait DeviceProbe {
    fn queue_family_flags(&self) -> Vec<vk::QueueFlags>;

    fn supports_present(&self, queue_family_index: u32) -> bool;

    fn extension_names(&self) -> Vec<CString>;

    /// Only meaningful once the swapchain extension is known to be supported
    fn swapchain_support(&self) -> SwapchainSupport;
}

pub fn is_device_suitable<P: DeviceProbe + ?Sized>(
    probe: &P,
    required_extensions: &[&CStr],
) -> bool {
    let queue_families = select_queue_families(
        &probe.queue_family_flags(),
        |i| probe.supports_present(i),
    );
    if !queue_families.is_complete() {
        return false;
    }

    let supported = probe.extension_names();
    let supported = supported
        .iter()
        .map(CString::as_c_str)
        .collect::<Vec<_>>();
    if !extensions_satisfied(required_extensions, &supported) {
        return false;
    }

    probe.swapchain_support().is_adequate()
}

/// First suitable candidate, in the order the candidates were enumerated
pub fn pick_device<P, I>(
    candidates: I,
    required_extensions: &[&CStr],
) -> Option<P>
where
    P: DeviceProbe,
    I: IntoIterator<Item = P>,
{
    candidates
        .into_iter()
        .find(|candidate| is_device_suitable(candidate, required_extensions))
}

/// Prefers 8-bit BGRA sRGB, otherwise the first listed format.
/// `None` only when the list is empty.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Mailbox when offered, otherwise FIFO, which every implementation supports
pub fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer: vk::Extent2D,
) -> vk::Extent2D {
    // u32::MAX means the surface size is decided by the swapchain
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: framebuffer.width.clamp(min.width, max.width),
        height: framebuffer.height.clamp(min.height, max.height),
    }
}

pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = capabilities.max_image_count;
    // One more than the minimum so acquiring does not wait on the driver.
    // A max of 0 means there is no upper bound.
    if max > 0 && min + 1 > max {
        max
    } else {
        min + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    struct FakeDevice {
        families: Vec<vk::QueueFlags>,
        present_families: Vec<u32>,
        extensions: Vec<CString>,
        support: SwapchainSupport,
        swapchain_queries: Cell<usize>,
    }

    impl FakeDevice {
        fn capable() -> Self {
            Self {
                families: vec![vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE],
                present_families: vec![0],
                extensions: vec![ash::khr::swapchain::NAME.to_owned()],
                support: SwapchainSupport {
                    formats: vec![surface_format(
                        vk::Format::B8G8R8A8_SRGB,
                        vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    )],
                    present_modes: vec![vk::PresentModeKHR::FIFO],
                    ..Default::default()
                },
                swapchain_queries: Cell::new(0),
            }
        }
    }

    impl DeviceProbe for FakeDevice {
        fn queue_family_flags(&self) -> Vec<vk::QueueFlags> {
            self.families.clone()
        }

        fn supports_present(&self, queue_family_index: u32) -> bool {
            self.present_families.contains(&queue_family_index)
        }

        fn extension_names(&self) -> Vec<CString> {
            self.extensions.clone()
        }

        fn swapchain_support(&self) -> SwapchainSupport {
            self.swapchain_queries.set(self.swapchain_queries.get() + 1);
            self.support.clone()
        }
    }

    const REQUIRED: &[&CStr] = &[ash::khr::swapchain::NAME];

    #[test]
    fn extensions_subset() {
        let available = [c"VK_KHR_swapchain", c"VK_KHR_maintenance1"];

        assert!(extensions_satisfied(&[], &[]));
        assert!(extensions_satisfied(&[], &available));
        assert!(extensions_satisfied(&[c"VK_KHR_swapchain"], &available));
        assert!(extensions_satisfied(&available, &available));
        assert!(!extensions_satisfied(&[c"VK_KHR_swapchain"], &[]));
        assert!(!extensions_satisfied(
            &[c"VK_KHR_swapchain", c"VK_EXT_mesh_shader"],
            &available,
        ));
    }

    #[test]
    fn names_compare_exactly() {
        let available = [c"VK_KHR_swapchain"];

        assert!(!extensions_satisfied(&[c"vk_khr_swapchain"], &available));
        assert!(!extensions_satisfied(&[c"VK_KHR_swap"], &available));
        assert!(!layers_satisfied(&[c"VK_LAYER_KHRONOS_validation"], &[c"VK_LAYER_LUNARG_monitor"]));
        assert!(layers_satisfied(
            &[c"VK_LAYER_KHRONOS_validation"],
            &[c"VK_LAYER_LUNARG_monitor", c"VK_LAYER_KHRONOS_validation"],
        ));
    }

    #[test]
    fn queue_families_from_separate_indices() {
        let families = [
            vk::QueueFlags::TRANSFER,
            vk::QueueFlags::COMPUTE,
            vk::QueueFlags::GRAPHICS,
            vk::QueueFlags::COMPUTE,
            vk::QueueFlags::TRANSFER,
            vk::QueueFlags::COMPUTE,
        ];
        let indices = select_queue_families(&families, |i| i == 5);

        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(5));
        assert!(indices.is_complete());
        assert_eq!(indices.unique_families(), vec![2, 5]);
    }

    #[test]
    fn queue_families_without_graphics_are_incomplete() {
        let families = [vk::QueueFlags::COMPUTE, vk::QueueFlags::TRANSFER];
        let indices = select_queue_families(&families, |_| true);

        assert_eq!(indices.graphics, None);
        assert_eq!(indices.present, Some(0));
        assert!(!indices.is_complete());
    }

    #[test]
    fn queue_families_first_match_wins() {
        let families = [
            vk::QueueFlags::COMPUTE,
            vk::QueueFlags::GRAPHICS,
            vk::QueueFlags::GRAPHICS,
            vk::QueueFlags::GRAPHICS,
        ];
        let indices = select_queue_families(&families, |i| i >= 2);

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
    }

    #[test]
    fn queue_family_serving_both_roles() {
        let families = [vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER; 3];
        let mut queried = Vec::new();
        let indices = select_queue_families(&families, |i| {
            queried.push(i);
            true
        });

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.unique_families(), vec![0]);
        // Complete after the first family, nothing else is looked at
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn present_support_not_queried_once_found() {
        let families = [
            vk::QueueFlags::TRANSFER,
            vk::QueueFlags::COMPUTE,
            vk::QueueFlags::GRAPHICS,
        ];
        let mut queried = Vec::new();
        let indices = select_queue_families(&families, |i| {
            queried.push(i);
            true
        });

        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.graphics, Some(2));
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn empty_queue_family_list() {
        let indices = select_queue_families(&[], |_| true);

        assert_eq!(indices, QueueFamilyIndices::default());
        assert!(indices.unique_families().is_empty());
    }

    #[test]
    fn suitable_device() {
        let device = FakeDevice::capable();

        assert!(is_device_suitable(&device, REQUIRED));
        assert_eq!(device.swapchain_queries.get(), 1);
    }

    #[test]
    fn missing_extension_skips_swapchain_query() {
        let device = FakeDevice {
            extensions: vec![c"VK_KHR_maintenance1".to_owned()],
            ..FakeDevice::capable()
        };

        assert!(!is_device_suitable(&device, REQUIRED));
        assert_eq!(device.swapchain_queries.get(), 0);
    }

    #[test]
    fn incomplete_queues_skip_swapchain_query() {
        let device = FakeDevice {
            present_families: vec![],
            ..FakeDevice::capable()
        };

        assert!(!is_device_suitable(&device, REQUIRED));
        assert_eq!(device.swapchain_queries.get(), 0);
    }

    #[test]
    fn inadequate_swapchain_support() {
        let no_modes = FakeDevice {
            support: SwapchainSupport {
                present_modes: vec![],
                ..FakeDevice::capable().support
            },
            ..FakeDevice::capable()
        };
        let no_formats = FakeDevice {
            support: SwapchainSupport {
                formats: vec![],
                ..FakeDevice::capable().support
            },
            ..FakeDevice::capable()
        };

        assert!(!is_device_suitable(&no_modes, REQUIRED));
        assert!(!is_device_suitable(&no_formats, REQUIRED));
    }

    #[test]
    fn pick_first_suitable_device() {
        let unsuitable = FakeDevice {
            families: vec![vk::QueueFlags::COMPUTE],
            ..FakeDevice::capable()
        };
        let first = FakeDevice {
            present_families: vec![0, 1],
            ..FakeDevice::capable()
        };
        let second = FakeDevice::capable();

        let picked = pick_device([unsuitable, first, second], REQUIRED)
            .expect("a suitable device");
        assert_eq!(picked.present_families, vec![0, 1]);

        assert!(pick_device(Vec::<FakeDevice>::new(), REQUIRED).is_none());
    }

    #[test]
    fn surface_format_preferred_over_order() {
        let preferred = surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
            preferred,
        ];

        assert_eq!(choose_surface_format(&formats), Some(preferred));
    }

    #[test]
    fn surface_format_falls_back_to_first() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            // Right format, wrong color space
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO,
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX,
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED]),
            vk::PresentModeKHR::FIFO,
        );
    }

    #[test]
    fn extent_reported_by_surface() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1920, 1080),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };

        assert_eq!(choose_extent(&capabilities, extent(50, 50)), extent(1920, 1080));
        assert_eq!(choose_extent(&capabilities, extent(3000, 3000)), extent(1920, 1080));
    }

    #[test]
    fn extent_clamped_to_surface_bounds() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(100, 100),
            max_image_extent: extent(2000, 2000),
            ..Default::default()
        };

        assert_eq!(choose_extent(&capabilities, extent(50, 50)), extent(100, 100));
        assert_eq!(choose_extent(&capabilities, extent(3000, 3000)), extent(2000, 2000));
        assert_eq!(choose_extent(&capabilities, extent(800, 3000)), extent(800, 2000));
    }

    #[test]
    fn image_count() {
        let capabilities = |min_image_count, max_image_count| vk::SurfaceCapabilitiesKHR {
            min_image_count,
            max_image_count,
            ..Default::default()
        };

        assert_eq!(choose_image_count(&capabilities(2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(3, 3)), 3);
    }
}
