use std::env;

/// Contains configuration options for the renderer like the window size, validation, and vsync
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub app_name: String,
    pub window_title: String,
    pub width: u32,
    pub height: u32,
    pub enable_validation: bool,
    pub vsync: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            app_name: "Hello Triangle".to_owned(),
            window_title: "Vulkan".to_owned(),
            width: 800,
            height: 600,
            enable_validation: cfg!(debug_assertions),
            vsync: false,
        }
    }
}

impl RenderConfig {
    pub const VALIDATION_VAR: &'static str = "KINDLE_VALIDATION";
    pub const VSYNC_VAR: &'static str = "KINDLE_VSYNC";

    /// Defaults, overridden by `KINDLE_VALIDATION` and `KINDLE_VSYNC` when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(enabled) = flag_from_env(Self::VALIDATION_VAR) {
            config.enable_validation = enabled;
        }
        if let Some(enabled) = flag_from_env(Self::VSYNC_VAR) {
            config.vsync = enabled;
        }
        config
    }
}

fn flag_from_env(var: &str) -> Option<bool> {
    let value = env::var(var).ok()?;
    let flag = parse_flag(&value);
    if flag.is_none() {
        log::warn!("Ignoring {}={:?}, expected a boolean", var, value);
    }
    flag
}

pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("no"), Some(false));
        assert_eq!(parse_flag("Off"), Some(false));
        assert_eq!(parse_flag(""), None);
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn defaults() {
        let config = RenderConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.enable_validation, cfg!(debug_assertions));
        assert!(!config.vsync);
    }
}
