use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "WindowConfig::default_title")]
    pub title: String,
    #[serde(default = "WindowConfig::default_width")]
    pub width: u32,
    #[serde(default = "WindowConfig::default_height")]
    pub height: u32,
    #[serde(default = "WindowConfig::default_vsync")]
    pub vsync: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameConfig {
    /// Number of color images in the swap ring; also the number of frame slots.
    #[serde(default = "FrameConfig::default_swap_image_count")]
    pub swap_image_count: u32,
    /// Upper bound on `Scene::draw` calls between two `display` calls.
    #[serde(default = "FrameConfig::default_max_draws_per_frame")]
    pub max_draws_per_frame: u32,
    #[serde(default = "FrameConfig::default_clear_color")]
    pub clear_color: [f32; 4],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShadowConfig {
    #[serde(default = "ShadowConfig::default_resolution")]
    pub resolution: u32,
    /// Half-width of the light's orthographic box.
    #[serde(default = "ShadowConfig::default_extent")]
    pub extent: f32,
    /// Distance from the scene focus to the light eye.
    #[serde(default = "ShadowConfig::default_distance")]
    pub distance: f32,
    #[serde(default = "ShadowConfig::default_depth_bias")]
    pub depth_bias: i32,
    #[serde(default = "ShadowConfig::default_slope_bias")]
    pub slope_bias: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_fov_degrees")]
    pub fov_degrees: f32,
    #[serde(default = "CameraConfig::default_near")]
    pub near: f32,
    #[serde(default = "CameraConfig::default_far")]
    pub far: f32,
    #[serde(default = "CameraConfig::default_move_speed")]
    pub move_speed: f32,
    #[serde(default = "CameraConfig::default_fast_move_speed")]
    pub fast_move_speed: f32,
    #[serde(default = "CameraConfig::default_mouse_sensitivity")]
    pub mouse_sensitivity: f32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSection {
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub shadow: ShadowConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Optional OBJ model placed by the demo shell.
    #[serde(default)]
    pub mesh: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub mesh: Option<PathBuf>,
}

impl WindowConfig {
    fn default_title() -> String {
        "Harrier".to_string()
    }

    const fn default_width() -> u32 {
        1280
    }

    const fn default_height() -> u32 {
        720
    }

    const fn default_vsync() -> bool {
        true
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            width: Self::default_width(),
            height: Self::default_height(),
            vsync: Self::default_vsync(),
        }
    }
}

impl FrameConfig {
    const fn default_swap_image_count() -> u32 {
        2
    }

    const fn default_max_draws_per_frame() -> u32 {
        19_000
    }

    const fn default_clear_color() -> [f32; 4] {
        [0.10, 0.10, 0.12, 1.0]
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            swap_image_count: Self::default_swap_image_count(),
            max_draws_per_frame: Self::default_max_draws_per_frame(),
            clear_color: Self::default_clear_color(),
        }
    }
}

impl ShadowConfig {
    const fn default_resolution() -> u32 {
        2048
    }

    const fn default_extent() -> f32 {
        20.0
    }

    const fn default_distance() -> f32 {
        30.0
    }

    const fn default_depth_bias() -> i32 {
        2
    }

    const fn default_slope_bias() -> f32 {
        2.0
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: Self::default_resolution(),
            extent: Self::default_extent(),
            distance: Self::default_distance(),
            depth_bias: Self::default_depth_bias(),
            slope_bias: Self::default_slope_bias(),
        }
    }
}

impl CameraConfig {
    const fn default_fov_degrees() -> f32 {
        45.0
    }

    const fn default_near() -> f32 {
        0.1
    }

    const fn default_far() -> f32 {
        1000.0
    }

    const fn default_move_speed() -> f32 {
        3.0
    }

    const fn default_fast_move_speed() -> f32 {
        9.0
    }

    const fn default_mouse_sensitivity() -> f32 {
        0.0025
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: Self::default_fov_degrees(),
            near: Self::default_near(),
            far: Self::default_far(),
            move_speed: Self::default_move_speed(),
            fast_move_speed: Self::default_fast_move_speed(),
            mouse_sensitivity: Self::default_mouse_sensitivity(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(mesh) = overrides.mesh.as_ref() {
            self.mesh = Some(mesh.clone());
        }
    }

    /// Swap image count clamped to what the frame loop supports.
    pub fn frame_slots(&self) -> usize {
        self.frame.swap_image_count.clamp(2, 3) as usize
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.vsync.is_none() && self.mesh.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.mesh.is_some() {
            fields.push("mesh");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: AppConfig =
            serde_json::from_str(r#"{ "window": { "width": 640 }, "shadow": { "resolution": 1024 } }"#)
                .expect("parse config");
        assert_eq!(cfg.window.width, 640);
        assert_eq!(cfg.window.height, 720);
        assert!(cfg.window.vsync);
        assert_eq!(cfg.shadow.resolution, 1024);
        assert_eq!(cfg.frame.max_draws_per_frame, 19_000);
        assert_eq!(cfg.frame.swap_image_count, 2);
        assert!((cfg.camera.mouse_sensitivity - 0.0025).abs() < f32::EPSILON);
    }

    #[test]
    fn overrides_replace_only_present_fields() {
        let mut cfg = AppConfig::default();
        let overrides = AppConfigOverrides { width: Some(1920), vsync: Some(false), ..Default::default() };
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.window.width, 1920);
        assert_eq!(cfg.window.height, 720);
        assert!(!cfg.window.vsync);
        assert_eq!(overrides.applied_fields(), vec!["width", "vsync"]);
        assert!(!overrides.is_empty());
    }

    #[test]
    fn missing_and_broken_files_are_errors() {
        let err = AppConfig::load("definitely/not/here.json").unwrap_err();
        assert!(format!("{err:#}").contains("definitely/not/here.json"));

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"{ not json").expect("write");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn frame_slots_are_clamped() {
        let mut cfg = AppConfig::default();
        cfg.frame.swap_image_count = 1;
        assert_eq!(cfg.frame_slots(), 2);
        cfg.frame.swap_image_count = 8;
        assert_eq!(cfg.frame_slots(), 3);
    }
}
