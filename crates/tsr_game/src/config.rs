//! Engine configuration loaded from `assets/engine.json`.
//!
//! Every field has a default, so a partial file only overrides what it names.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tsr_platform::window::PlatformConfig;

pub const DEFAULT_CONFIG_PATH: &str = "assets/engine.json";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowSection,
    pub level_path: PathBuf,
    pub map_index: usize,
    /// Keyboard scroll speed in pixels per second.
    pub scroll_speed: f32,
    pub pad_textures_to_power_of_two: bool,
    pub debug_untextured_tiles: bool,
    pub primitive_capacity: u32,
    pub default_tileset: DefaultTilesetSection,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowSection {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

/// Palette shown when the level cannot be loaded.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DefaultTilesetSection {
    pub texture: String,
    #[serde(default = "default_tile_side")]
    pub tile_width: u32,
    #[serde(default = "default_tile_side")]
    pub tile_height: u32,
    #[serde(default = "default_tile_count")]
    pub tile_count: u32,
}

const fn default_tile_side() -> u32 {
    32
}

const fn default_tile_count() -> u32 {
    16
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: WindowSection::default(),
            level_path: PathBuf::from("assets/levels/demo_level.json"),
            map_index: 0,
            scroll_speed: 480.0,
            pad_textures_to_power_of_two: true,
            debug_untextured_tiles: true,
            primitive_capacity: tsr_tiles::primitive::DEFAULT_PRIMITIVE_CAPACITY,
            default_tileset: DefaultTilesetSection::default(),
        }
    }
}

impl Default for WindowSection {
    fn default() -> Self {
        let platform = PlatformConfig::default();
        Self {
            title: platform.title,
            width: platform.width,
            height: platform.height,
            vsync: true,
        }
    }
}

impl Default for DefaultTilesetSection {
    fn default() -> Self {
        Self {
            texture: "assets/textures/terrain.png".to_string(),
            tile_width: default_tile_side(),
            tile_height: default_tile_side(),
            tile_count: default_tile_count(),
        }
    }
}

impl EngineConfig {
    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }
}

pub fn load_config_from_path(path: &Path) -> Result<EngineConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
    let config: EngineConfig = serde_json::from_str(&raw)
        .map_err(|e| format!("Failed to parse config JSON {}: {e}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the config, falling back to defaults when the file is missing or bad.
pub fn load_config_or_default(path: &Path) -> EngineConfig {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return EngineConfig::default();
    }
    match load_config_from_path(path) {
        Ok(config) => {
            log::info!("Loaded config from {}", path.display());
            config
        }
        Err(err) => {
            log::error!("{err}; using defaults");
            EngineConfig::default()
        }
    }
}

fn validate_config(config: &EngineConfig) -> Result<(), String> {
    if config.window.width == 0 || config.window.height == 0 {
        return Err(format!(
            "Config validation failed: window size must be > 0 (got {}x{})",
            config.window.width, config.window.height
        ));
    }
    if !config.scroll_speed.is_finite() || config.scroll_speed < 0.0 {
        return Err(format!(
            "Config validation failed: scroll_speed must be a non-negative number (got {})",
            config.scroll_speed
        ));
    }
    if config.primitive_capacity == 0 {
        return Err("Config validation failed: primitive_capacity must be > 0".to_string());
    }
    let tileset = &config.default_tileset;
    if tileset.tile_width == 0 || tileset.tile_height == 0 {
        return Err("Config validation failed: default_tileset tile size must be > 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file_path(name_hint: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "tsr_config_test_{}_{}_{}.json",
            name_hint,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let path = temp_file_path("partial");
        fs::write(
            &path,
            r#"{ "map_index": 2, "window": { "title": "Level test" }, "default_tileset": { "texture": "t.png" } }"#,
        )
        .expect("write temp config");
        let config = load_config_from_path(&path).expect("config loads");

        assert_eq!(config.map_index, 2);
        assert_eq!(config.window.title, "Level test");
        assert_eq!(config.window.width, PlatformConfig::default().width);
        assert_eq!(config.default_tileset.texture, "t.png");
        assert_eq!(config.default_tileset.tile_count, 16);
        assert_eq!(config.scroll_speed, EngineConfig::default().scroll_speed);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn rejects_zero_window() {
        let path = temp_file_path("zero_window");
        fs::write(&path, r#"{ "window": { "width": 0 } }"#).expect("write temp config");
        let err = load_config_from_path(&path).expect_err("zero width rejected");
        assert!(err.contains("window size must be > 0"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn malformed_or_missing_file_falls_back_to_defaults() {
        let path = temp_file_path("malformed");
        fs::write(&path, "{ nope").expect("write temp config");
        assert_eq!(load_config_or_default(&path), EngineConfig::default());
        let _ = fs::remove_file(&path);
        assert_eq!(load_config_or_default(&path), EngineConfig::default());
    }

    #[test]
    fn platform_config_mirrors_window_section() {
        let config = EngineConfig {
            window: WindowSection {
                title: "x".to_string(),
                width: 320,
                height: 200,
                vsync: false,
            },
            ..Default::default()
        };
        let platform = config.platform_config();
        assert_eq!((platform.width, platform.height), (320, 200));
        assert_eq!(platform.title, "x");
    }
}
