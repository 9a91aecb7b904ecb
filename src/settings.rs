use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::source::DEFAULT_API_BASE;
use crate::viewer::geometry::{DEFAULT_FIT_PADDING, DEFAULT_ZOOM_STEP};
use crate::viewer::{DEFAULT_CACHE_SIZE, ViewerOptions, ZoomMode};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "docview";

pub const ENV_API_BASE: &str = "DOCVIEW_API_BASE";
pub const ENV_API_KEY: &str = "DOCVIEW_API_KEY";

/// Zoom applied when a document is first shown
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialZoom {
    Scale(f32),
    Mode(ZoomKeyword),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomKeyword {
    FitWidth,
}

impl Default for InitialZoom {
    fn default() -> Self {
        Self::Scale(default_zoom_scale())
    }
}

impl InitialZoom {
    #[must_use]
    pub fn to_mode(self) -> ZoomMode {
        match self {
            Self::Scale(scale) => ZoomMode::explicit(scale),
            Self::Mode(ZoomKeyword::FitWidth) => ZoomMode::FitWidth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_fit_padding")]
    pub fit_width_padding: f32,

    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,

    #[serde(default)]
    pub initial_zoom: InitialZoom,

    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_fit_padding() -> f32 {
    DEFAULT_FIT_PADDING
}

fn default_zoom_step() -> f32 {
    DEFAULT_ZOOM_STEP
}

fn default_zoom_scale() -> f32 {
    1.2
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_log_file() -> PathBuf {
    PathBuf::from("docview.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            api_base: default_api_base(),
            api_key: None,
            fit_width_padding: default_fit_padding(),
            zoom_step: default_zoom_step(),
            initial_zoom: InitialZoom::default(),
            cache_size: default_cache_size(),
            log_file: default_log_file(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Viewer options derived from these settings
    #[must_use]
    pub fn viewer_options(&self) -> ViewerOptions {
        ViewerOptions {
            fit_padding: self.fit_width_padding,
            zoom_step: self.zoom_step,
            initial_zoom: self.initial_zoom.to_mode(),
            cache_size: self.cache_size,
            start_page: None,
        }
    }

    /// Override connection settings from the environment. `lookup` is
    /// usually `|name| std::env::var(name).ok()`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            debug!("API base overridden by {ENV_API_BASE}");
            self.api_base = base;
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            debug!("API key provided by {ENV_API_KEY}");
            self.api_key = Some(key);
        }
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        let (level, notice) = self.resolve_log_level();
        if let Some(notice) = notice {
            notice.emit();
        }
        level
    }

    /// Parsed log level, falling back to info with a notice when unknown
    pub fn resolve_log_level(&self) -> (log::LevelFilter, Option<Notice>) {
        match self.log_level.parse() {
            Ok(level) => (level, None),
            Err(_) => (
                log::LevelFilter::Info,
                Some(Notice::new(
                    log::Level::Warn,
                    format!("Unknown log level {:?}, using info", self.log_level),
                )),
            ),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// A log line produced while settings were loaded, before a logger exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: log::Level,
    pub message: String,
}

impl Notice {
    fn new(level: log::Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn emit(&self) {
        log::log!(self.level, "{}", self.message);
    }
}

/// Load settings from `explicit`, or from the default config location.
///
/// A missing default config is created with defaults. Unreadable or
/// malformed files are logged and defaults are used.
pub fn load_settings(explicit: Option<&Path>) -> Settings {
    let (settings, notices) = load_settings_deferred(explicit);
    notices.iter().for_each(Notice::emit);
    settings
}

/// Same as [`load_settings`], but hands back what would have been logged so
/// the caller can emit it once logging is set up.
pub fn load_settings_deferred(explicit: Option<&Path>) -> (Settings, Vec<Notice>) {
    let mut notices = Vec::new();
    let settings = match explicit {
        Some(path) => read_settings(path, &mut notices),
        None => match default_config_path() {
            Some(path) if path.exists() => read_settings(&path, &mut notices),
            Some(path) => {
                notices.push(Notice::new(
                    log::Level::Info,
                    format!("Settings file not found, creating with defaults at {path:?}"),
                ));
                let settings = Settings::default();
                write_settings(&settings, &path, &mut notices);
                settings
            }
            None => {
                notices.push(Notice::new(
                    log::Level::Warn,
                    "Could not determine config directory, using default settings",
                ));
                Settings::default()
            }
        },
    };
    (settings, notices)
}

pub fn load_settings_from_path(path: &Path) -> Settings {
    let mut notices = Vec::new();
    let settings = read_settings(path, &mut notices);
    notices.iter().for_each(Notice::emit);
    settings
}

fn read_settings(path: &Path, notices: &mut Vec<Notice>) -> Settings {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            notices.push(Notice::new(
                log::Level::Error,
                format!("Failed to read settings file {path:?}: {e}"),
            ));
            return Settings::default();
        }
    };

    match serde_yaml::from_str::<Settings>(&content) {
        Ok(mut settings) => {
            notices.push(Notice::new(
                log::Level::Debug,
                format!("Loaded settings from {path:?}"),
            ));
            if settings.version < CURRENT_VERSION {
                notices.push(Notice::new(
                    log::Level::Info,
                    format!(
                        "Migrating settings from v{} to v{}",
                        settings.version, CURRENT_VERSION
                    ),
                ));
                settings.version = CURRENT_VERSION;
                write_settings(&settings, path, notices);
            }
            settings
        }
        Err(e) => {
            notices.push(Notice::new(
                log::Level::Error,
                format!("Failed to parse settings file {path:?}: {e}"),
            ));
            Settings::default()
        }
    }
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) {
    let mut notices = Vec::new();
    write_settings(settings, path, &mut notices);
    notices.iter().for_each(Notice::emit);
}

fn write_settings(settings: &Settings, path: &Path, notices: &mut Vec<Notice>) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                notices.push(Notice::new(
                    log::Level::Error,
                    format!("Failed to create config directory {parent:?}: {e}"),
                ));
                return;
            }
        }
    }

    match fs::write(path, generate_settings_yaml(settings)) {
        Ok(()) => notices.push(Notice::new(
            log::Level::Debug,
            format!("Saved settings to {path:?}"),
        )),
        Err(e) => notices.push(Notice::new(
            log::Level::Error,
            format!("Failed to save settings to {path:?}: {e}"),
        )),
    }
}

/// Single-line YAML scalar for `value`, quoted and escaped when needed
fn yaml_scalar(value: &str) -> String {
    match serde_yaml::to_string(value) {
        Ok(text) => text.trim_end().to_string(),
        Err(_) => format!("{value:?}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push('\n');
    content.push_str("# Document service\n");
    content.push_str(&format!("api_base: {}\n", yaml_scalar(&settings.api_base)));
    match &settings.api_key {
        Some(key) => content.push_str(&format!("api_key: {}\n", yaml_scalar(key))),
        None => content.push_str("# api_key: \"...\"    # or set DOCVIEW_API_KEY\n"),
    }
    content.push('\n');
    content.push_str("# Viewer\n");
    content.push_str(&format!(
        "fit_width_padding: {:?}\n",
        settings.fit_width_padding
    ));
    content.push_str(&format!("zoom_step: {:?}\n", settings.zoom_step));
    let zoom = match settings.initial_zoom {
        InitialZoom::Scale(scale) => format!("{scale:?}"),
        InitialZoom::Mode(ZoomKeyword::FitWidth) => "fit_width".to_string(),
    };
    content.push_str(&format!("initial_zoom: {zoom}    # a scale or fit_width\n"));
    content.push_str(&format!("cache_size: {}\n", settings.cache_size));
    content.push('\n');
    content.push_str("# Logging\n");
    content.push_str(&format!(
        "log_file: {}\n",
        yaml_scalar(&settings.log_file.to_string_lossy())
    ));
    content.push_str(&format!("log_level: {}\n", yaml_scalar(&settings.log_level)));

    content
}
