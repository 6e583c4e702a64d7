use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pdf::loader::LoaderConfig;
use crate::pdf::surface::WatermarkStyle;
use crate::pdf::zoom::{RenderScale, ScalePolicy};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "lectern";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid base_url {url:?}: {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,

    #[serde(default = "default_narrow_scale")]
    pub narrow_scale: f32,

    #[serde(default = "default_wide_scale")]
    pub wide_scale: f32,

    #[serde(default = "default_narrow_breakpoint")]
    pub narrow_breakpoint_px: u32,

    #[serde(default = "default_double_tap_ms")]
    pub double_tap_ms: u64,

    #[serde(default = "default_proxy_endpoint")]
    pub proxy_endpoint: String,

    /// Public CORS relay prefix; `null` disables the relay strategy
    #[serde(default = "default_relay_proxy")]
    pub relay_proxy: Option<String>,

    #[serde(default = "default_raw_fetch_timeout")]
    pub raw_fetch_timeout_secs: u64,

    /// Origin of the hosting page
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub watermark: WatermarkStyle,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_zoom_step() -> f32 {
    0.25
}

fn default_narrow_scale() -> f32 {
    0.8
}

fn default_wide_scale() -> f32 {
    1.2
}

fn default_narrow_breakpoint() -> u32 {
    768
}

fn default_double_tap_ms() -> u64 {
    300
}

fn default_proxy_endpoint() -> String {
    "/api/proxy-pdf".to_string()
}

fn default_relay_proxy() -> Option<String> {
    Some("https://api.allorigins.win/raw?url=".to_string())
}

fn default_raw_fetch_timeout() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            zoom_step: default_zoom_step(),
            narrow_scale: default_narrow_scale(),
            wide_scale: default_wide_scale(),
            narrow_breakpoint_px: default_narrow_breakpoint(),
            double_tap_ms: default_double_tap_ms(),
            proxy_endpoint: default_proxy_endpoint(),
            relay_proxy: default_relay_proxy(),
            raw_fetch_timeout_secs: default_raw_fetch_timeout(),
            base_url: None,
            watermark: WatermarkStyle::default(),
        }
    }
}

/// Default location: `<config dir>/lectern/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

impl Settings {
    /// Read and validate a settings file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings =
            serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded settings from {path:?}");

        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
        }
        settings.sanitize();
        Ok(settings)
    }

    /// Load `path` if given, else the default location, else defaults
    ///
    /// An explicitly given file must exist and parse; problems with the
    /// default file are logged and ignored.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let Some(path) = default_config_path() else {
            warn!("Could not determine config directory, using default settings");
            return Ok(Self::default());
        };
        if !path.exists() {
            info!("Settings file not found at {path:?}, using defaults");
            return Ok(Self::default());
        }

        match Self::load(&path) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("{e}; using default settings");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut content = String::from(SETTINGS_HEADER);
        content.push_str(&serde_yaml::to_string(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?);

        fs::write(path, content).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    /// Pull out-of-range values back to something usable
    fn sanitize(&mut self) {
        let step = self.zoom_step;
        self.zoom_step = if step.is_finite() && step > 0.0 {
            step.min(RenderScale::MAX - RenderScale::MIN)
        } else {
            default_zoom_step()
        };
        self.narrow_scale = RenderScale::clamp_factor(self.narrow_scale);
        self.wide_scale = RenderScale::clamp_factor(self.wide_scale);
        if self.raw_fetch_timeout_secs == 0 {
            self.raw_fetch_timeout_secs = default_raw_fetch_timeout();
        }
        if self.double_tap_ms == 0 {
            self.double_tap_ms = default_double_tap_ms();
        }
        self.watermark.opacity = self.watermark.opacity.clamp(0.0, 1.0);
    }

    #[must_use]
    pub fn scale_policy(&self) -> ScalePolicy {
        ScalePolicy {
            step: self.zoom_step,
            narrow_scale: RenderScale::new(self.narrow_scale),
            wide_scale: RenderScale::new(self.wide_scale),
            narrow_breakpoint_px: self.narrow_breakpoint_px,
        }
    }

    #[must_use]
    pub fn double_tap_window(&self) -> Duration {
        Duration::from_millis(self.double_tap_ms)
    }

    pub fn loader_config(&self) -> Result<LoaderConfig, SettingsError> {
        let base_url = self
            .base_url
            .as_deref()
            .map(|raw| {
                url::Url::parse(raw).map_err(|source| SettingsError::BaseUrl {
                    url: raw.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(LoaderConfig {
            base_url,
            proxy_endpoint: self.proxy_endpoint.clone(),
            relay_proxy: self.relay_proxy.clone(),
            raw_fetch_timeout: Duration::from_secs(self.raw_fetch_timeout_secs),
        })
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    settings.version = CURRENT_VERSION;
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# lectern viewer settings
# ============================================================================
# zoom_step            scale change per zoom in/out action
# narrow_scale         initial scale below narrow_breakpoint_px
# wide_scale           initial scale otherwise
# relay_proxy          public CORS relay prefix, null to disable
# base_url             origin of the hosting page (proxy + relative URLs)

"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        fs::write(tmp.path(), "{}\n").unwrap();
        assert_eq!(Settings::load(tmp.path()).unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        fs::write(
            tmp.path(),
            "zoom_step: 0.2\nrelay_proxy: null\nwatermark:\n  text: \"Course 101\"\n",
        )
        .unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.zoom_step, 0.2);
        assert_eq!(settings.relay_proxy, None);
        assert_eq!(settings.watermark.text, "Course 101");
        assert_eq!(settings.watermark.angle_deg, -45.0);
        assert_eq!(settings.raw_fetch_timeout_secs, 30);
    }

    #[test]
    fn test_out_of_range_values_are_sanitized() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        fs::write(
            tmp.path(),
            "zoom_step: -1\nwide_scale: 40\nnarrow_scale: 0.1\nraw_fetch_timeout_secs: 0\n",
        )
        .unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.zoom_step, 0.25);
        assert_eq!(settings.wide_scale, 5.0);
        assert_eq!(settings.narrow_scale, 0.5);
        assert_eq!(settings.raw_fetch_timeout_secs, 30);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        fs::write(tmp.path(), "zoom_step: [not, a, number]\n").unwrap();
        assert!(matches!(
            Settings::load(tmp.path()),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);
        let settings = Settings {
            base_url: Some("https://courses.example/".into()),
            ..Settings::default()
        };

        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_loader_config_parses_base_url() {
        let settings = Settings {
            base_url: Some("https://courses.example/app/".into()),
            raw_fetch_timeout_secs: 5,
            ..Settings::default()
        };
        let config = settings.loader_config().unwrap();
        assert_eq!(
            config.base_url.unwrap().as_str(),
            "https://courses.example/app/"
        );
        assert_eq!(config.raw_fetch_timeout, Duration::from_secs(5));

        let bad = Settings {
            base_url: Some("not a url".into()),
            ..Settings::default()
        };
        assert!(matches!(
            bad.loader_config(),
            Err(SettingsError::BaseUrl { .. })
        ));
    }
}
