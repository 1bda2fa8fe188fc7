use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::models::TimerSetting;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000";
pub const API_URL_ENV: &str = "AVATARCAM_API_URL";
pub const DEBUG_ENV: &str = "AVATARCAM_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    pub default_timer: TimerSetting,
    pub audio_cues_enabled: bool,
    pub api_base_url: String,
    /// Native camera index; `None` picks the front-facing device.
    pub camera_index: Option<u32>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            default_timer: TimerSetting::Five,
            audio_cues_enabled: true,
            api_base_url: DEFAULT_API_BASE_URL.into(),
            camera_index: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    capture: CaptureSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
    api_url_override: Option<String>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable settings file {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            api_url_override: std::env::var(API_URL_ENV)
                .ok()
                .filter(|url| !url.trim().is_empty()),
        })
    }

    /// Effective settings, with the environment override applied.
    pub fn capture(&self) -> CaptureSettings {
        let mut settings = self
            .data
            .read()
            .map(|guard| guard.capture.clone())
            .unwrap_or_default();
        if let Some(url) = &self.api_url_override {
            settings.api_base_url = url.clone();
        }
        settings
    }

    pub fn update_capture(&self, settings: CaptureSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        guard.capture = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

/// `AVATARCAM_DEBUG` set to anything but `0`/`false` turns on debug logging.
pub fn debug_logging_requested() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| !matches!(value.trim(), "" | "0" | "false"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("avatarcam-{}-{name}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let store = SettingsStore::new(temp_path("missing")).unwrap();
        let settings = store.capture();
        assert_eq!(settings.default_timer, TimerSetting::Five);
        assert!(settings.audio_cues_enabled);
        assert_eq!(settings.camera_index, None);
    }

    #[test]
    fn updates_persist_across_reload() {
        let path = temp_path("persist");
        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update_capture(CaptureSettings {
                default_timer: TimerSetting::Ten,
                audio_cues_enabled: false,
                api_base_url: "http://analysis.local".into(),
                camera_index: Some(1),
            })
            .unwrap();

        let reloaded = SettingsStore::new(path.clone()).unwrap().capture();
        assert_eq!(reloaded.default_timer, TimerSetting::Ten);
        assert!(!reloaded.audio_cues_enabled);
        assert_eq!(reloaded.camera_index, Some(1));
        fs::remove_file(path).ok();
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = temp_path("partial");
        fs::write(&path, r#"{"capture":{"defaultTimer":10}}"#).unwrap();
        let settings = SettingsStore::new(path.clone()).unwrap().capture();
        assert_eq!(settings.default_timer, TimerSetting::Ten);
        assert!(settings.audio_cues_enabled);
        fs::remove_file(path).ok();
    }

    #[test]
    fn corrupt_file_is_ignored() {
        let path = temp_path("corrupt");
        fs::write(&path, "{not json").unwrap();
        let settings = SettingsStore::new(path.clone()).unwrap().capture();
        assert_eq!(settings.default_timer, TimerSetting::Five);
        assert_eq!(settings.camera_index, None);
        fs::remove_file(path).ok();
    }
}
