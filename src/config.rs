use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const APP_DIR: &str = "smart-table";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub notifications: NotificationConfig,
    pub defaults: DefaultsConfig,
    pub refresh: RefreshConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// JSON document holding every persisted key.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub channel_id: String,
    pub channel_name: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_id: "classes".to_string(),
            channel_name: "Class Reminders".to_string(),
        }
    }
}

/// Values pre-filled into new entries and exam plans.
#[derive(Debug, Deserialize, Clone)]
pub struct DefaultsConfig {
    pub lead_minutes: u32,
    pub exam_duration_hours: u32,
    pub exams_per_day: u32,
    pub exam_gap_minutes: u32,
    pub exam_start_time: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            lead_minutes: 10,
            exam_duration_hours: 2,
            exams_per_day: 1,
            exam_gap_minutes: 15,
            exam_start_time: "9:00 AM".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    pub tick_interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
        }
    }
}

pub fn default_data_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("timetable.json")
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        let builder = Config::builder()
            // 1. Load default values
            // Storage
            .set_default("storage.path", default_data_path().to_string_lossy().into_owned())?
            // Notifications
            .set_default("notifications.channel_id", "classes")?
            .set_default("notifications.channel_name", "Class Reminders")?
            // Defaults
            .set_default("defaults.lead_minutes", 10)?
            .set_default("defaults.exam_duration_hours", 2)?
            .set_default("defaults.exams_per_day", 1)?
            .set_default("defaults.exam_gap_minutes", 15)?
            .set_default("defaults.exam_start_time", "9:00 AM")?
            // Refresh
            .set_default("refresh.tick_interval_secs", 60)?

            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))

            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))

            // 4. Load from Environment variables (SMART_TABLE__STORAGE__PATH=...)
            .add_source(Environment::with_prefix("SMART_TABLE").separator("__"));

        let s = builder.build().context("Failed to build configuration")?;
        s.try_deserialize().context("Invalid configuration")
    }
}
