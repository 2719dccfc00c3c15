use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::aggregation::RECENT_HISTORY_LIMIT;
use crate::models::DetectionRecord;

const DEFAULT_INTERVAL_MINUTES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub sensing_enabled: bool,
    pub notifications_enabled: bool,
    pub notification_interval_minutes: u32,
    pub recent_events: Vec<DetectionRecord>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            sensing_enabled: false,
            notifications_enabled: true,
            notification_interval_minutes: DEFAULT_INTERVAL_MINUTES,
            recent_events: Vec::new(),
        }
    }
}

impl UserSettings {
    pub fn notification_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.notification_interval_minutes) * 60)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("settings at {} are malformed, using defaults: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn snapshot(&self) -> UserSettings {
        self.read().clone()
    }

    pub fn set_sensing_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|settings| settings.sensing_enabled = enabled)
    }

    pub fn set_notifications(&self, enabled: bool, interval_minutes: u32) -> Result<()> {
        self.update(|settings| {
            settings.notifications_enabled = enabled;
            settings.notification_interval_minutes = interval_minutes;
        })
    }

    /// Keeps at most the newest ten records.
    pub fn set_recent_events(&self, events: Vec<DetectionRecord>) -> Result<()> {
        let skip = events.len().saturating_sub(RECENT_HISTORY_LIMIT);
        let events: Vec<_> = events.into_iter().skip(skip).collect();
        self.update(|settings| settings.recent_events = events)
    }

    fn update(&self, apply: impl FnOnce(&mut UserSettings)) -> Result<()> {
        let mut guard = self.write();
        apply(&mut *guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings dir {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmotionLabel;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(label: EmotionLabel) -> DetectionRecord {
        DetectionRecord {
            emotion: label,
            confidence: 0.7,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let settings = store.snapshot();

        assert!(!settings.sensing_enabled);
        assert!(settings.notifications_enabled);
        assert_eq!(settings.notification_interval(), Duration::from_secs(300));
    }

    #[test]
    fn changes_survive_a_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        store.set_sensing_enabled(true).unwrap();
        store.set_notifications(false, 15).unwrap();
        store.set_recent_events(vec![record(EmotionLabel::Calm)]).unwrap();

        let reloaded = SettingsStore::new(path).unwrap().snapshot();
        assert!(reloaded.sensing_enabled);
        assert!(!reloaded.notifications_enabled);
        assert_eq!(reloaded.notification_interval_minutes, 15);
        assert_eq!(reloaded.recent_events.len(), 1);
    }

    #[test]
    fn recent_events_are_capped_to_newest_ten() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let mut events: Vec<_> = (0..12).map(|_| record(EmotionLabel::Neutral)).collect();
        events[11].emotion = EmotionLabel::Happy;

        store.set_recent_events(events).unwrap();

        let stored = store.snapshot().recent_events;
        assert_eq!(stored.len(), 10);
        assert_eq!(stored[9].emotion, EmotionLabel::Happy);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.snapshot(), UserSettings::default());
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "sensingEnabled": true }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().snapshot();
        assert!(settings.sensing_enabled);
        assert_eq!(settings.notification_interval_minutes, 5);
    }
}
