//! Persisted user preferences.
//!
//! A flat key-value snapshot of the query parameters and channel settings.
//! It is loaded once when a session is built and saved after every
//! user-initiated change. The session never depends on a save succeeding.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::{AlertChannelConfig, MessageChannel};
use crate::error::{ConfigError, PreferencesError};
use crate::trip::{parse_time_of_day, Direction, TripQuery, VehicleTypeFilter};

/// Flat preference snapshot. Every field is optional text, as stored.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub date: String,
    pub direction: String,
    pub vehicle_type: String,
    pub start_time: String,
    pub end_time: String,
    pub alert_browser: bool,
    pub alert_email: bool,
    pub email: String,
    pub alert_telegram: bool,
    pub telegram_chat_id: String,
}

impl Preferences {
    /// Captures the current session settings.
    #[must_use]
    pub fn capture(query: &TripQuery, filter: VehicleTypeFilter, channels: &AlertChannelConfig) -> Self {
        let hm = |t: Option<chrono::NaiveTime>| t.map(|t| t.format("%H:%M").to_string()).unwrap_or_default();
        Self {
            date: query.date.format("%Y-%m-%d").to_string(),
            direction: query.direction.code().to_string(),
            vehicle_type: filter.code().to_string(),
            start_time: hm(query.from),
            end_time: hm(query.to),
            alert_browser: channels.local_signal,
            alert_email: channels.email.enabled,
            email: channels.email.destination.clone(),
            alert_telegram: channels.telegram.enabled,
            telegram_chat_id: channels.telegram.destination.clone(),
        }
    }

    /// Query stored in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the first unusable field.
    pub fn query(&self) -> Result<TripQuery, ConfigError> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|e| ConfigError::invalid("date", format!("'{}' is not YYYY-MM-DD ({e})", self.date)))?;
        let direction: Direction = self.direction.parse()?;
        let from = optional_time("start_time", &self.start_time)?;
        let to = optional_time("end_time", &self.end_time)?;
        TripQuery::new(date, direction).with_window(from, to)
    }

    /// Vehicle filter stored in the snapshot (blank means any).
    pub fn vehicle_type(&self) -> Result<VehicleTypeFilter, ConfigError> {
        self.vehicle_type.parse()
    }

    /// Channel settings stored in the snapshot.
    #[must_use]
    pub fn channels(&self) -> AlertChannelConfig {
        AlertChannelConfig {
            local_signal: self.alert_browser,
            email: MessageChannel {
                enabled: self.alert_email,
                destination: self.email.clone(),
            },
            telegram: MessageChannel {
                enabled: self.alert_telegram,
                destination: self.telegram_chat_id.clone(),
            },
        }
    }
}

fn optional_time(field: &str, raw: &str) -> Result<Option<chrono::NaiveTime>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_time_of_day(field, raw).map(Some)
}

/// Load/save of the preference snapshot.
pub trait PreferenceStore: Send {
    /// Returns the saved snapshot, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Preferences>, PreferencesError>;

    /// Replaces the saved snapshot.
    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError>;
}

/// Preferences kept in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// A store backed by `path`. Nothing is read until `load`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFileStore {
    fn load(&self) -> Result<Option<Preferences>, PreferencesError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        let bytes = serde_json::to_vec_pretty(prefs)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename so a crash never leaves a truncated file.
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Preferences kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    saved: Mutex<Option<Preferences>>,
    saves: Mutex<usize>,
}

impl InMemoryPreferenceStore {
    /// A store that already holds `prefs`.
    #[must_use]
    pub fn with(prefs: Preferences) -> Self {
        Self {
            saved: Mutex::new(Some(prefs)),
            saves: Mutex::new(0),
        }
    }

    /// Number of saves performed.
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn load(&self) -> Result<Option<Preferences>, PreferencesError> {
        Ok(self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(prefs.clone());
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

impl<S: PreferenceStore + Sync> PreferenceStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<Preferences>, PreferencesError> {
        (**self).load()
    }

    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        (**self).save(prefs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    fn sample() -> Preferences {
        Preferences {
            date: "2026-01-07".to_string(),
            direction: "VK".to_string(),
            vehicle_type: "sv".to_string(),
            start_time: "08:00".to_string(),
            end_time: "".to_string(),
            alert_browser: true,
            alert_email: true,
            email: "me@example.com".to_string(),
            alert_telegram: false,
            telegram_chat_id: String::new(),
        }
    }

    #[test]
    fn snapshot_applies_to_typed_settings() {
        let prefs = sample();
        let q = prefs.query().unwrap();
        assert_eq!(q.direction, Direction::VirtsuKuivastu);
        assert_eq!(q.from, NaiveTime::from_hms_opt(8, 0, 0));
        assert_eq!(q.to, None);
        assert_eq!(prefs.vehicle_type().unwrap(), VehicleTypeFilter::CAR);

        let ch = prefs.channels();
        assert!(ch.local_signal);
        assert_eq!(ch.email.eligible_destination(), Some("me@example.com"));
        assert!(!ch.telegram.enabled);
    }

    #[test]
    fn capture_then_apply_is_stable() {
        let prefs = sample();
        let captured = Preferences::capture(&prefs.query().unwrap(), prefs.vehicle_type().unwrap(), &prefs.channels());
        assert_eq!(captured, prefs);
    }

    #[test]
    fn bad_fields_are_named() {
        let mut prefs = sample();
        prefs.date = "07.01.2026".to_string();
        assert!(matches!(prefs.query(), Err(ConfigError::InvalidValue { ref field, .. }) if field == "date"));

        let mut prefs = sample();
        prefs.end_time = "7pm".to_string();
        assert!(matches!(prefs.query(), Err(ConfigError::InvalidValue { ref field, .. }) if field == "end_time"));
    }

    #[test]
    fn missing_keys_default() {
        let prefs: Preferences = serde_json::from_str(r#"{"date": "2026-01-07"}"#).unwrap();
        assert_eq!(prefs.direction, "");
        assert!(!prefs.alert_email);
        assert_eq!(prefs.vehicle_type().unwrap(), VehicleTypeFilter::Any);
    }

    #[test]
    fn json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("prefs.json"));
        assert!(store.load().unwrap().is_none());

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn json_file_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, b"{not json").unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, PreferencesError::Serialization(_)));
    }

    #[test]
    fn in_memory_store_counts_saves() {
        let store = InMemoryPreferenceStore::default();
        assert!(store.load().unwrap().is_none());
        store.save(&sample()).unwrap();
        store.save(&sample()).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load().unwrap(), Some(sample()));
    }
}
