//! Application settings and named values
//!
//! The settings snapshot is one JSON document updated by merge patch. Named
//! values are independent documents guarded by a version number: callers
//! check a value out, edit it, and save it back with the version they saw.

use parley_storage::Database;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::Result;

const SETTINGS_KEY: &str = "app_settings";
const VALUE_PREFIX: &str = "value:";

const MIN_ZOOM: f64 = 0.25;
const MAX_ZOOM: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub theme: String,
    pub zoom: f64,
    pub spellcheck: bool,
    /// Persist channel and private messages to the chat log
    pub log_messages: bool,
    pub notifications: bool,
    pub locale: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            zoom: 1.0,
            spellcheck: true,
            log_messages: true,
            notifications: true,
            locale: "en".to_string(),
        }
    }
}

impl AppSettings {
    fn validate(&self) -> Result<()> {
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&self.zoom) {
            return Err(CoreError::InvalidSettings(format!(
                "zoom must be between {MIN_ZOOM} and {MAX_ZOOM}"
            )));
        }
        if self.locale.trim().is_empty() {
            return Err(CoreError::InvalidSettings("locale must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A named value and the version to quote when saving it back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub key: String,
    pub value: Value,
    pub version: i64,
}

#[derive(Clone)]
pub struct SettingsService {
    db: Database,
}

impl SettingsService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Current settings, or the defaults if none were saved
    pub fn get(&self) -> Result<AppSettings> {
        match self.db.get_setting(SETTINGS_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(AppSettings::default()),
        }
    }

    /// Apply a JSON merge patch to the stored settings and persist the result
    pub fn update(&self, patch: &Value) -> Result<AppSettings> {
        if !patch.is_object() {
            return Err(CoreError::InvalidSettings(
                "settings patch must be an object".to_string(),
            ));
        }

        let mut document = serde_json::to_value(self.get()?)?;
        merge_patch(&mut document, patch);

        let settings: AppSettings = serde_json::from_value(document)
            .map_err(|e| CoreError::InvalidSettings(e.to_string()))?;
        settings.validate()?;

        self.db
            .set_setting(SETTINGS_KEY, &serde_json::to_string(&settings)?)?;
        tracing::debug!("Settings updated");
        Ok(settings)
    }

    pub fn get_value(&self, key: &str) -> Result<Option<NamedValue>> {
        let Some(stored) = self.db.get_value(&value_key(key)?)? else {
            return Ok(None);
        };
        Ok(Some(NamedValue {
            key: key.to_string(),
            value: serde_json::from_str(&stored.value)?,
            version: stored.version,
        }))
    }

    /// Like `get_value`, but an absent key checks out as `null` at version 0
    pub fn checkout_value(&self, key: &str) -> Result<NamedValue> {
        Ok(self.get_value(key)?.unwrap_or_else(|| NamedValue {
            key: key.to_string(),
            value: Value::Null,
            version: 0,
        }))
    }

    /// Save `value` if the stored version is still `version`. Returns the new version.
    pub fn save_value(&self, key: &str, value: &Value, version: i64) -> Result<i64> {
        let encoded = serde_json::to_string(value)?;
        let saved = self.db.save_value(&value_key(key)?, &encoded, Some(version))?;
        tracing::debug!(key, version = saved, "Saved named value");
        Ok(saved)
    }
}

fn value_key(key: &str) -> Result<String> {
    if key.trim().is_empty() {
        return Err(CoreError::InvalidSettings("value key must not be empty".to_string()));
    }
    Ok(format!("{VALUE_PREFIX}{key}"))
}

/// RFC 7386 merge patch: objects merge recursively, `null` removes, anything
/// else replaces.
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(entries) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(fields) = target {
        for (key, value) in entries {
            if value.is_null() {
                fields.remove(key);
            } else {
                merge_patch(fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_storage::StorageError;
    use serde_json::json;

    fn service() -> SettingsService {
        SettingsService::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(service().get().unwrap(), AppSettings::default());
    }

    #[test]
    fn test_update_merges_patch() {
        let settings = service();
        let updated = settings
            .update(&json!({"theme": "dark", "zoom": 1.5}))
            .unwrap();
        assert_eq!(updated.theme, "dark");
        assert_eq!(updated.zoom, 1.5);
        assert!(updated.spellcheck);

        // A null resets the field to its default on the next read
        let reset = settings.update(&json!({"theme": null})).unwrap();
        assert_eq!(reset.theme, "default");
        assert_eq!(settings.get().unwrap().zoom, 1.5);
    }

    #[test]
    fn test_update_rejects_invalid() {
        let settings = service();
        assert!(matches!(
            settings.update(&json!({"zoom": 9.0})),
            Err(CoreError::InvalidSettings(_))
        ));
        assert!(matches!(
            settings.update(&json!({"spellcheck": "yes"})),
            Err(CoreError::InvalidSettings(_))
        ));
        assert!(settings.update(&json!([1, 2])).is_err());
        assert_eq!(settings.get().unwrap(), AppSettings::default());
    }

    #[test]
    fn test_named_value_checkout_and_save() {
        let settings = service();
        assert!(settings.get_value("layout").unwrap().is_none());

        let checked_out = settings.checkout_value("layout").unwrap();
        assert_eq!(checked_out.version, 0);
        assert_eq!(checked_out.value, Value::Null);

        let v1 = settings
            .save_value("layout", &json!({"sidebar": "left"}), checked_out.version)
            .unwrap();
        assert_eq!(v1, 1);

        let current = settings.get_value("layout").unwrap().unwrap();
        assert_eq!(current.value, json!({"sidebar": "left"}));
        assert_eq!(current.version, 1);

        // A stale version is refused
        let err = settings
            .save_value("layout", &json!({"sidebar": "right"}), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Storage(StorageError::VersionConflict { expected: 0, actual: 1, .. })
        ));
    }

    #[test]
    fn test_merge_patch_nested() {
        let mut doc = json!({"a": {"b": 1, "c": 2}, "d": 3});
        merge_patch(&mut doc, &json!({"a": {"b": null, "e": 4}, "d": [1]}));
        assert_eq!(doc, json!({"a": {"c": 2, "e": 4}, "d": [1]}));
    }
}
