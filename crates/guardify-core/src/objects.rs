//! Tracked objects and notification history.
//!
//! Objects are the named things a tag is attached to (keys, a wallet...).
//! Notifications are the far-entry alerts, kept newest first until a bulk
//! clear.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::storage::{Storage, StorageError, NOTIFICATIONS_KEY, OBJECTS_KEY};

/// Maximum length of an object name, in characters.
pub const MAX_NAME_LENGTH: usize = 64;

/// Errors raised by the object registry.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// The name is empty after trimming.
    #[error("Object name cannot be empty")]
    EmptyName,

    /// The name is too long.
    #[error("Object name exceeds maximum length of {max} characters (got {actual})")]
    NameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length provided.
        actual: usize,
    },

    /// No object has this identifier.
    #[error("Object not found: {id}")]
    NotFound {
        /// Requested identifier.
        id: String,
    },

    /// Objects can only be added right after the tag was discovered.
    #[error("No Guardify peripheral discovered yet. Run a discovery scan first.")]
    PeripheralNotDiscovered,

    /// Persisting the change failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for object operations.
pub type ObjectResult<T> = std::result::Result<T, ObjectError>;

/// What kind of thing the tag is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCategory {
    /// Keys.
    Keys,
    /// Wallet.
    Wallet,
    /// Bag.
    Bag,
    /// Medication.
    Meds,
    /// Phone.
    Phone,
    /// Anything else, including unknown categories.
    #[serde(other)]
    Other,
}

impl ObjectCategory {
    /// Every category, in display order.
    pub const ALL: [Self; 6] = [
        Self::Keys,
        Self::Wallet,
        Self::Bag,
        Self::Meds,
        Self::Phone,
        Self::Other,
    ];

    /// Icon glyph shown next to objects of this category.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Keys => "🔑",
            Self::Wallet => "👛",
            Self::Bag => "👜",
            Self::Meds => "💊",
            Self::Phone => "📱",
            Self::Other => "📦",
        }
    }
}

/// A persisted tracked object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "01936f4e-7c2a-7d4b-9a3e-5f1c2b3d4e5f",
    "name": "House keys",
    "type": "keys",
    "icon": "🔑",
    "createdAt": 1_736_910_000_000_i64
}))]
pub struct TrackedObject {
    /// Stable identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Category.
    #[serde(rename = "type")]
    pub category: ObjectCategory,

    /// Icon glyph.
    pub icon: String,

    /// Creation time, epoch milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub created_at: DateTime<Utc>,
}

/// A persisted alert message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "01936f4e-7c2a-7d4b-9a3e-5f1c2b3d4e60",
    "message": "You forgot \"House keys\"!",
    "timestamp": 1_736_910_000_000_i64
}))]
pub struct NotificationRecord {
    /// Stable identifier.
    pub id: String,

    /// Message text.
    pub message: String,

    /// Creation time, epoch milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[schema(value_type = i64)]
    pub timestamp: DateTime<Utc>,
}

/// The tracked object list.
#[derive(Debug, Clone)]
pub struct ObjectRegistry {
    storage: Storage,
}

impl ObjectRegistry {
    /// Registry over `storage`.
    #[must_use]
    pub const fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// All objects in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<TrackedObject> {
        self.storage.read_list(OBJECTS_KEY)
    }

    /// The object with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::NotFound`] if there is none.
    pub fn get(&self, id: &str) -> ObjectResult<TrackedObject> {
        self.list()
            .into_iter()
            .find(|o| o.id == id)
            .ok_or_else(|| ObjectError::NotFound { id: id.to_string() })
    }

    /// Validate and append a new object.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the list cannot be written.
    pub fn add(&self, name: &str, category: ObjectCategory) -> ObjectResult<TrackedObject> {
        let name = validate_name(name)?;
        let object = TrackedObject {
            id: Uuid::now_v7().to_string(),
            name,
            category,
            icon: category.icon().to_string(),
            created_at: Utc::now(),
        };

        let stored = object.clone();
        self.storage
            .update_list(OBJECTS_KEY, move |objects: &mut Vec<TrackedObject>| {
                objects.push(stored);
            })?;

        info!(id = %object.id, name = %object.name, "Tracked object added");
        Ok(object)
    }

    /// Remove the object with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectError::NotFound`] if there is none, or a storage error.
    pub fn delete(&self, id: &str) -> ObjectResult<TrackedObject> {
        let removed = self
            .storage
            .update_list(OBJECTS_KEY, |objects: &mut Vec<TrackedObject>| {
                let index = objects.iter().position(|o| o.id == id)?;
                Some(objects.remove(index))
            })?
            .ok_or_else(|| ObjectError::NotFound { id: id.to_string() })?;

        info!(id, name = %removed.name, "Tracked object deleted");
        Ok(removed)
    }
}

/// The notification history, newest first.
#[derive(Debug, Clone)]
pub struct NotificationLog {
    storage: Storage,
}

impl NotificationLog {
    /// Log over `storage`.
    #[must_use]
    pub const fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// All notifications, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<NotificationRecord> {
        self.storage.read_list(NOTIFICATIONS_KEY)
    }

    /// Prepend a notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be written.
    pub fn add(&self, message: &str) -> ObjectResult<NotificationRecord> {
        let record = NotificationRecord {
            id: Uuid::now_v7().to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        };

        let stored = record.clone();
        self.storage
            .update_list(NOTIFICATIONS_KEY, move |records: &mut Vec<NotificationRecord>| {
                records.insert(0, stored);
            })?;
        Ok(record)
    }

    /// Remove every notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be removed.
    pub fn clear(&self) -> ObjectResult<()> {
        self.storage.remove(NOTIFICATIONS_KEY)?;
        info!("Notification history cleared");
        Ok(())
    }
}

fn validate_name(name: &str) -> ObjectResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ObjectError::EmptyName);
    }
    let actual = name.chars().count();
    if actual > MAX_NAME_LENGTH {
        return Err(ObjectError::NameTooLong {
            max: MAX_NAME_LENGTH,
            actual,
        });
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, ObjectRegistry, NotificationLog) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        (
            dir,
            ObjectRegistry::new(storage.clone()),
            NotificationLog::new(storage),
        )
    }

    #[test]
    fn test_add_assigns_icon_and_trims_name() {
        let (_dir, objects, _) = registry();
        let object = objects.add("  House keys ", ObjectCategory::Keys).unwrap();
        assert_eq!(object.name, "House keys");
        assert_eq!(object.icon, "🔑");
        assert_eq!(objects.list(), vec![object]);
    }

    #[test]
    fn test_add_keeps_creation_order() {
        let (_dir, objects, _) = registry();
        let first = objects.add("Keys", ObjectCategory::Keys).unwrap();
        let second = objects.add("Bag", ObjectCategory::Bag).unwrap();
        let ids: Vec<_> = objects.list().into_iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[test]
    fn test_name_validation() {
        let (_dir, objects, _) = registry();
        assert!(matches!(
            objects.add("   ", ObjectCategory::Other),
            Err(ObjectError::EmptyName)
        ));
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(matches!(
            objects.add(&long, ObjectCategory::Other),
            Err(ObjectError::NameTooLong { max: 64, actual: 65 })
        ));
        assert!(objects.list().is_empty());
    }

    #[test]
    fn test_get_and_delete() {
        let (_dir, objects, _) = registry();
        let wallet = objects.add("Wallet", ObjectCategory::Wallet).unwrap();
        assert_eq!(objects.get(&wallet.id).unwrap(), wallet);

        let removed = objects.delete(&wallet.id).unwrap();
        assert_eq!(removed.id, wallet.id);
        assert!(matches!(
            objects.get(&wallet.id),
            Err(ObjectError::NotFound { .. })
        ));
        assert!(matches!(
            objects.delete(&wallet.id),
            Err(ObjectError::NotFound { .. })
        ));
    }

    #[test]
    fn test_wire_format_matches_stored_blob() {
        let json = r#"[{"id":"1736910000000","name":"Keys","type":"keys","icon":"🔑","createdAt":1736910000000}]"#;
        let parsed: Vec<TrackedObject> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0].category, ObjectCategory::Keys);
        assert_eq!(parsed[0].created_at.timestamp_millis(), 1_736_910_000_000);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }

    #[test]
    fn test_notifications_are_newest_first() {
        let (_dir, _, log) = registry();
        log.add("first").unwrap();
        log.add("second").unwrap();
        let messages: Vec<_> = log.list().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["second", "first"]);
    }

    #[test]
    fn test_clear_notifications() {
        let (_dir, _, log) = registry();
        log.add("alert").unwrap();
        log.clear().unwrap();
        assert!(log.list().is_empty());
        log.clear().unwrap();
    }

    #[test]
    fn test_unknown_category_falls_back_to_other() {
        let category: ObjectCategory = serde_json::from_str("\"umbrella\"").unwrap();
        assert_eq!(category, ObjectCategory::Other);
        assert_eq!(category.icon(), "📦");
    }

    #[test]
    fn test_category_icons() {
        let icons: Vec<_> = ObjectCategory::ALL.iter().map(|c| c.icon()).collect();
        assert_eq!(icons, vec!["🔑", "👛", "👜", "💊", "📱", "📦"]);
    }
}
