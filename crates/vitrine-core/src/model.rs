//! Product record model.
//!
//! A [`Record`] is the authoritative product entity owned by the catalog.
//! The query path only ever reads records; ingestion is the single writer.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Opaque unique identifier for a product record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wrap an identifier without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the owned identifier string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// `true` when the identifier is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RecordId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Category metadata attached to a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colour_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

/// Authoritative product record as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Catalog identifier (e.g. `"0108775015"`).
    pub record_id: RecordId,
    /// Display name.
    pub name: String,
    /// Cleaned free-text description.
    #[serde(default)]
    pub description: String,
    /// Path or URL of the product image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(flatten)]
    pub category: CategoryMeta,
}

impl Record {
    /// Text used to compute the record's text embedding.
    ///
    /// Falls back to the display name when the description is empty.
    #[must_use]
    pub fn embedding_text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            record_id: RecordId::new("0108775015"),
            name: "Strap top".into(),
            description: "jersey top with narrow shoulder straps".into(),
            image_path: Some("images/010/0108775015.jpg".into()),
            category: CategoryMeta {
                product_group: Some("Garment Upper body".into()),
                colour_group: Some("Black".into()),
                section: Some("Womens Everyday Basics".into()),
            },
        }
    }

    #[test]
    fn record_id_display_and_borrow() {
        let id = RecordId::from("p1");
        assert_eq!(id.to_string(), "p1");
        assert_eq!(id.as_str(), "p1");
        let set: std::collections::HashSet<RecordId> = [id].into_iter().collect();
        assert!(set.contains("p1"));
    }

    #[test]
    fn blank_record_id_detected() {
        assert!(RecordId::new("   ").is_blank());
        assert!(RecordId::new("").is_blank());
        assert!(!RecordId::new("p1").is_blank());
    }

    #[test]
    fn record_serializes_category_flat() {
        let json = serde_json::to_value(sample()).expect("serialize record");
        assert_eq!(json["record_id"], "0108775015");
        assert_eq!(json["product_group"], "Garment Upper body");
        assert_eq!(json["section"], "Womens Everyday Basics");
        assert!(json.get("category").is_none());
    }

    #[test]
    fn record_deserializes_with_missing_optional_fields() {
        let record: Record =
            serde_json::from_str(r#"{"record_id":"p9","name":"Sock"}"#).expect("parse record");
        assert_eq!(record.record_id.as_str(), "p9");
        assert!(record.description.is_empty());
        assert!(record.image_path.is_none());
        assert_eq!(record.category, CategoryMeta::default());
    }

    #[test]
    fn embedding_text_falls_back_to_name() {
        let mut record = sample();
        assert_eq!(record.embedding_text(), "jersey top with narrow shoulder straps");
        record.description = "  ".into();
        assert_eq!(record.embedding_text(), "Strap top");
    }
}
