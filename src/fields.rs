//! Sensitive field lists per record kind.
//!
//! Read and write paths must use the same list for a kind. A field encrypted
//! on write but missing from the read list stays ciphertext; the reverse
//! leaves plaintext in storage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder shown for a title that cannot be decrypted.
pub const PLACEHOLDER_TITLE: &str = "Untitled";

/// The kinds of record that carry encrypted fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Todo,
    Habit,
    Journal,
    Planner,
    Preferences,
}

impl RecordKind {
    /// All kinds, in declaration order.
    pub const ALL: [RecordKind; 5] = [
        Self::Todo,
        Self::Habit,
        Self::Journal,
        Self::Planner,
        Self::Preferences,
    ];

    /// The fields of this kind that are encrypted at rest.
    pub fn sensitive_fields(self) -> &'static [&'static str] {
        match self {
            Self::Todo | Self::Habit => &["title", "description", "category"],
            Self::Journal => &["title", "content", "mood"],
            Self::Planner => &["title", "description", "content", "notes"],
            Self::Preferences => &["preferences", "settings"],
        }
    }
}

/// The value substituted for `field` when its envelope cannot be decrypted.
pub fn fallback_for(field: &str) -> Value {
    match field {
        "title" => Value::String(PLACEHOLDER_TITLE.to_string()),
        "preferences" | "settings" => Value::Object(Map::new()),
        _ => Value::String(String::new()),
    }
}
