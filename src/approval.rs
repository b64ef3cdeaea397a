//! Field diffs shown in the approval queue
//!
//! The payload maps field names to `{old, new, diff}` objects. Any part may
//! be missing or null; accessors return `None` instead of failing.

use serde::Serialize;
use serde_json::{Map, Value};

/// Before/after of one field
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FieldDiff {
    pub old: Option<String>,
    pub new: Option<String>,
    /// Server-rendered diff markup
    pub diff: Option<String>,
}

impl FieldDiff {
    pub fn is_changed(&self) -> bool {
        self.old != self.new
    }
}

/// Diff payload of one club
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApprovalDiffs {
    fields: Map<String, Value>,
}

impl ApprovalDiffs {
    /// Anything other than an object is treated as "no diffs"
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(fields) => Self {
                fields: fields.clone(),
            },
            _ => Self::default(),
        }
    }

    /// Diffs of `code` from a payload keyed by club code
    pub fn for_club(payload: &Value, code: &str) -> Self {
        payload
            .get(code)
            .map(Self::from_value)
            .unwrap_or_default()
    }

    pub fn field(&self, name: &str) -> Option<FieldDiff> {
        let entry = self.fields.get(name)?.as_object()?;
        let diff = FieldDiff {
            old: text(entry.get("old")),
            new: text(entry.get("new")),
            diff: text(entry.get("diff")),
        };
        if diff == FieldDiff::default() {
            None
        } else {
            Some(diff)
        }
    }

    /// Every readable field diff, in payload order
    pub fn fields(&self) -> Vec<(String, FieldDiff)> {
        self.fields
            .keys()
            .filter_map(|name| self.field(name).map(|diff| (name.clone(), diff)))
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.fields().iter().any(|(_, diff)| diff.is_changed())
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
