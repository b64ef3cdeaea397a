//! Default conversions between wire JSON and UI values, per field kind

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::trace;
use serde_json::Value;

use crate::field::{ChoiceOption, FieldKind};
use crate::value::{FieldValue, FileValue};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// UI -> wire. New uploads have no JSON form and serialize to `null`;
/// the payload builder moves them into multipart parts instead.
pub(crate) fn serialize_default(value: &FieldValue) -> Value {
    match value {
        FieldValue::Empty => Value::Null,
        FieldValue::Bool(flag) => Value::Bool(*flag),
        FieldValue::Text(text) => Value::String(text.clone()),
        FieldValue::Number(number) => Value::Number(number.clone()),
        FieldValue::Date(date) => Value::String(date.format(DATE_FORMAT).to_string()),
        FieldValue::DateTime(datetime) => Value::String(datetime.to_rfc3339()),
        FieldValue::Choice(choice) => choice.value.clone(),
        FieldValue::Choices(choices) => {
            Value::Array(choices.iter().map(|choice| choice.value.clone()).collect())
        }
        FieldValue::File(FileValue::Existing(url)) => Value::String(url.clone()),
        FieldValue::File(FileValue::New(_)) => Value::Null,
        FieldValue::Json(value) => value.clone(),
    }
}

/// Wire -> UI. `null` is `Empty` for every kind; values that do not fit the
/// kind are carried as text or raw JSON rather than rejected.
pub(crate) fn deserialize_default(
    kind: FieldKind,
    choices: &[ChoiceOption],
    wire: &Value,
) -> FieldValue {
    if wire.is_null() {
        return FieldValue::Empty;
    }

    match kind {
        FieldKind::Text
        | FieldKind::Textarea
        | FieldKind::Email
        | FieldKind::Url
        | FieldKind::Html => match wire {
            Value::String(text) => FieldValue::Text(text.clone()),
            Value::Number(number) => FieldValue::Text(number.to_string()),
            Value::Bool(flag) => FieldValue::Text(flag.to_string()),
            other => FieldValue::Json(other.clone()),
        },
        FieldKind::Checkbox => match wire {
            Value::Bool(flag) => FieldValue::Bool(*flag),
            Value::String(text) => FieldValue::Bool(matches!(
                text.to_ascii_lowercase().as_str(),
                "true" | "yes" | "on" | "1"
            )),
            Value::Number(number) => FieldValue::Bool(number.as_f64() != Some(0.0)),
            other => FieldValue::Json(other.clone()),
        },
        FieldKind::Date => match wire.as_str() {
            Some(text) => parse_date(text).unwrap_or_else(|| FieldValue::Text(text.to_string())),
            None => FieldValue::Json(wire.clone()),
        },
        FieldKind::Datetime => match wire.as_str() {
            Some(text) => {
                parse_datetime(text).unwrap_or_else(|| FieldValue::Text(text.to_string()))
            }
            None => FieldValue::Json(wire.clone()),
        },
        FieldKind::Select => match find_choice(choices, wire) {
            Some(choice) => FieldValue::Choice(choice.clone()),
            None => {
                trace!("no choice matches {} for select field", wire);
                FieldValue::Empty
            }
        },
        FieldKind::Multiselect => {
            let selected = match wire {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| find_choice(choices, item))
                    .cloned()
                    .collect(),
                single => find_choice(choices, single).cloned().into_iter().collect(),
            };
            FieldValue::Choices(selected)
        }
        FieldKind::Image | FieldKind::File => match wire.as_str() {
            Some("") | None => FieldValue::Empty,
            Some(url) => FieldValue::File(FileValue::Existing(url.to_string())),
        },
    }
}

/// Match an option by value. Numbers compare numerically so `1` finds `1.0`.
pub(crate) fn find_choice<'a>(choices: &'a [ChoiceOption], wire: &Value) -> Option<&'a ChoiceOption> {
    choices.iter().find(|choice| same_value(&choice.value, wire))
}

fn same_value(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn parse_date(text: &str) -> Option<FieldValue> {
    if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return Some(FieldValue::Date(date));
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|datetime| FieldValue::Date(datetime.date_naive()))
}

fn parse_datetime(text: &str) -> Option<FieldValue> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(FieldValue::DateTime(datetime.with_timezone(&Utc)));
    }
    // Naive timestamps from the backend are UTC
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| FieldValue::DateTime(naive.and_utc()))
}
