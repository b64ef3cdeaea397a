//! UI-side values held by a form while it is being edited

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Number, Value};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::field::ChoiceOption;
use crate::SchemaError;

/// The value of one field as the input widgets see it
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// Unset
    #[default]
    Empty,
    Bool(bool),
    Text(String),
    Number(Number),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// A single selected option
    Choice(ChoiceOption),
    /// Selected options of a multiselect, in selection order
    Choices(Vec<ChoiceOption>),
    File(FileValue),
    /// Anything the kind's transform does not understand is carried as-is
    Json(Value),
}

impl FieldValue {
    /// Shorthand for a text value
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Whether the value counts as "not filled in" for required checks.
    ///
    /// An unchecked checkbox is a value (`false`), not an empty field.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::Choices(choices) => choices.is_empty(),
            FieldValue::File(FileValue::Existing(url)) => url.is_empty(),
            FieldValue::Json(value) => value.is_null(),
            FieldValue::Bool(_)
            | FieldValue::Number(_)
            | FieldValue::Date(_)
            | FieldValue::DateTime(_)
            | FieldValue::Choice(_)
            | FieldValue::File(FileValue::New(_)) => false,
        }
    }

    /// Plain-text rendering, used for table cells and search
    pub fn display(&self) -> String {
        match self {
            FieldValue::Empty => String::new(),
            FieldValue::Bool(true) => "Yes".to_string(),
            FieldValue::Bool(false) => "No".to_string(),
            FieldValue::Text(text) => text.clone(),
            FieldValue::Number(number) => number.to_string(),
            FieldValue::Date(date) => date.format("%Y-%m-%d").to_string(),
            FieldValue::DateTime(datetime) => datetime.format("%Y-%m-%d %H:%M").to_string(),
            FieldValue::Choice(choice) => choice.label.clone(),
            FieldValue::Choices(choices) => choices
                .iter()
                .map(|choice| choice.label.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            FieldValue::File(FileValue::Existing(url)) => url.clone(),
            FieldValue::File(FileValue::New(upload)) => upload.file_name.clone(),
            FieldValue::Json(value) => value.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

impl From<FileUpload> for FieldValue {
    fn from(value: FileUpload) -> Self {
        FieldValue::File(FileValue::New(value))
    }
}

/// Value of an image or file field
#[derive(Debug, Clone, PartialEq)]
pub enum FileValue {
    /// A file the server already stores, identified by its URL
    Existing(String),
    /// A file the user just picked; only these are ever uploaded
    New(FileUpload),
}

impl FileValue {
    pub fn is_new(&self) -> bool {
        matches!(self, FileValue::New(_))
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            FileValue::Existing(url) => Some(url),
            FileValue::New(_) => None,
        }
    }
}

/// A freshly selected file waiting to be uploaded
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl FileUpload {
    pub fn new(file_name: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: guess_content_type(file_name).map(str::to_string),
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Read a file from disk
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SchemaError::InvalidFile(path.display().to_string()))?;

        let mut file = File::open(path).await?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer).await?;

        Ok(Self::new(file_name, buffer))
    }
}

fn guess_content_type(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        "csv" => Some("text/csv"),
        "txt" => Some("text/plain"),
        _ => None,
    }
}
