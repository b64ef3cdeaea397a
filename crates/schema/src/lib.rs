//! Field schemas for Penn Clubs resource forms
//!
//! A [`FieldSchema`] is an ordered list of [`FieldDescriptor`]s describing
//! the editable attributes of one kind of sub-resource (advisors, events,
//! members...). From it the form layer derives:
//!
//! - input control specs ([`InputSpec`]) and table columns ([`ColumnSpec`])
//! - UI values read from a resource instance ([`FieldSchema::read_instance`])
//! - client-side validation ([`FieldSchema::validate`])
//! - the request payload, with new uploads split out as multipart parts
//!   ([`FieldSchema::build_payload`])
//!
//! Nothing in this crate performs I/O apart from [`FileUpload::from_path`].

mod field;
mod render;
mod transform;
mod validate;
mod value;

use log::debug;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

pub use field::{ChoiceOption, DeserializeHook, FieldDescriptor, FieldKind, SerializeHook};
pub use render::{cell_text, ColumnSpec, Converter, InputSpec, Widget};
pub use validate::{FieldErrors, REQUIRED_MESSAGE};
pub use value::{FieldValue, FileUpload, FileValue};

/// UI values of a form, keyed by field name
pub type FormValues = BTreeMap<String, FieldValue>;

/// エラー型
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Invalid schema definition: {0}")]
    InvalidDefinition(#[from] serde_json::Error),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Request body produced from form values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WirePayload {
    /// JSON fields (multipart text parts when `files` is non-empty)
    pub fields: Map<String, Value>,
    /// Newly selected uploads, keyed by field name
    pub files: Vec<(String, FileUpload)>,
}

impl WirePayload {
    /// Multipart is only needed when something is actually uploaded
    pub fn is_multipart(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Ordered, name-unique list of field descriptors
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: Vec<FieldDescriptor>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// Load a schema declared as a JSON array of descriptors
    pub fn from_json(definition: Value) -> Result<Self, SchemaError> {
        let fields: Vec<FieldDescriptor> = serde_json::from_value(definition)?;
        Self::new(fields)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn input_specs(&self) -> Vec<InputSpec> {
        self.fields.iter().map(InputSpec::from).collect()
    }

    /// Table columns for `names`, in the given order. Names that are not
    /// schema fields get a plain column with a humanized label.
    pub fn columns(&self, names: &[&str]) -> Vec<ColumnSpec> {
        names
            .iter()
            .map(|name| match self.get(name) {
                Some(field) => ColumnSpec::for_field(field),
                None => ColumnSpec::new(name, &field::humanize(name)),
            })
            .collect()
    }

    /// Values for a blank create form
    pub fn empty_values(&self) -> FormValues {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), FieldValue::Empty))
            .collect()
    }

    /// Values for editing an existing instance
    pub fn read_instance(&self, instance: &Map<String, Value>) -> FormValues {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.read(instance)))
            .collect()
    }

    /// Required, enabled fields that are empty
    pub fn validate(&self, values: &FormValues) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for field in self.fields.iter().filter(|field| field.required && !field.disabled) {
            let empty = values
                .get(&field.name)
                .map(FieldValue::is_empty)
                .unwrap_or(true);
            if empty {
                errors.insert(&field.name, REQUIRED_MESSAGE);
            }
        }
        errors
    }

    /// Serialize `values` into a request body.
    ///
    /// Disabled fields and fields missing from `values` are left out.
    /// Existing files are left out too, so they are never re-uploaded.
    pub fn build_payload(&self, values: &FormValues) -> WirePayload {
        let mut payload = WirePayload::default();
        for field in self.fields.iter().filter(|field| !field.disabled) {
            let Some(value) = values.get(&field.name) else {
                continue;
            };
            match value {
                FieldValue::File(FileValue::New(upload)) => {
                    payload.files.push((field.name.clone(), upload.clone()));
                }
                FieldValue::File(FileValue::Existing(_)) => {
                    debug!("Skipping unchanged file field {}", field.name);
                }
                other => {
                    payload
                        .fields
                        .insert(field.name.clone(), field.serialize(other));
                }
            }
        }
        payload
    }
}
