//! Field descriptors: one editable attribute of a resource

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::render::Widget;
use crate::transform;
use crate::value::FieldValue;

/// Input kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Email,
    Url,
    Date,
    Datetime,
    Checkbox,
    Select,
    Multiselect,
    Image,
    File,
    Html,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Textarea => "textarea",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::Date => "date",
            FieldKind::Datetime => "datetime",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Select => "select",
            FieldKind::Multiselect => "multiselect",
            FieldKind::Image => "image",
            FieldKind::File => "file",
            FieldKind::Html => "html",
        }
    }

    /// Image and file fields travel as multipart parts
    pub fn is_file(&self) -> bool {
        matches!(self, FieldKind::Image | FieldKind::File)
    }

    pub fn has_choices(&self) -> bool {
        matches!(self, FieldKind::Select | FieldKind::Multiselect)
    }

    /// The input widget that renders this kind
    pub fn widget(&self) -> Widget {
        match self {
            FieldKind::Text => Widget::Input { input_type: "text" },
            FieldKind::Email => Widget::Input { input_type: "email" },
            FieldKind::Url => Widget::Input { input_type: "url" },
            FieldKind::Textarea => Widget::TextArea,
            FieldKind::Html => Widget::RichText,
            FieldKind::Checkbox => Widget::Checkbox,
            FieldKind::Date => Widget::DatePicker { with_time: false },
            FieldKind::Datetime => Widget::DatePicker { with_time: true },
            FieldKind::Select => Widget::Select { multiple: false },
            FieldKind::Multiselect => Widget::Select { multiple: true },
            FieldKind::Image => Widget::FileInput {
                accept: Some("image/*"),
            },
            FieldKind::File => Widget::FileInput { accept: None },
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a select or multiselect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub value: Value,
    pub label: String,
}

impl ChoiceOption {
    pub fn new(value: impl Into<Value>, label: &str) -> Self {
        Self {
            value: value.into(),
            label: label.to_string(),
        }
    }
}

/// Custom UI -> wire conversion
pub type SerializeHook = Arc<dyn Fn(&FieldValue) -> Value + Send + Sync>;

/// Custom wire -> UI conversion
pub type DeserializeHook = Arc<dyn Fn(&Value) -> FieldValue + Send + Sync>;

/// Declarative description of one editable attribute
#[derive(Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "helpText")]
    pub help_text: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChoiceOption>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(skip)]
    serialize: Option<SerializeHook>,
    #[serde(skip)]
    deserialize: Option<DeserializeHook>,
}

impl FieldDescriptor {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            label: None,
            help_text: None,
            choices: Vec::new(),
            disabled: false,
            serialize: None,
            deserialize: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_help_text(mut self, help_text: &str) -> Self {
        self.help_text = Some(help_text.to_string());
        self
    }

    pub fn with_choices(mut self, choices: Vec<ChoiceOption>) -> Self {
        self.choices = choices;
        self
    }

    /// Replace the kind's default UI -> wire conversion
    pub fn with_serialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FieldValue) -> Value + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(hook));
        self
    }

    /// Replace the kind's default wire -> UI conversion
    pub fn with_deserialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value) -> FieldValue + Send + Sync + 'static,
    {
        self.deserialize = Some(Arc::new(hook));
        self
    }

    /// Label shown next to the input, `founded_date` -> `Founded Date` when unset
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| humanize(&self.name))
    }

    pub fn serialize(&self, value: &FieldValue) -> Value {
        match &self.serialize {
            Some(hook) => hook(value),
            None => transform::serialize_default(value),
        }
    }

    pub fn deserialize(&self, wire: &Value) -> FieldValue {
        match &self.deserialize {
            Some(hook) => hook(wire),
            None => transform::deserialize_default(self.kind, &self.choices, wire),
        }
    }

    /// Wire value of this field on `instance`, following the `<name>_url`
    /// convention when the plain key is absent
    pub fn wire_value<'a>(&self, instance: &'a Map<String, Value>) -> Option<&'a Value> {
        instance
            .get(&self.name)
            .or_else(|| instance.get(&format!("{}_url", self.name)))
    }

    /// Read and convert this field from a resource instance
    pub fn read(&self, instance: &Map<String, Value>) -> FieldValue {
        self.wire_value(instance)
            .map(|wire| self.deserialize(wire))
            .unwrap_or_default()
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("label", &self.label)
            .field("help_text", &self.help_text)
            .field("choices", &self.choices)
            .field("disabled", &self.disabled)
            .field("custom_serialize", &self.serialize.is_some())
            .field("custom_deserialize", &self.deserialize.is_some())
            .finish()
    }
}

pub(crate) fn humanize(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
