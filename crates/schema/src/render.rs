//! Render models derived from a schema: input controls and table columns

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::field::{ChoiceOption, FieldDescriptor, FieldKind};
use crate::transform::find_choice;

/// Input widget for a field kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum Widget {
    /// Single-line `<input>` with the given `type`
    Input { input_type: &'static str },
    TextArea,
    RichText,
    Checkbox,
    DatePicker { with_time: bool },
    Select { multiple: bool },
    FileInput { accept: Option<&'static str> },
}

/// Everything the rendering layer needs to draw one input control
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub widget: Widget,
    pub required: bool,
    pub disabled: bool,
    pub help_text: Option<String>,
    pub choices: Vec<ChoiceOption>,
}

impl From<&FieldDescriptor> for InputSpec {
    fn from(field: &FieldDescriptor) -> Self {
        Self {
            name: field.name.clone(),
            label: field.display_label(),
            kind: field.kind,
            widget: field.kind.widget(),
            required: field.required,
            disabled: field.disabled,
            help_text: field.help_text.clone(),
            choices: field.choices.clone(),
        }
    }
}

/// Display formatter for a table cell: `(cell value, whole row) -> text`
pub type Converter = Arc<dyn Fn(&Value, &Map<String, Value>) -> String + Send + Sync>;

/// One column of a resource table
#[derive(Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub label: String,
    converter: Option<Converter>,
}

impl ColumnSpec {
    pub fn new(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            converter: None,
        }
    }

    pub fn with_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>) -> String + Send + Sync + 'static,
    {
        self.converter = Some(Arc::new(converter));
        self
    }

    /// Column for a schema field; select kinds show option labels
    pub fn for_field(field: &FieldDescriptor) -> Self {
        let column = Self::new(&field.name, &field.display_label());
        if !field.kind.has_choices() || field.choices.is_empty() {
            return column;
        }

        let choices = field.choices.clone();
        column.with_converter(move |value, _row| match value {
            Value::Array(items) => items
                .iter()
                .map(|item| label_for(&choices, item))
                .collect::<Vec<_>>()
                .join(", "),
            single => label_for(&choices, single),
        })
    }

    /// Text shown in this column for `row`
    pub fn render_cell(&self, row: &Map<String, Value>) -> String {
        let value = row
            .get(&self.name)
            .or_else(|| row.get(&format!("{}_url", self.name)))
            .unwrap_or(&Value::Null);

        match &self.converter {
            Some(converter) => converter(value, row),
            None => cell_text(value),
        }
    }
}

impl fmt::Debug for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("converter", &self.converter.is_some())
            .finish()
    }
}

fn label_for(choices: &[ChoiceOption], value: &Value) -> String {
    find_choice(choices, value)
        .map(|choice| choice.label.clone())
        .unwrap_or_else(|| cell_text(value))
}

/// Default stringification of a wire value
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "Yes".to_string(),
        Value::Bool(false) => "No".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(", "),
        Value::Object(object) => object
            .get("name")
            .or_else(|| object.get("label"))
            .map(cell_text)
            .unwrap_or_else(|| value.to_string()),
    }
}
