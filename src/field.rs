use serde::{Deserialize, Serialize};
use std::fmt;

/// The type a formula operand evaluates to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Date,
    Time,
    Boolean,
    Any,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Time => "time",
            Self::Boolean => "boolean",
            Self::Any => "any",
        }
    }

    /// Whether a value of type `actual` may be passed where `self` is expected.
    pub fn accepts(self, actual: ValueType) -> bool {
        self == Self::Any || actual == Self::Any || self == actual
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field declared on the form, as supplied by the form definition store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

impl FieldDescriptor {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            field_type: field_type.into(),
        }
    }

    /// `None` for layout and upload fields that never take part in a
    /// calculation.
    pub fn value_type(&self) -> Option<ValueType> {
        value_type_of(&self.field_type)
    }
}

/// Maps a form field's declared type to the value type it contributes to a
/// formula.
pub fn value_type_of(field_type: &str) -> Option<ValueType> {
    match field_type {
        "shorttext" | "longtext" | "email" | "phone" | "url" | "dropdown" | "radio"
        | "checkbox" | "multiselect" | "name" | "address" | "hidden" => Some(ValueType::String),
        "number" | "currency" | "slider" | "rating" | "scale" | "product" | "quantity" => {
            Some(ValueType::Number)
        }
        "date" => Some(ValueType::Date),
        "time" => Some(ValueType::Time),
        "datetime" => Some(ValueType::Date),
        "toggle" | "consent" => Some(ValueType::Boolean),
        "formcalculation" => Some(ValueType::Any),
        // section, heading, paragraph, divider, pagebreak, fileupload,
        // signature, html and anything unknown.
        _ => None,
    }
}

pub(crate) fn find_field<'a>(fields: &'a [FieldDescriptor], id: &str) -> Option<&'a FieldDescriptor> {
    fields.iter().find(|field| field.id == id)
}
