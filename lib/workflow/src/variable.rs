//! Variable slots declared on nodes.
//!
//! Every node declares `input` and `output` slots. An input slot's value is
//! either a literal or a reference to an output variable of another node in
//! the same workflow instance.

use serde::{Deserialize, Serialize};

/// Declared type of a variable slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableType {
    /// UTF-8 text.
    #[default]
    String,
    /// A 64-bit float.
    Number,
    /// `true` / `false`.
    Boolean,
    /// An arbitrary JSON object.
    Object,
    /// A list of strings.
    StringArray,
    /// A list of numbers.
    NumberArray,
    /// An uploaded file id.
    File,
}

impl VariableType {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::StringArray => "stringArray",
            Self::NumberArray => "numberArray",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a slot's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VariableValue {
    /// A constant authored into the definition.
    Literal {
        #[serde(default)]
        content: String,
    },
    /// An output variable of another node.
    Ref {
        #[serde(rename = "sourceNode")]
        source_node: String,
        #[serde(rename = "sourceName")]
        source_name: String,
    },
}

impl Default for VariableValue {
    fn default() -> Self {
        Self::Literal {
            content: String::new(),
        }
    }
}

/// A named, typed slot on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Slot name, unique within the node's inputs or outputs.
    #[serde(default)]
    pub name: String,
    /// Declared type.
    #[serde(rename = "type", default)]
    pub ty: VariableType,
    /// Whether a value must be present.
    #[serde(default)]
    pub required: bool,
    /// Whether the slot is fixed by the node type rather than user-added.
    #[serde(default)]
    pub fixed: bool,
    /// Value source.
    #[serde(default)]
    pub value: VariableValue,
}

impl Variable {
    /// Creates a literal slot.
    #[must_use]
    pub fn literal(name: impl Into<String>, ty: VariableType, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            fixed: false,
            value: VariableValue::Literal {
                content: content.into(),
            },
        }
    }

    /// Creates a slot referencing another node's output.
    #[must_use]
    pub fn reference(
        name: impl Into<String>,
        ty: VariableType,
        source_node: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            fixed: false,
            value: VariableValue::Ref {
                source_node: source_node.into(),
                source_name: source_name.into(),
            },
        }
    }

    /// Marks the slot as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_literal_and_ref_slots() {
        let slots: Vec<Variable> = serde_json::from_value(json!([
            {"name": "url", "type": "string", "required": true,
             "value": {"type": "literal", "content": "https://example.com"}},
            {"name": "question", "type": "string",
             "value": {"type": "ref", "sourceNode": "start", "sourceName": "q"}}
        ]))
        .expect("parse");

        assert_eq!(
            slots[0],
            Variable::literal("url", VariableType::String, "https://example.com").required()
        );
        assert_eq!(
            slots[1],
            Variable::reference("question", VariableType::String, "start", "q")
        );
    }

    #[test]
    fn missing_fields_default() {
        let slot: Variable = serde_json::from_value(json!({"name": "tags", "type": "stringArray"}))
            .expect("parse");
        assert_eq!(slot.ty, VariableType::StringArray);
        assert!(!slot.required);
        assert_eq!(slot.value, VariableValue::default());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_value::<Variable>(json!({"name": "x", "type": "matrix"}));
        assert!(result.is_err());
    }
}
