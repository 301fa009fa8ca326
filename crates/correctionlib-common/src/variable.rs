use crate::value::ValueType;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The name, type, and optional description of one of a correction's
/// inputs or its output. Names are unique within a correction's
/// input list; this invariant is enforced by the loader, not here.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub value_type: ValueType,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub description: Option<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
