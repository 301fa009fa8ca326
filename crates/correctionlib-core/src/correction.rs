//! A single named correction: its input/output descriptors, its shared
//! generic formulas, and its content tree.

use correctionlib_common::Variable;

use crate::content::{Content, GenericFormula};

#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub name: String,
    pub version: i64,
    pub description: Option<String>,
    pub inputs: Vec<Variable>,
    pub output: Variable,
    pub generic_formulas: Vec<GenericFormula>,
    pub data: Content,
}

impl Correction {
    /// Position of `name` in `inputs`, if present.
    pub fn input_slot(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|v| v.name == name)
    }
}
