//! Named lookup and compound-correction orchestration.

use rustc_hash::FxHashMap;

use correctionlib_common::{Argument, CoreError, ErrorKind, Variable};

use crate::content::{Category, CategoryKeys, Content, Edges, Flow};
use crate::correction::Correction;
use crate::eval;
use crate::loader::{self, LoaderOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumOp {
    Add,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOp {
    Add,
    Mul,
    Div,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundCorrection {
    pub name: String,
    pub inputs: Vec<Variable>,
    pub output: Variable,
    pub inputs_update: Vec<String>,
    pub input_op: AccumOp,
    pub output_op: OutputOp,
    pub stack: Vec<String>,
}

impl CompoundCorrection {
    /// Runs the compound's `stack` in order: each step reads its
    /// component correction's inputs by name from the running bindings,
    /// folds its output into the accumulator with `output_op`, then folds
    /// that same output into every `inputs_update` binding with `input_op`
    /// for the next step.
    pub fn evaluate(&self, set: &CorrectionSet, args: &[Argument]) -> Result<f64, CoreError> {
        if args.len() != self.inputs.len() {
            return Err(CoreError::wrong_arity(self.inputs.len(), args.len()));
        }
        for (i, (arg, var)) in args.iter().zip(&self.inputs).enumerate() {
            if arg.value_type() != var.value_type {
                return Err(CoreError::wrong_type(
                    i,
                    &var.value_type.to_string(),
                    &arg.value_type().to_string(),
                ));
            }
        }

        let mut current: FxHashMap<&str, Argument> = self
            .inputs
            .iter()
            .map(|v| v.name.as_str())
            .zip(args.iter().cloned())
            .collect();

        let mut acc = match self.output_op {
            OutputOp::Add => 0.0,
            OutputOp::Mul | OutputOp::Div => 1.0,
            OutputOp::Last => 0.0,
        };

        for name in &self.stack {
            let corr = set.by_name(name)?;
            let corr_args = corr
                .inputs
                .iter()
                .map(|v| {
                    current.get(v.name.as_str()).cloned().ok_or_else(|| {
                        CoreError::reference(format!(
                            "compound correction '{}': stacked correction '{name}' needs input '{}' which is not available",
                            self.name, v.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let out = eval::evaluate(corr, &corr_args)?;

            acc = match self.output_op {
                OutputOp::Add => acc + out,
                OutputOp::Mul => acc * out,
                OutputOp::Div => acc / out,
                OutputOp::Last => out,
            };

            for update_name in &self.inputs_update {
                let prev = current.get(update_name.as_str()).cloned().ok_or_else(|| {
                    CoreError::reference(format!(
                        "compound correction '{}': inputs_update names unknown input '{update_name}'",
                        self.name
                    ))
                })?;
                let prev_real = prev.as_real().ok_or_else(|| {
                    CoreError::new(
                        ErrorKind::InvariantError,
                        format!("input '{update_name}' updated by a compound step must be numeric"),
                    )
                })?;
                let updated_real = match self.input_op {
                    AccumOp::Add => prev_real + out,
                    AccumOp::Mul => prev_real * out,
                    AccumOp::Div => prev_real / out,
                };
                let updated = match prev {
                    Argument::Int(_) => Argument::Int(updated_real.trunc() as i64),
                    Argument::Real(_) => Argument::Real(updated_real),
                    Argument::String(_) => unreachable!("checked numeric above"),
                };
                current.insert(update_name.as_str(), updated);
            }
        }

        Ok(acc)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionSet {
    pub schema_version: u32,
    pub description: Option<String>,
    pub corrections: Vec<Correction>,
    pub compound_corrections: Vec<CompoundCorrection>,
}

impl CorrectionSet {
    /// Loads and validates a `CorrectionSet` from an already-parsed JSON
    /// value.
    pub fn from_json(value: &serde_json::Value, options: LoaderOptions) -> Result<Self, CoreError> {
        loader::load(value, options)
    }

    /// [`Self::from_json`] with `LoaderOptions::default()`.
    pub fn from_json_default(value: &serde_json::Value) -> Result<Self, CoreError> {
        Self::from_json(value, LoaderOptions::default())
    }

    pub fn by_name(&self, name: &str) -> Result<&Correction, CoreError> {
        self.corrections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CoreError::reference(format!("no correction named '{name}'")))
    }

    pub fn compound_by_name(&self, name: &str) -> Result<&CompoundCorrection, CoreError> {
        self.compound_corrections
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                CoreError::reference(format!("no compound correction named '{name}'"))
            })
    }

    pub fn summary(&self) -> SetSummary {
        SetSummary {
            corrections: self.corrections.iter().map(summarize).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetSummary {
    pub corrections: Vec<CorrectionSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionSummary {
    pub name: String,
    pub node_count: usize,
    pub inputs: Vec<InputSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputSummary {
    pub name: String,
    pub kind: InputSummaryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputSummaryKind {
    NumericRange { low: f64, high: f64 },
    Categories(Vec<String>),
    Unconstrained,
}

fn summarize(correction: &Correction) -> CorrectionSummary {
    let mut node_count = 0usize;
    let mut ranges: FxHashMap<usize, (f64, f64)> = FxHashMap::default();
    let mut categories: FxHashMap<usize, Vec<String>> = FxHashMap::default();
    walk(&correction.data, &mut node_count, &mut ranges, &mut categories);

    let inputs = correction
        .inputs
        .iter()
        .enumerate()
        .map(|(slot, var)| InputSummary {
            name: var.name.clone(),
            kind: if let Some(&(low, high)) = ranges.get(&slot) {
                InputSummaryKind::NumericRange { low, high }
            } else if let Some(values) = categories.get(&slot) {
                InputSummaryKind::Categories(values.clone())
            } else {
                InputSummaryKind::Unconstrained
            },
        })
        .collect();

    CorrectionSummary {
        name: correction.name.clone(),
        node_count,
        inputs,
    }
}

fn merge_range(ranges: &mut FxHashMap<usize, (f64, f64)>, slot: usize, edges: &Edges) {
    let (low, high) = match edges {
        Edges::Uniform { low, high, .. } => (*low, *high),
        Edges::NonUniform(v) => (v[0], v[v.len() - 1]),
    };
    ranges
        .entry(slot)
        .and_modify(|(l, h)| {
            *l = l.min(low);
            *h = h.max(high);
        })
        .or_insert((low, high));
}

fn walk(
    node: &Content,
    node_count: &mut usize,
    ranges: &mut FxHashMap<usize, (f64, f64)>,
    categories: &mut FxHashMap<usize, Vec<String>>,
) {
    *node_count += 1;
    match node {
        Content::Constant(_) | Content::Formula(_) | Content::FormulaRef(_) | Content::HashPrng(_) => {}
        Content::Binning(b) => {
            merge_range(ranges, b.input, &b.edges);
            for child in &b.content {
                walk(child, node_count, ranges, categories);
            }
            if let Flow::Content(flow) = &b.flow {
                walk(flow, node_count, ranges, categories);
            }
        }
        Content::MultiBinning(m) => {
            for (&slot, edges) in m.inputs.iter().zip(&m.edges) {
                merge_range(ranges, slot, edges);
            }
            for child in &m.content {
                walk(child, node_count, ranges, categories);
            }
            if let Flow::Content(flow) = &m.flow {
                walk(flow, node_count, ranges, categories);
            }
        }
        Content::Category(cat) => walk_category(cat, node_count, ranges, categories),
        Content::Transform(t) => {
            walk(&t.rule, node_count, ranges, categories);
            walk(&t.content, node_count, ranges, categories);
        }
        Content::Switch(s) => {
            for selection in &s.selections {
                walk(&selection.content, node_count, ranges, categories);
            }
            walk(&s.default, node_count, ranges, categories);
        }
    }
}

fn walk_category(
    cat: &Category,
    node_count: &mut usize,
    ranges: &mut FxHashMap<usize, (f64, f64)>,
    categories: &mut FxHashMap<usize, Vec<String>>,
) {
    let seen = categories.entry(cat.input).or_default();
    match &cat.keys {
        CategoryKeys::Int(entries) => {
            for (key, value) in entries {
                seen.push(key.to_string());
                walk(value, node_count, ranges, categories);
            }
        }
        CategoryKeys::Str { entries, .. } => {
            for (key, value) in entries {
                seen.push(key.clone());
                walk(value, node_count, ranges, categories);
            }
        }
    }
    if let Some(default) = &cat.default {
        walk(default, node_count, ranges, categories);
    }
}

/// Deduplicated union of two sets: a name present in both
/// with byte-identical content is kept once; a name present in both with
/// different content is a `SCHEMA_ERROR`.
pub fn merge(a: &CorrectionSet, b: &CorrectionSet) -> Result<CorrectionSet, CoreError> {
    if a.schema_version != b.schema_version {
        return Err(CoreError::schema(format!(
            "cannot merge sets with different schema_version ({} vs {})",
            a.schema_version, b.schema_version
        )));
    }

    let mut corrections = a.corrections.clone();
    for c in &b.corrections {
        match corrections.iter().find(|existing| existing.name == c.name) {
            Some(existing) if existing == c => {}
            Some(_) => {
                return Err(CoreError::schema(format!(
                    "correction '{}' differs between the sets being merged",
                    c.name
                )));
            }
            None => corrections.push(c.clone()),
        }
    }

    let mut compound_corrections = a.compound_corrections.clone();
    for c in &b.compound_corrections {
        match compound_corrections
            .iter()
            .find(|existing| existing.name == c.name)
        {
            Some(existing) if existing == c => {}
            Some(_) => {
                return Err(CoreError::schema(format!(
                    "compound correction '{}' differs between the sets being merged",
                    c.name
                )));
            }
            None => compound_corrections.push(c.clone()),
        }
    }

    Ok(CorrectionSet {
        schema_version: a.schema_version,
        description: a.description.clone().or_else(|| b.description.clone()),
        corrections,
        compound_corrections,
    })
}
