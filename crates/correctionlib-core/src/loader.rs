//! The JSON tree loader and validator.
//!
//! Consumes an already-parsed [`serde_json::Value`] and builds a validated
//! [`CorrectionSet`], enforcing every structural and referential invariant
//! from §3/§4.5 inline as it descends. Schema v1 and v2 both land on
//! the same in-memory shape; v1 is
//! recognised by field presence (a `Category` with a `keys` field, a
//! `Binning`/`MultiBinning` missing `flow`), not by a second code path.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};

use correctionlib_common::{CoreError, ErrorKind, PathSegment, ValueType, Variable};

use crate::content::{
    Binning, Category, CategoryKeys, Comparison, Content, Edges, Flow, FormulaNode,
    FormulaRefNode, GenericFormula, HashPrngNode, MultiBinning, Switch, Transform,
};
use crate::content::{CmpOp, Distribution};
use crate::correction::Correction;
use crate::correctionset::{AccumOp, CompoundCorrection, CorrectionSet, OutputOp};

/// Replaces the upstream "global mutable knob" with an explicit
/// field passed to the loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderOptions {
    /// Accept raw IEEE `inf`/`-inf` numeric edges in addition to the
    /// `"inf"`/`"+inf"`/`"-inf"` string literals. `NaN` is always rejected.
    pub ignore_float_inf: bool,
}

/// Loads and validates a `CorrectionSet` from a parsed JSON value.
pub fn load(value: &Value, options: LoaderOptions) -> Result<CorrectionSet, CoreError> {
    let mut loader = Loader {
        options,
        path: Vec::new(),
    };
    loader.load_set(value)
}

struct Loader {
    options: LoaderOptions,
    path: Vec<PathSegment>,
}

impl Loader {
    fn err(&self, kind: ErrorKind, message: impl Into<String>) -> CoreError {
        CoreError::new(kind, message).with_path(self.path.clone())
    }

    // -- JSON shape helpers --------------------------------------------

    fn as_object<'v>(&self, value: &'v Value) -> Result<&'v Map<String, Value>, CoreError> {
        value
            .as_object()
            .ok_or_else(|| self.err(ErrorKind::SchemaError, "expected a JSON object"))
    }

    fn as_array<'v>(&self, value: &'v Value) -> Result<&'v Vec<Value>, CoreError> {
        value
            .as_array()
            .ok_or_else(|| self.err(ErrorKind::SchemaError, "expected a JSON array"))
    }

    fn as_str<'v>(&self, value: &'v Value) -> Result<&'v str, CoreError> {
        value
            .as_str()
            .ok_or_else(|| self.err(ErrorKind::SchemaError, "expected a JSON string"))
    }

    fn as_f64(&self, value: &Value) -> Result<f64, CoreError> {
        value
            .as_f64()
            .ok_or_else(|| self.err(ErrorKind::SchemaError, "expected a JSON number"))
    }

    fn field<'v>(&self, obj: &'v Map<String, Value>, name: &'static str) -> Result<&'v Value, CoreError> {
        obj.get(name)
            .ok_or_else(|| self.err(ErrorKind::SchemaError, format!("missing field '{name}'")))
    }

    fn field_str<'v>(&self, obj: &'v Map<String, Value>, name: &'static str) -> Result<&'v str, CoreError> {
        self.as_str(self.field(obj, name)?)
    }

    fn field_f64(&self, obj: &Map<String, Value>, name: &'static str) -> Result<f64, CoreError> {
        self.as_f64(self.field(obj, name)?)
    }

    fn field_u64(&self, obj: &Map<String, Value>, name: &'static str) -> Result<u64, CoreError> {
        self.field(obj, name)?
            .as_u64()
            .ok_or_else(|| self.err(ErrorKind::SchemaError, format!("field '{name}' must be a non-negative integer")))
    }

    fn field_i64(&self, obj: &Map<String, Value>, name: &'static str) -> Result<i64, CoreError> {
        self.field(obj, name)?
            .as_i64()
            .ok_or_else(|| self.err(ErrorKind::SchemaError, format!("field '{name}' must be an integer")))
    }

    fn opt_field_str(&self, obj: &Map<String, Value>, name: &'static str) -> Result<Option<String>, CoreError> {
        match obj.get(name) {
            Some(v) => Ok(Some(self.as_str(v)?.to_string())),
            None => Ok(None),
        }
    }

    fn resolve_input(&self, inputs: &[Variable], name: &str) -> Result<usize, CoreError> {
        inputs
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| self.err(ErrorKind::ReferenceError, format!("unknown input '{name}'")))
    }

    // -- Top level -------------------------------------------------------

    fn load_set(&mut self, value: &Value) -> Result<CorrectionSet, CoreError> {
        let obj = self.as_object(value)?;
        let schema_version = self.field_u64(obj, "schema_version")? as u32;
        if schema_version != 1 && schema_version != 2 {
            return Err(self.err(
                ErrorKind::SchemaError,
                format!("unsupported schema_version {schema_version}"),
            ));
        }
        let description = self.opt_field_str(obj, "description")?;

        let corrections_arr = self.as_array(self.field(obj, "corrections")?)?;
        self.path.push(PathSegment::Field("corrections"));
        let mut corrections = Vec::with_capacity(corrections_arr.len());
        for (i, item) in corrections_arr.iter().enumerate() {
            self.path.push(PathSegment::Index(i));
            let c = self.load_correction(item, schema_version);
            self.path.pop();
            corrections.push(c?);
        }
        self.path.pop();

        let mut seen_names = FxHashSet::default();
        for c in &corrections {
            if !seen_names.insert(c.name.clone()) {
                return Err(self.err(
                    ErrorKind::InvariantError,
                    format!("duplicate correction name '{}'", c.name),
                ));
            }
        }

        let mut compound_corrections = Vec::new();
        if let Some(cv) = obj.get("compound_corrections") {
            let arr = self.as_array(cv)?;
            self.path.push(PathSegment::Field("compound_corrections"));
            for (i, item) in arr.iter().enumerate() {
                self.path.push(PathSegment::Index(i));
                let c = self.load_compound(item);
                self.path.pop();
                compound_corrections.push(c?);
            }
            self.path.pop();
        }

        let mut seen_compound_names = FxHashSet::default();
        for c in &compound_corrections {
            if !seen_compound_names.insert(c.name.clone()) {
                return Err(self.err(
                    ErrorKind::InvariantError,
                    format!("duplicate compound correction name '{}'", c.name),
                ));
            }
            for stacked in &c.stack {
                if !seen_names.contains(stacked) {
                    return Err(self.err(
                        ErrorKind::ReferenceError,
                        format!(
                            "compound correction '{}' stacks unknown correction '{stacked}'",
                            c.name
                        ),
                    ));
                }
            }
        }

        Ok(CorrectionSet {
            schema_version,
            description,
            corrections,
            compound_corrections,
        })
    }

    // -- Variable / Correction -------------------------------------------

    fn load_variable(&mut self, value: &Value) -> Result<Variable, CoreError> {
        let obj = self.as_object(value)?;
        let name = self.field_str(obj, "name")?.to_string();
        let value_type = match self.field_str(obj, "type")? {
            "string" => ValueType::String,
            "int" => ValueType::Int,
            "real" => ValueType::Real,
            other => {
                return Err(self.err(
                    ErrorKind::SchemaError,
                    format!("unknown variable type '{other}'"),
                ));
            }
        };
        let description = self.opt_field_str(obj, "description")?;
        Ok(Variable {
            name,
            value_type,
            description,
        })
    }

    fn load_variables(
        &mut self,
        obj: &Map<String, Value>,
        field_name: &'static str,
    ) -> Result<Vec<Variable>, CoreError> {
        let arr = self.as_array(self.field(obj, field_name)?)?;
        self.path.push(PathSegment::Field(field_name));
        let mut result = Vec::with_capacity(arr.len());
        let mut seen = FxHashSet::default();
        for (i, item) in arr.iter().enumerate() {
            self.path.push(PathSegment::Index(i));
            let v = self.load_variable(item);
            self.path.pop();
            let v = match v {
                Ok(v) => v,
                Err(e) => {
                    self.path.pop();
                    return Err(e);
                }
            };
            if !seen.insert(v.name.clone()) {
                self.path.pop();
                return Err(self.err(
                    ErrorKind::InvariantError,
                    format!("duplicate input name '{}'", v.name),
                ));
            }
            result.push(v);
        }
        self.path.pop();
        Ok(result)
    }

    fn load_variable_field(
        &mut self,
        obj: &Map<String, Value>,
        field_name: &'static str,
    ) -> Result<Variable, CoreError> {
        self.path.push(PathSegment::Field(field_name));
        let v = self.load_variable(self.field(obj, field_name)?);
        self.path.pop();
        v
    }

    fn load_correction(&mut self, value: &Value, schema_version: u32) -> Result<Correction, CoreError> {
        let obj = self.as_object(value)?;
        let name = self.field_str(obj, "name")?.to_string();
        let version = self.field_i64(obj, "version")?;
        let description = self.opt_field_str(obj, "description")?;
        let inputs = self.load_variables(obj, "inputs")?;
        let output = self.load_variable_field(obj, "output")?;
        if output.value_type != ValueType::Real {
            return Err(self.err(ErrorKind::SchemaError, "'output.type' must be 'real'"));
        }

        let mut generic_formulas = Vec::new();
        if let Some(gv) = obj.get("generic_formulas") {
            let arr = self.as_array(gv)?;
            self.path.push(PathSegment::Field("generic_formulas"));
            for (i, item) in arr.iter().enumerate() {
                self.path.push(PathSegment::Index(i));
                let gf = self.load_generic_formula(item, &inputs);
                self.path.pop();
                generic_formulas.push(gf?);
            }
            self.path.pop();
        }

        self.path.push(PathSegment::Field("data"));
        let data = self.load_content(
            self.field(obj, "data")?,
            &inputs,
            &generic_formulas,
            schema_version,
            0,
        );
        self.path.pop();

        Ok(Correction {
            name,
            version,
            description,
            inputs,
            output,
            generic_formulas,
            data: data?,
        })
    }

    // -- Content dispatch --------------------------------------------------

    /// `depth` counts how many implicitly-bound (no explicit `input`/`inputs`
    /// field) Binning/MultiBinning/Category axes have been consumed on the
    /// path from the root to this node. It only matters for `schema_version
    /// == 1`: that schema has no `input`/`inputs` field at all (see
    /// `schemav1.py`), and its nesting order is itself the binding — the
    /// outermost Binning/Category binds `inputs[0]`, content one level down
    /// binds `inputs[1]`, and so on. v2 nodes always carry an explicit
    /// `input`/`inputs` field, so `depth` passes through them unchanged.
    fn load_content(
        &mut self,
        value: &Value,
        inputs: &[Variable],
        generic_formulas: &[GenericFormula],
        schema_version: u32,
        depth: usize,
    ) -> Result<Content, CoreError> {
        if let Some(n) = value.as_f64() {
            return Ok(Content::Constant(n));
        }
        let obj = self.as_object(value)?;
        match self.field_str(obj, "nodetype")? {
            "binning" => self
                .load_binning(obj, inputs, generic_formulas, schema_version, depth)
                .map(Content::Binning),
            "multibinning" => self
                .load_multibinning(obj, inputs, generic_formulas, schema_version, depth)
                .map(Content::MultiBinning),
            "category" => self
                .load_category(obj, inputs, generic_formulas, schema_version, depth)
                .map(Content::Category),
            "formula" => self.load_formula(obj, inputs).map(Content::Formula),
            "formularef" => self
                .load_formula_ref(obj, generic_formulas)
                .map(Content::FormulaRef),
            "transform" => self
                .load_transform(obj, inputs, generic_formulas, schema_version, depth)
                .map(Content::Transform),
            "hashprng" => self.load_hashprng(obj, inputs).map(Content::HashPrng),
            "switch" => self
                .load_switch(obj, inputs, generic_formulas, schema_version, depth)
                .map(Content::Switch),
            other => Err(self.err(ErrorKind::SchemaError, format!("unknown nodetype '{other}'"))),
        }
    }

    fn load_flow(
        &mut self,
        value: &Value,
        inputs: &[Variable],
        generic_formulas: &[GenericFormula],
        schema_version: u32,
        depth: usize,
    ) -> Result<Flow, CoreError> {
        if let Value::String(s) = value {
            return match s.as_str() {
                "clamp" => Ok(Flow::Clamp),
                "error" => Ok(Flow::Error),
                "wrap" => Ok(Flow::Wrap),
                other => Err(self.err(ErrorKind::SchemaError, format!("unknown flow literal '{other}'"))),
            };
        }
        let content = self.load_content(value, inputs, generic_formulas, schema_version, depth)?;
        Ok(Flow::Content(Box::new(content)))
    }

    /// Resolves a Binning/Category's bound input: an explicit `input` field
    /// (always present in v2) by name, or, for a v1 document that omits it,
    /// positionally as `inputs[depth]`.
    fn resolve_implicit_input(
        &mut self,
        obj: &Map<String, Value>,
        inputs: &[Variable],
        schema_version: u32,
        depth: usize,
    ) -> Result<usize, CoreError> {
        match obj.get("input") {
            Some(_) => {
                let name = self.field_str(obj, "input")?;
                self.resolve_input(inputs, name)
            }
            None if schema_version == 1 => {
                if depth >= inputs.len() {
                    return Err(self.err(
                        ErrorKind::ReferenceError,
                        format!(
                            "v1 positional input binding at depth {depth} exceeds the correction's {} declared input(s)",
                            inputs.len()
                        ),
                    ));
                }
                Ok(depth)
            }
            None => Err(self.err(ErrorKind::SchemaError, "missing field 'input'")),
        }
    }

    /// Rejects NaN unconditionally; rejects raw non-finite numbers unless
    /// `ignore_float_inf` is set. In practice `serde_json::Value` numbers
    /// parsed from standard JSON text are always finite, so this numeric
    /// branch only fires for a `Value` a caller assembled directly.
    fn load_edge_value(&mut self, value: &Value) -> Result<f64, CoreError> {
        match value {
            Value::String(s) => match s.as_str() {
                "inf" | "+inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(self.err(ErrorKind::SchemaError, format!("invalid edge literal '{other}'"))),
            },
            Value::Number(_) => {
                let v = self.as_f64(value)?;
                if v.is_nan() {
                    return Err(self.err(ErrorKind::InvariantError, "edge value must not be NaN"));
                }
                if v.is_infinite() && !self.options.ignore_float_inf {
                    return Err(self.err(
                        ErrorKind::InvariantError,
                        "numeric non-finite edge rejected; encode as \"inf\"/\"-inf\" or set ignore_float_inf",
                    ));
                }
                Ok(v)
            }
            _ => Err(self.err(ErrorKind::SchemaError, "edge must be a number or an inf literal string")),
        }
    }

    fn load_edges(&mut self, value: &Value) -> Result<Edges, CoreError> {
        match value {
            Value::Object(obj) => {
                let n = self.field_u64(obj, "n")? as usize;
                let low = self.field_f64(obj, "low")?;
                let high = self.field_f64(obj, "high")?;
                if n == 0 {
                    return Err(self.err(ErrorKind::InvariantError, "uniform edges 'n' must be > 0"));
                }
                if !(high > low) {
                    return Err(self.err(ErrorKind::InvariantError, "uniform edges require high > low"));
                }
                Ok(Edges::Uniform { n, low, high })
            }
            Value::Array(items) => {
                let mut edges = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    self.path.push(PathSegment::Index(i));
                    let v = self.load_edge_value(item);
                    self.path.pop();
                    edges.push(v?);
                }
                if edges.len() < 2 {
                    return Err(self.err(ErrorKind::InvariantError, "non-uniform edges need at least 2 entries"));
                }
                for w in edges.windows(2) {
                    if !(w[0] < w[1]) {
                        return Err(self.err(ErrorKind::InvariantError, "edges must be strictly increasing"));
                    }
                }
                Ok(Edges::NonUniform(edges))
            }
            _ => Err(self.err(ErrorKind::SchemaError, "edges must be a JSON object or array")),
        }
    }

    fn load_binning(
        &mut self,
        obj: &Map<String, Value>,
        inputs: &[Variable],
        generic_formulas: &[GenericFormula],
        schema_version: u32,
        depth: usize,
    ) -> Result<Binning, CoreError> {
        let input = self.resolve_implicit_input(obj, inputs, schema_version, depth)?;
        let child_depth = if obj.contains_key("input") { depth } else { depth + 1 };

        self.path.push(PathSegment::Field("edges"));
        let edges = self.load_edges(self.field(obj, "edges")?);
        self.path.pop();
        let edges = edges?;

        let nbins = edges.nbins();
        let content_arr = self.as_array(self.field(obj, "content")?)?;
        if content_arr.len() != nbins {
            return Err(self.err(
                ErrorKind::InvariantError,
                format!(
                    "binning content length {} does not match nbins {nbins}",
                    content_arr.len()
                ),
            ));
        }
        self.path.push(PathSegment::Field("content"));
        let mut content = Vec::with_capacity(content_arr.len());
        for (i, item) in content_arr.iter().enumerate() {
            self.path.push(PathSegment::Index(i));
            let c = self.load_content(item, inputs, generic_formulas, schema_version, child_depth);
            self.path.pop();
            content.push(c?);
        }
        self.path.pop();

        let flow = match obj.get("flow") {
            Some(v) => {
                self.path.push(PathSegment::Field("flow"));
                let f = self.load_flow(v, inputs, generic_formulas, schema_version, child_depth);
                self.path.pop();
                f?
            }
            None if schema_version == 1 => Flow::Clamp,
            None => return Err(self.err(ErrorKind::SchemaError, "missing field 'flow'")),
        };

        Ok(Binning {
            input,
            edges,
            content,
            flow,
        })
    }

    fn load_multibinning(
        &mut self,
        obj: &Map<String, Value>,
        inputs: &[Variable],
        generic_formulas: &[GenericFormula],
        schema_version: u32,
        depth: usize,
    ) -> Result<MultiBinning, CoreError> {
        let edges_arr = self.as_array(self.field(obj, "edges")?)?;

        let (input_slots, child_depth) = match obj.get("inputs") {
            Some(v) => {
                let input_names = self.as_array(v)?;
                if input_names.is_empty() {
                    return Err(self.err(ErrorKind::InvariantError, "multibinning requires at least one input"));
                }
                let mut slots = Vec::with_capacity(input_names.len());
                for name_val in input_names {
                    let name = self.as_str(name_val)?;
                    slots.push(self.resolve_input(inputs, name)?);
                }
                (slots, depth)
            }
            None if schema_version == 1 => {
                let n = edges_arr.len();
                if n == 0 {
                    return Err(self.err(ErrorKind::InvariantError, "multibinning requires at least one input"));
                }
                if depth + n > inputs.len() {
                    return Err(self.err(
                        ErrorKind::ReferenceError,
                        format!(
                            "v1 positional input binding at depth {depth} needs {n} input(s) but only {} remain",
                            inputs.len() - depth.min(inputs.len())
                        ),
                    ));
                }
                ((depth..depth + n).collect::<Vec<usize>>(), depth + n)
            }
            None => return Err(self.err(ErrorKind::SchemaError, "missing field 'inputs'")),
        };

        if edges_arr.len() != input_slots.len() {
            return Err(self.err(
                ErrorKind::SchemaError,
                "multibinning 'edges' length must match 'inputs' length",
            ));
        }
        self.path.push(PathSegment::Field("edges"));
        let mut edges = Vec::with_capacity(edges_arr.len());
        for (i, item) in edges_arr.iter().enumerate() {
            self.path.push(PathSegment::Index(i));
            let e = self.load_edges(item);
            self.path.pop();
            edges.push(e?);
        }
        self.path.pop();

        let nbins_total: usize = edges.iter().map(Edges::nbins).product();
        let content_arr = self.as_array(self.field(obj, "content")?)?;
        if content_arr.len() != nbins_total {
            return Err(self.err(
                ErrorKind::InvariantError,
                format!(
                    "multibinning content length {} does not match product of nbins {nbins_total}",
                    content_arr.len()
                ),
            ));
        }
        self.path.push(PathSegment::Field("content"));
        let mut content = Vec::with_capacity(content_arr.len());
        for (i, item) in content_arr.iter().enumerate() {
            self.path.push(PathSegment::Index(i));
            let c = self.load_content(item, inputs, generic_formulas, schema_version, child_depth);
            self.path.pop();
            content.push(c?);
        }
        self.path.pop();

        let flow = match obj.get("flow") {
            Some(v) => {
                self.path.push(PathSegment::Field("flow"));
                let f = self.load_flow(v, inputs, generic_formulas, schema_version, child_depth);
                self.path.pop();
                f?
            }
            None if schema_version == 1 => Flow::Clamp,
            None => return Err(self.err(ErrorKind::SchemaError, "missing field 'flow'")),
        };

        Ok(MultiBinning {
            inputs: input_slots,
            edges,
            content,
            flow,
        })
    }

    fn load_category(
        &mut self,
        obj: &Map<String, Value>,
        inputs: &[Variable],
        generic_formulas: &[GenericFormula],
        schema_version: u32,
        depth: usize,
    ) -> Result<Category, CoreError> {
        let input = self.resolve_implicit_input(obj, inputs, schema_version, depth)?;
        let child_depth = if obj.contains_key("input") { depth } else { depth + 1 };
        let input_type = inputs[input].value_type;

        let (key_values, value_values): (Vec<Value>, Vec<Value>) = if let Some(keys_val) = obj.get("keys") {
            let keys_arr = self.as_array(keys_val)?.clone();
            let content_arr = self.as_array(self.field(obj, "content")?)?.clone();
            if keys_arr.len() != content_arr.len() {
                return Err(self.err(
                    ErrorKind::SchemaError,
                    "category 'keys' and 'content' must have equal length",
                ));
            }
            (keys_arr, content_arr)
        } else {
            let items = self.as_array(self.field(obj, "content")?)?;
            let mut keys = Vec::with_capacity(items.len());
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                let item_obj = self.as_object(item)?;
                keys.push(self.field(item_obj, "key")?.clone());
                values.push(self.field(item_obj, "value")?.clone());
            }
            (keys, values)
        };

        let default = match obj.get("default") {
            Some(d) => {
                self.path.push(PathSegment::Field("default"));
                let c = self.load_content(d, inputs, generic_formulas, schema_version, child_depth);
                self.path.pop();
                Some(Box::new(c?))
            }
            None => None,
        };

        let all_int = key_values.iter().all(|k| k.is_i64() || k.is_u64());
        let all_str = key_values.iter().all(Value::is_string);
        if !key_values.is_empty() && !all_int && !all_str {
            return Err(self.err(ErrorKind::InvariantError, "category keys must be homogeneously int or string"));
        }
        if (all_int && input_type != ValueType::Int) || (all_str && input_type != ValueType::String) {
            return Err(self.err(ErrorKind::InvariantError, "category key type does not match input type"));
        }

        self.path.push(PathSegment::Field("content"));
        let keys = if all_str {
            let mut entries = Vec::with_capacity(key_values.len());
            let mut index = FxHashMap::default();
            for (i, (k, v)) in key_values.iter().zip(value_values.iter()).enumerate() {
                let key = k.as_str().unwrap().to_string();
                if index.contains_key(&key) {
                    self.path.pop();
                    return Err(self.err(ErrorKind::InvariantError, format!("duplicate category key '{key}'")));
                }
                self.path.push(PathSegment::Index(i));
                let content = self.load_content(v, inputs, generic_formulas, schema_version, child_depth);
                self.path.pop();
                let content = match content {
                    Ok(c) => c,
                    Err(e) => {
                        self.path.pop();
                        return Err(e);
                    }
                };
                index.insert(key.clone(), entries.len());
                entries.push((key, content));
            }
            CategoryKeys::Str { entries, index }
        } else {
            let mut entries = Vec::with_capacity(key_values.len());
            let mut seen = FxHashSet::default();
            for (i, (k, v)) in key_values.iter().zip(value_values.iter()).enumerate() {
                let key = k.as_i64().unwrap();
                if !seen.insert(key) {
                    self.path.pop();
                    return Err(self.err(ErrorKind::InvariantError, format!("duplicate category key {key}")));
                }
                self.path.push(PathSegment::Index(i));
                let content = self.load_content(v, inputs, generic_formulas, schema_version, child_depth);
                self.path.pop();
                let content = match content {
                    Ok(c) => c,
                    Err(e) => {
                        self.path.pop();
                        return Err(e);
                    }
                };
                entries.push((key, content));
            }
            CategoryKeys::Int(entries)
        };
        self.path.pop();

        Ok(Category { input, keys, default })
    }

    fn load_formula(&mut self, obj: &Map<String, Value>, inputs: &[Variable]) -> Result<FormulaNode, CoreError> {
        let parser = self.field_str(obj, "parser")?;
        if parser != "TFormula" {
            return Err(self.err(ErrorKind::SchemaError, format!("unsupported formula parser '{parser}'")));
        }
        let expression = self.field_str(obj, "expression")?.to_string();
        let variable_names = self.as_array(self.field(obj, "variables")?)?;
        let mut var_slots = Vec::with_capacity(variable_names.len());
        for name_val in variable_names {
            let name = self.as_str(name_val)?;
            var_slots.push(self.resolve_input(inputs, name)?);
        }
        let parameters = match obj.get("parameters") {
            Some(v) => self
                .as_array(v)?
                .iter()
                .map(|p| self.as_f64(p))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let ctx = correctionlib_formula::ParseContext {
            num_variables: var_slots.len(),
            num_parameters: Some(parameters.len()),
        };
        let program = correctionlib_formula::compile_str(&expression, ctx)
            .map_err(|e| self.err(ErrorKind::FormulaParseError, e.to_string()))?;

        Ok(FormulaNode {
            program,
            var_slots,
            parameters,
        })
    }

    fn load_generic_formula(&mut self, value: &Value, inputs: &[Variable]) -> Result<GenericFormula, CoreError> {
        let obj = self.as_object(value)?;
        let parser = self.field_str(obj, "parser")?;
        if parser != "TFormula" {
            return Err(self.err(ErrorKind::SchemaError, format!("unsupported formula parser '{parser}'")));
        }
        let expression = self.field_str(obj, "expression")?.to_string();
        let variable_names = self.as_array(self.field(obj, "variables")?)?;
        let mut var_slots = Vec::with_capacity(variable_names.len());
        for name_val in variable_names {
            let name = self.as_str(name_val)?;
            var_slots.push(self.resolve_input(inputs, name)?);
        }

        let ctx = correctionlib_formula::ParseContext {
            num_variables: var_slots.len(),
            num_parameters: None,
        };
        let program = correctionlib_formula::compile_str(&expression, ctx)
            .map_err(|e| self.err(ErrorKind::FormulaParseError, e.to_string()))?;

        Ok(GenericFormula { program, var_slots })
    }

    fn load_formula_ref(
        &mut self,
        obj: &Map<String, Value>,
        generic_formulas: &[GenericFormula],
    ) -> Result<FormulaRefNode, CoreError> {
        let index = self.field_u64(obj, "index")? as usize;
        if index >= generic_formulas.len() {
            return Err(self.err(
                ErrorKind::ReferenceError,
                format!("generic_formulas[{index}] does not exist"),
            ));
        }
        let parameters = self
            .as_array(self.field(obj, "parameters")?)?
            .iter()
            .map(|p| self.as_f64(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FormulaRefNode { index, parameters })
    }

    fn load_transform(
        &mut self,
        obj: &Map<String, Value>,
        inputs: &[Variable],
        generic_formulas: &[GenericFormula],
        schema_version: u32,
        depth: usize,
    ) -> Result<Transform, CoreError> {
        let input_name = self.field_str(obj, "input")?;
        let input = self.resolve_input(inputs, input_name)?;

        self.path.push(PathSegment::Field("rule"));
        let rule = self.load_content(self.field(obj, "rule")?, inputs, generic_formulas, schema_version, depth);
        self.path.pop();
        let rule = rule?;

        self.path.push(PathSegment::Field("content"));
        let content = self.load_content(self.field(obj, "content")?, inputs, generic_formulas, schema_version, depth);
        self.path.pop();
        let content = content?;

        Ok(Transform {
            input,
            rule: Box::new(rule),
            content: Box::new(content),
        })
    }

    fn load_hashprng(&mut self, obj: &Map<String, Value>, inputs: &[Variable]) -> Result<HashPrngNode, CoreError> {
        let input_names = self.as_array(self.field(obj, "inputs")?)?;
        if input_names.is_empty() {
            return Err(self.err(ErrorKind::InvariantError, "hashprng requires at least one input"));
        }
        let mut slots = Vec::with_capacity(input_names.len());
        for name_val in input_names {
            let name = self.as_str(name_val)?;
            slots.push(self.resolve_input(inputs, name)?);
        }
        let distribution = match self.field_str(obj, "distribution")? {
            "stdflat" => Distribution::StdFlat,
            "normal" => Distribution::Normal,
            "stdnormal" => Distribution::StdNormal,
            other => {
                return Err(self.err(
                    ErrorKind::SchemaError,
                    format!("unknown hashprng distribution '{other}'"),
                ));
            }
        };
        Ok(HashPrngNode {
            inputs: slots,
            distribution,
        })
    }

    fn load_switch(
        &mut self,
        obj: &Map<String, Value>,
        inputs: &[Variable],
        generic_formulas: &[GenericFormula],
        schema_version: u32,
        depth: usize,
    ) -> Result<Switch, CoreError> {
        let selections_arr = self.as_array(self.field(obj, "selections")?)?;
        self.path.push(PathSegment::Field("selections"));
        let mut selections = Vec::with_capacity(selections_arr.len());
        for (i, item) in selections_arr.iter().enumerate() {
            self.path.push(PathSegment::Index(i));
            let c = self.load_comparison(item, inputs, generic_formulas, schema_version, depth);
            self.path.pop();
            selections.push(c?);
        }
        self.path.pop();

        self.path.push(PathSegment::Field("default"));
        let default = self.load_content(self.field(obj, "default")?, inputs, generic_formulas, schema_version, depth);
        self.path.pop();
        let default = default?;

        Ok(Switch {
            selections,
            default: Box::new(default),
        })
    }

    fn load_comparison(
        &mut self,
        value: &Value,
        inputs: &[Variable],
        generic_formulas: &[GenericFormula],
        schema_version: u32,
        depth: usize,
    ) -> Result<Comparison, CoreError> {
        let obj = self.as_object(value)?;
        let variable_name = self.field_str(obj, "variable")?;
        let variable = self.resolve_input(inputs, variable_name)?;
        let op = match self.field_str(obj, "op")? {
            "<" => CmpOp::Lt,
            "<=" => CmpOp::Le,
            ">" => CmpOp::Gt,
            ">=" => CmpOp::Ge,
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            other => {
                return Err(self.err(
                    ErrorKind::SchemaError,
                    format!("unknown comparison operator '{other}'"),
                ));
            }
        };
        let value_num = self.field_f64(obj, "value")?;

        self.path.push(PathSegment::Field("content"));
        let content = self.load_content(self.field(obj, "content")?, inputs, generic_formulas, schema_version, depth);
        self.path.pop();
        let content = content?;

        Ok(Comparison {
            variable,
            op,
            value: value_num,
            content,
        })
    }

    // -- Compound corrections --------------------------------------------

    fn load_compound(&mut self, value: &Value) -> Result<CompoundCorrection, CoreError> {
        let obj = self.as_object(value)?;
        let name = self.field_str(obj, "name")?.to_string();
        let inputs = self.load_variables(obj, "inputs")?;
        let output = self.load_variable_field(obj, "output")?;

        let inputs_update = match obj.get("inputs_update") {
            Some(v) => self
                .as_array(v)?
                .iter()
                .map(|s| self.as_str(s).map(str::to_string))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        for update_name in &inputs_update {
            if !inputs.iter().any(|v| &v.name == update_name) {
                return Err(self.err(
                    ErrorKind::ReferenceError,
                    format!("inputs_update references unknown input '{update_name}'"),
                ));
            }
        }

        let input_op = match self.field_str(obj, "input_op")? {
            "+" => AccumOp::Add,
            "*" => AccumOp::Mul,
            "/" => AccumOp::Div,
            other => return Err(self.err(ErrorKind::SchemaError, format!("unknown input_op '{other}'"))),
        };
        let output_op = match self.field_str(obj, "output_op")? {
            "+" => OutputOp::Add,
            "*" => OutputOp::Mul,
            "/" => OutputOp::Div,
            "last" => OutputOp::Last,
            other => return Err(self.err(ErrorKind::SchemaError, format!("unknown output_op '{other}'"))),
        };

        let stack = self
            .as_array(self.field(obj, "stack")?)?
            .iter()
            .map(|s| self.as_str(s).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompoundCorrection {
            name,
            inputs,
            output,
            inputs_update,
            input_op,
            output_op,
            stack,
        })
    }
}
