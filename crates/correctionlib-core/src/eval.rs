//! The scalar correction evaluator: a depth-first walk of a
//! [`Content`] tree under a mutable array of current input bindings.

use smallvec::SmallVec;

use correctionlib_common::{Argument, CoreError, ErrorKind};

use crate::content::{
    Category, CategoryKeys, Comparison, Content, Edges, Flow, FormulaNode, FormulaRefNode,
    HashPrngNode, MultiBinning, Switch, Transform,
};
use crate::correction::Correction;
use crate::hashprng;

/// Evaluates `correction` against a positional argument list, binding and
/// type-checking against `correction.inputs` first.
pub fn evaluate(correction: &Correction, args: &[Argument]) -> Result<f64, CoreError> {
    if args.len() != correction.inputs.len() {
        return Err(CoreError::wrong_arity(correction.inputs.len(), args.len()));
    }
    for (i, (arg, var)) in args.iter().zip(&correction.inputs).enumerate() {
        if arg.value_type() != var.value_type {
            return Err(CoreError::wrong_type(
                i,
                &var.value_type.to_string(),
                &arg.value_type().to_string(),
            ));
        }
    }
    let mut bindings: Vec<Argument> = args.to_vec();
    eval_content(&correction.data, correction, &mut bindings)
}

fn bound_real(bindings: &[Argument], slot: usize) -> Result<f64, CoreError> {
    bindings[slot].as_real().ok_or_else(|| {
        CoreError::new(
            ErrorKind::InvariantError,
            format!("input at slot {slot} is not numeric"),
        )
    })
}

pub(crate) fn eval_content(
    node: &Content,
    correction: &Correction,
    bindings: &mut [Argument],
) -> Result<f64, CoreError> {
    match node {
        Content::Constant(v) => Ok(*v),
        Content::Binning(b) => {
            let x = bound_real(bindings, b.input)?;
            let n = b.edges.nbins();
            let target = match b.edges.locate(x) {
                None => return Err(CoreError::out_of_range("binning input is NaN")),
                Some(idx) if idx >= 0 && (idx as usize) < n => &b.content[idx as usize],
                Some(idx) => flow_target(&b.flow, &b.content, idx, n)?,
            };
            eval_content(target, correction, bindings)
        }
        Content::MultiBinning(m) => eval_multibinning(m, correction, bindings),
        Content::Category(c) => eval_category(c, correction, bindings),
        Content::Formula(f) => eval_formula(f, bindings),
        Content::FormulaRef(r) => eval_formula_ref(r, correction, bindings),
        Content::Transform(t) => eval_transform(t, correction, bindings),
        Content::HashPrng(h) => Ok(eval_hashprng(h, bindings)),
        Content::Switch(s) => eval_switch(s, correction, bindings),
    }
}

/// Resolves the content node a flow policy selects for an out-of-range bin
/// index. `Flow::Error` raises; `Flow::Content` evaluates its own
/// subtree directly; `Clamp`/`Wrap` index back into the sibling `content`.
fn flow_target<'a>(
    flow: &'a Flow,
    content: &'a [Content],
    idx: isize,
    n: usize,
) -> Result<&'a Content, CoreError> {
    match flow {
        Flow::Error => Err(CoreError::out_of_range(format!(
            "bin index {idx} out of range [0, {n})"
        ))),
        Flow::Clamp => Ok(&content[idx.clamp(0, n as isize - 1) as usize]),
        Flow::Wrap => Ok(&content[idx.rem_euclid(n as isize) as usize]),
        Flow::Content(c) => Ok(c),
    }
}

/// Row-major strides for a set of per-axis bin counts, for folding a
/// per-axis index tuple into one flat offset into `content`.
fn strides(ns: &[usize]) -> SmallVec<[usize; 4]> {
    let mut out: SmallVec<[usize; 4]> = SmallVec::from_elem(1, ns.len());
    for i in (0..ns.len().saturating_sub(1)).rev() {
        out[i] = out[i + 1] * ns[i + 1];
    }
    out
}

fn eval_multibinning(
    m: &MultiBinning,
    correction: &Correction,
    bindings: &mut [Argument],
) -> Result<f64, CoreError> {
    let ns: SmallVec<[usize; 4]> = m.edges.iter().map(Edges::nbins).collect();
    let strides = strides(&ns);

    let mut raw: SmallVec<[isize; 4]> = SmallVec::with_capacity(m.inputs.len());
    for (&slot, edges) in m.inputs.iter().zip(&m.edges) {
        let x = bound_real(bindings, slot)?;
        match edges.locate(x) {
            None => return Err(CoreError::out_of_range("multibinning input is NaN")),
            Some(idx) => raw.push(idx),
        }
    }

    let all_in_range = raw
        .iter()
        .zip(&ns)
        .all(|(&idx, &n)| idx >= 0 && (idx as usize) < n);

    let flat = if all_in_range {
        raw.iter()
            .zip(&strides)
            .map(|(&idx, &s)| idx as usize * s)
            .sum::<usize>()
    } else {
        match &m.flow {
            Flow::Error => {
                return Err(CoreError::out_of_range(
                    "multibinning index out of range on at least one axis",
                ));
            }
            Flow::Content(c) => return eval_content(c, correction, bindings),
            Flow::Clamp => raw
                .iter()
                .zip(&ns)
                .zip(&strides)
                .map(|((&idx, &n), &s)| idx.clamp(0, n as isize - 1) as usize * s)
                .sum::<usize>(),
            Flow::Wrap => raw
                .iter()
                .zip(&ns)
                .zip(&strides)
                .map(|((&idx, &n), &s)| idx.rem_euclid(n as isize) as usize * s)
                .sum::<usize>(),
        }
    };

    eval_content(&m.content[flat], correction, bindings)
}

fn eval_category(
    c: &Category,
    correction: &Correction,
    bindings: &mut [Argument],
) -> Result<f64, CoreError> {
    let key_arg = bindings[c.input].clone();
    let found: Option<&Content> = match (&c.keys, &key_arg) {
        (CategoryKeys::Int(entries), Argument::Int(k)) => {
            entries.iter().find(|(key, _)| key == k).map(|(_, v)| v)
        }
        (CategoryKeys::Str { entries, index }, Argument::String(k)) => {
            index.get(k.as_str()).map(|&i| &entries[i].1)
        }
        _ => {
            return Err(CoreError::wrong_type(
                c.input,
                "category key type",
                &key_arg.value_type().to_string(),
            ));
        }
    };
    match found.or(c.default.as_deref()) {
        Some(node) => eval_content(node, correction, bindings),
        None => Err(CoreError::out_of_range(format!(
            "no category entry for '{key_arg}' and no default"
        ))),
    }
}

fn eval_transform(
    t: &Transform,
    correction: &Correction,
    bindings: &mut [Argument],
) -> Result<f64, CoreError> {
    let rule_value = eval_content(&t.rule, correction, bindings)?;
    let declared = correction.inputs[t.input].value_type;
    let new_binding = match declared {
        correctionlib_common::ValueType::Int => Argument::Int(rule_value.trunc() as i64),
        correctionlib_common::ValueType::Real => Argument::Real(rule_value),
        correctionlib_common::ValueType::String => {
            return Err(CoreError::new(
                ErrorKind::InvariantError,
                "transform target input must be int or real",
            ));
        }
    };
    let previous = std::mem::replace(&mut bindings[t.input], new_binding);
    let result = eval_content(&t.content, correction, bindings);
    bindings[t.input] = previous;
    result
}

fn eval_formula(f: &FormulaNode, bindings: &[Argument]) -> Result<f64, CoreError> {
    let mut vars: SmallVec<[f64; 4]> = SmallVec::with_capacity(f.var_slots.len());
    for &slot in &f.var_slots {
        vars.push(bound_real(bindings, slot)?);
    }
    correctionlib_formula::eval(&f.program, &vars, &f.parameters)
}

fn eval_formula_ref(
    r: &FormulaRefNode,
    correction: &Correction,
    bindings: &[Argument],
) -> Result<f64, CoreError> {
    let generic = correction.generic_formulas.get(r.index).ok_or_else(|| {
        CoreError::reference(format!("generic_formulas[{}] does not exist", r.index))
    })?;
    let mut vars: SmallVec<[f64; 4]> = SmallVec::with_capacity(generic.var_slots.len());
    for &slot in &generic.var_slots {
        vars.push(bound_real(bindings, slot)?);
    }
    correctionlib_formula::eval(&generic.program, &vars, &r.parameters)
}

fn eval_hashprng(h: &HashPrngNode, bindings: &[Argument]) -> f64 {
    let refs: SmallVec<[&Argument; 4]> = h.inputs.iter().map(|&slot| &bindings[slot]).collect();
    hashprng::draw(&refs, h.distribution)
}

fn eval_switch(
    s: &Switch,
    correction: &Correction,
    bindings: &mut [Argument],
) -> Result<f64, CoreError> {
    for Comparison {
        variable,
        op,
        value,
        content,
    } in &s.selections
    {
        let x = bound_real(bindings, *variable)?;
        if op.apply(x, *value) {
            return eval_content(content, correction, bindings);
        }
    }
    eval_content(&s.default, correction, bindings)
}
