//! The vector-batch evaluator: applies a correction's scalar
//! evaluation row-wise over broadcast-shaped columns of inputs.

use correctionlib_common::{Argument, CoreError, ErrorKind, PathSegment};

use crate::correction::Correction;
use crate::eval;

/// One column of a batch call: either a scalar replicated over every row,
/// or a dense column of the declared type.
#[derive(Debug, Clone)]
pub enum BatchInput {
    Scalar(Argument),
    Real(Vec<f64>),
    Int(Vec<i64>),
    String(Vec<String>),
}

impl BatchInput {
    fn len(&self) -> Option<usize> {
        match self {
            BatchInput::Scalar(_) => None,
            BatchInput::Real(v) => Some(v.len()),
            BatchInput::Int(v) => Some(v.len()),
            BatchInput::String(v) => Some(v.len()),
        }
    }

    fn row(&self, i: usize) -> Argument {
        match self {
            BatchInput::Scalar(a) => a.clone(),
            BatchInput::Real(v) => Argument::Real(v[i]),
            BatchInput::Int(v) => Argument::Int(v[i]),
            BatchInput::String(v) => Argument::String(v[i].clone()),
        }
    }
}

/// Evaluates `correction` once per row of `cols`, broadcasting any scalar
/// columns to the common column length. All non-scalar columns must share
/// one length; a mismatch is a `SHAPE_MISMATCH`. Row-wise failures abort the
/// whole batch, with the offending row index folded into the error path.
pub fn evalv(correction: &Correction, cols: &[BatchInput]) -> Result<Vec<f64>, CoreError> {
    if cols.len() != correction.inputs.len() {
        return Err(CoreError::wrong_arity(correction.inputs.len(), cols.len()));
    }

    let mut common_len: Option<usize> = None;
    for col in cols {
        if let Some(n) = col.len() {
            match common_len {
                None => common_len = Some(n),
                Some(expected) if expected != n => {
                    return Err(CoreError::shape_mismatch(format!(
                        "batch columns of incompatible length: {expected} vs {n}"
                    )));
                }
                Some(_) => {}
            }
        }
    }
    let len = common_len.unwrap_or(1);

    let mut out = Vec::with_capacity(len);
    let mut row_args = Vec::with_capacity(cols.len());
    for row in 0..len {
        row_args.clear();
        row_args.extend(cols.iter().map(|c| c.row(row)));
        let value = eval::evaluate(correction, &row_args)
            .map_err(|e| e.prepend(PathSegment::Index(row)))?;
        out.push(value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use correctionlib_common::{ErrorKind, ValueType, Variable};
    use crate::content::Content;

    fn constant_correction() -> Correction {
        Correction {
            name: "c".into(),
            version: 1,
            description: None,
            inputs: vec![Variable::new("x", ValueType::Real)],
            output: Variable::new("out", ValueType::Real),
            generic_formulas: Vec::new(),
            data: Content::Constant(2.0),
        }
    }

    #[test]
    fn scalar_broadcast_matches_row_eval() {
        let corr = constant_correction();
        let cols = vec![BatchInput::Real(vec![1.0, 2.0, 3.0])];
        let out = evalv(&corr, &cols).unwrap();
        assert_eq!(out, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn mismatched_lengths_are_shape_mismatch() {
        let corr = Correction {
            inputs: vec![
                Variable::new("x", ValueType::Real),
                Variable::new("y", ValueType::Real),
            ],
            ..constant_correction()
        };
        let cols = vec![
            BatchInput::Real(vec![1.0, 2.0]),
            BatchInput::Real(vec![1.0, 2.0, 3.0]),
        ];
        let err = evalv(&corr, &cols).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeMismatch);
    }
}
