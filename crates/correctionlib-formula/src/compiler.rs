//! Lowers a parsed [`Ast`] into a flat postfix program and evaluates it.
//!
//! The stack-machine shape mirrors how the tokenizer/parser/AST stages are
//! kept separate from execution elsewhere in this crate: compiling once and
//! evaluating the opcode list many times avoids re-walking the tree per row
//! in the batch evaluator.

use smallvec::SmallVec;

use correctionlib_common::{CoreError, ErrorKind};

use crate::ast::{Ast, BinOp, BuiltinFn, UnOp};

/// One step of a compiled formula program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    PushLit(f64),
    PushVar(usize),
    /// Parameter index, plus the declared parameter count known at compile
    /// time if any (`None` for `generic_formulas`, checked against the
    /// actual slice length at [`eval`] time instead).
    PushParam(usize),
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Call1(BuiltinFn),
    Call2(BuiltinFn),
}

/// A compiled TFormula expression, ready to evaluate against a row of
/// variable and parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaProgram {
    ops: Vec<Op>,
}

impl FormulaProgram {
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }
}

/// Lowers an [`Ast`] to postfix form.
pub fn compile(ast: &Ast) -> FormulaProgram {
    let mut ops = Vec::new();
    lower(ast, &mut ops);
    FormulaProgram { ops }
}

fn lower(ast: &Ast, ops: &mut Vec<Op>) {
    match ast {
        Ast::Literal(v) => ops.push(Op::PushLit(*v)),
        Ast::Variable(i) => ops.push(Op::PushVar(*i)),
        Ast::Parameter(i) => ops.push(Op::PushParam(*i)),
        Ast::Unary(UnOp::Neg, inner) => {
            lower(inner, ops);
            ops.push(Op::Neg);
        }
        Ast::Binary(op, lhs, rhs) => {
            lower(lhs, ops);
            lower(rhs, ops);
            ops.push(match op {
                BinOp::Add => Op::Add,
                BinOp::Sub => Op::Sub,
                BinOp::Mul => Op::Mul,
                BinOp::Div => Op::Div,
                BinOp::Pow => Op::Pow,
                BinOp::Lt => Op::Lt,
                BinOp::Le => Op::Le,
                BinOp::Gt => Op::Gt,
                BinOp::Ge => Op::Ge,
                BinOp::Eq => Op::Eq,
                BinOp::Ne => Op::Ne,
                BinOp::And => Op::And,
                BinOp::Or => Op::Or,
            });
        }
        Ast::Call(func, args) => {
            for a in args {
                lower(a, ops);
            }
            ops.push(if func.arity() == 1 {
                Op::Call1(*func)
            } else {
                Op::Call2(*func)
            });
        }
    }
}

/// Evaluates a compiled program against a row of variable values and a
/// parameter slice.
///
/// Division by zero and other IEEE edge cases propagate as `±inf`/`NaN`
/// rather than erroring; the only evaluation-time failure this
/// function raises is an out-of-range parameter index that could not be
/// bounds-checked at parse time (`generic_formulas`, see [`crate::parser`]).
pub fn eval(program: &FormulaProgram, vars: &[f64], params: &[f64]) -> Result<f64, CoreError> {
    let mut stack: SmallVec<[f64; 16]> = SmallVec::new();

    for op in program.ops() {
        match *op {
            Op::PushLit(v) => stack.push(v),
            Op::PushVar(i) => stack.push(vars[i]),
            Op::PushParam(i) => {
                let v = params.get(i).copied().ok_or_else(|| {
                    CoreError::new(
                        ErrorKind::FormulaEvalError,
                        format!("parameter index {i} out of range (only {} supplied)", params.len()),
                    )
                })?;
                stack.push(v);
            }
            Op::Neg => {
                let a = stack.pop().expect("stack underflow: Neg");
                stack.push(-a);
            }
            Op::Add => binop(&mut stack, |a, b| a + b),
            Op::Sub => binop(&mut stack, |a, b| a - b),
            Op::Mul => binop(&mut stack, |a, b| a * b),
            Op::Div => binop(&mut stack, |a, b| a / b),
            Op::Pow => binop(&mut stack, f64::powf),
            Op::Lt => binop(&mut stack, |a, b| bool_f64(a < b)),
            Op::Le => binop(&mut stack, |a, b| bool_f64(a <= b)),
            Op::Gt => binop(&mut stack, |a, b| bool_f64(a > b)),
            Op::Ge => binop(&mut stack, |a, b| bool_f64(a >= b)),
            Op::Eq => binop(&mut stack, |a, b| bool_f64(a == b)),
            Op::Ne => binop(&mut stack, |a, b| bool_f64(a != b)),
            Op::And => binop(&mut stack, |a, b| bool_f64(a != 0.0 && b != 0.0)),
            Op::Or => binop(&mut stack, |a, b| bool_f64(a != 0.0 || b != 0.0)),
            Op::Call1(func) => {
                let a = stack.pop().expect("stack underflow: Call1");
                stack.push(call1(func, a));
            }
            Op::Call2(func) => {
                let b = stack.pop().expect("stack underflow: Call2 (rhs)");
                let a = stack.pop().expect("stack underflow: Call2 (lhs)");
                stack.push(call2(func, a, b));
            }
        }
    }

    Ok(stack.pop().expect("empty formula program"))
}

fn binop(stack: &mut SmallVec<[f64; 16]>, f: impl Fn(f64, f64) -> f64) {
    let b = stack.pop().expect("stack underflow: binop (rhs)");
    let a = stack.pop().expect("stack underflow: binop (lhs)");
    stack.push(f(a, b));
}

fn bool_f64(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn call1(func: BuiltinFn, a: f64) -> f64 {
    match func {
        BuiltinFn::Log => a.ln(),
        BuiltinFn::Log10 => a.log10(),
        BuiltinFn::Exp => a.exp(),
        BuiltinFn::Sqrt => a.sqrt(),
        BuiltinFn::Abs => a.abs(),
        BuiltinFn::Erf => erf(a),
        BuiltinFn::Cos => a.cos(),
        BuiltinFn::Sin => a.sin(),
        BuiltinFn::Tan => a.tan(),
        BuiltinFn::Acos => a.acos(),
        BuiltinFn::Asin => a.asin(),
        BuiltinFn::Atan => a.atan(),
        BuiltinFn::Cosh => a.cosh(),
        BuiltinFn::Sinh => a.sinh(),
        BuiltinFn::Tanh => a.tanh(),
        BuiltinFn::Acosh => a.acosh(),
        BuiltinFn::Asinh => a.asinh(),
        BuiltinFn::Atanh => a.atanh(),
        BuiltinFn::Pow | BuiltinFn::Atan2 | BuiltinFn::Max | BuiltinFn::Min => {
            unreachable!("binary function dispatched as Call1")
        }
    }
}

fn call2(func: BuiltinFn, a: f64, b: f64) -> f64 {
    match func {
        BuiltinFn::Pow => a.powf(b),
        BuiltinFn::Atan2 => a.atan2(b),
        BuiltinFn::Max => a.max(b),
        BuiltinFn::Min => a.min(b),
        _ => unreachable!("unary function dispatched as Call2"),
    }
}

/// Abramowitz & Stegun 7.1.26, with the usual sign split for negative
/// arguments. Good to about 1.5e-7 absolute error, which is the formula
/// dialect's working precision.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseContext, parse};

    fn compile_str(src: &str, num_variables: usize, num_parameters: Option<usize>) -> FormulaProgram {
        let ast = parse(
            src,
            ParseContext {
                num_variables,
                num_parameters,
            },
        )
        .unwrap();
        compile(&ast)
    }

    #[test]
    fn linear_with_parameter() {
        let prog = compile_str("0.25*x + exp([0])", 1, Some(1));
        let y = eval(&prog, &[31.0], &[3.1]).unwrap();
        assert!((y - (0.25 * 31.0 + 3.1f64.exp())).abs() < 1e-9);
    }

    #[test]
    fn power_right_associative_and_unary_minus() {
        let prog = compile_str("-x^2", 1, Some(0));
        let y = eval(&prog, &[3.0], &[]).unwrap();
        assert_eq!(y, -9.0);

        let prog = compile_str("2^3^2", 1, Some(0));
        let y = eval(&prog, &[0.0], &[]).unwrap();
        assert_eq!(y, 512.0); // 2^(3^2), not (2^3)^2
    }

    #[test]
    fn comparisons_yield_zero_or_one() {
        let prog = compile_str("x > 1", 1, Some(0));
        assert_eq!(eval(&prog, &[2.0], &[]).unwrap(), 1.0);
        assert_eq!(eval(&prog, &[0.0], &[]).unwrap(), 0.0);
    }

    #[test]
    fn logical_operators() {
        let prog = compile_str("(x > 0) && (y > 0)", 2, Some(0));
        assert_eq!(eval(&prog, &[1.0, 1.0], &[]).unwrap(), 1.0);
        assert_eq!(eval(&prog, &[1.0, -1.0], &[]).unwrap(), 0.0);

        let prog = compile_str("(x > 0) || (y > 0)", 2, Some(0));
        assert_eq!(eval(&prog, &[-1.0, 1.0], &[]).unwrap(), 1.0);
    }

    #[test]
    fn division_by_zero_is_infinite_not_an_error() {
        let prog = compile_str("1/x", 1, Some(0));
        let y = eval(&prog, &[0.0], &[]).unwrap();
        assert!(y.is_infinite());
    }

    #[test]
    fn deferred_parameter_bound_checked_at_eval_time() {
        let prog = compile_str("[2]", 0, None);
        let err = eval(&prog, &[], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FormulaEvalError);
    }

    #[test]
    fn binary_function_call() {
        let prog = compile_str("max(x, y)", 2, Some(0));
        assert_eq!(eval(&prog, &[1.0, 5.0], &[]).unwrap(), 5.0);
    }

    #[test]
    fn indexed_variable_access() {
        let prog = compile_str("x[0] + x[1]", 2, Some(0));
        assert_eq!(eval(&prog, &[2.0, 3.0], &[]).unwrap(), 5.0);
    }
}
