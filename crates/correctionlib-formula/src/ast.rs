use std::fmt;

/// Binary operators, already resolved to a fixed opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
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
}

/// The fixed set of callable functions. `Pow`/`Atan2`/`Max`/`Min`
/// are binary; the rest are unary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFn {
    Log,
    Log10,
    Exp,
    Sqrt,
    Abs,
    Erf,
    Cos,
    Sin,
    Tan,
    Acos,
    Asin,
    Atan,
    Cosh,
    Sinh,
    Tanh,
    Acosh,
    Asinh,
    Atanh,
    Pow,
    Atan2,
    Max,
    Min,
}

impl BuiltinFn {
    /// Looks up a function by its TFormula identifier (case-sensitive,
    /// lowercase, a fixed vocabulary — `TMath::*` and other vendor-prefixed
    /// names are deliberately not recognised here).
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "log" => BuiltinFn::Log,
            "log10" => BuiltinFn::Log10,
            "exp" => BuiltinFn::Exp,
            "sqrt" => BuiltinFn::Sqrt,
            "abs" => BuiltinFn::Abs,
            "erf" => BuiltinFn::Erf,
            "cos" => BuiltinFn::Cos,
            "sin" => BuiltinFn::Sin,
            "tan" => BuiltinFn::Tan,
            "acos" => BuiltinFn::Acos,
            "asin" => BuiltinFn::Asin,
            "atan" => BuiltinFn::Atan,
            "cosh" => BuiltinFn::Cosh,
            "sinh" => BuiltinFn::Sinh,
            "tanh" => BuiltinFn::Tanh,
            "acosh" => BuiltinFn::Acosh,
            "asinh" => BuiltinFn::Asinh,
            "atanh" => BuiltinFn::Atanh,
            "pow" => BuiltinFn::Pow,
            "atan2" => BuiltinFn::Atan2,
            "max" => BuiltinFn::Max,
            "min" => BuiltinFn::Min,
            _ => return None,
        })
    }

    /// Fixed arity of this function: every builtin in the dialect takes
    /// exactly one or two arguments (no varargs).
    pub fn arity(self) -> usize {
        match self {
            BuiltinFn::Pow | BuiltinFn::Atan2 | BuiltinFn::Max | BuiltinFn::Min => 2,
            _ => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinFn::Log => "log",
            BuiltinFn::Log10 => "log10",
            BuiltinFn::Exp => "exp",
            BuiltinFn::Sqrt => "sqrt",
            BuiltinFn::Abs => "abs",
            BuiltinFn::Erf => "erf",
            BuiltinFn::Cos => "cos",
            BuiltinFn::Sin => "sin",
            BuiltinFn::Tan => "tan",
            BuiltinFn::Acos => "acos",
            BuiltinFn::Asin => "asin",
            BuiltinFn::Atan => "atan",
            BuiltinFn::Cosh => "cosh",
            BuiltinFn::Sinh => "sinh",
            BuiltinFn::Tanh => "tanh",
            BuiltinFn::Acosh => "acosh",
            BuiltinFn::Asinh => "asinh",
            BuiltinFn::Atanh => "atanh",
            BuiltinFn::Pow => "pow",
            BuiltinFn::Atan2 => "atan2",
            BuiltinFn::Max => "max",
            BuiltinFn::Min => "min",
        }
    }
}

/// The formula AST. `Variable(i)` indexes into the enclosing
/// Formula node's `variables` list (already resolved positionally, not by
/// name) and `Parameter(i)` indexes into its `parameters` list.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Literal(f64),
    Variable(usize),
    Parameter(usize),
    Unary(UnOp, Box<Ast>),
    Binary(BinOp, Box<Ast>, Box<Ast>),
    Call(BuiltinFn, Vec<Ast>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::Literal(v) => write!(f, "{v}"),
            Ast::Variable(i) => write!(f, "var[{i}]"),
            Ast::Parameter(i) => write!(f, "[{i}]"),
            Ast::Unary(UnOp::Neg, e) => write!(f, "(-{e})"),
            Ast::Binary(op, l, r) => write!(f, "({l} {op:?} {r})"),
            Ast::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (idx, a) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}
