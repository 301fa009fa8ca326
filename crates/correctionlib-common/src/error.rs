//! The error taxonomy surfaced by the loader and the evaluators.
//!
//! - **`ErrorKind`**   : the canonical set of failure categories.
//! - **`PathSegment`** : a single step of a JSON path, for loader errors.
//! - **`CoreError`**   : one struct that glues kind, message and path together.
//!
//! Construction errors are raised once at load time; evaluation errors are
//! raised at the call site and never poison the evaluator that raised them.

use std::fmt;

/// All recognised failure categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// JSON does not conform to the structural schema.
    SchemaError,
    /// A node names an input/formula index that does not exist.
    ReferenceError,
    /// Monotonicity, length, uniqueness, or homogeneity violated.
    InvariantError,
    /// TFormula expression rejected at parse time.
    FormulaParseError,
    /// `evaluate` called with the wrong number of arguments.
    WrongArity,
    /// `evaluate` called with an argument of the wrong type.
    WrongType,
    /// Binning out of range with `flow="error"`, or unmatched category
    /// with no default.
    OutOfRange,
    /// An undefined parameter index reached at evaluation time.
    FormulaEvalError,
    /// Batch columns of incompatible length.
    ShapeMismatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SchemaError => "SCHEMA_ERROR",
            Self::ReferenceError => "REFERENCE_ERROR",
            Self::InvariantError => "INVARIANT_ERROR",
            Self::FormulaParseError => "FORMULA_PARSE_ERROR",
            Self::WrongArity => "WRONG_ARITY",
            Self::WrongType => "WRONG_TYPE",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::FormulaEvalError => "FORMULA_EVAL_ERROR",
            Self::ShapeMismatch => "SHAPE_MISMATCH",
        })
    }
}

/// A single step of a JSON path (e.g. `corrections[2]` or `.data`), used to
/// pinpoint where in a document a load error occurred.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(&'static str),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, ".{name}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

fn render_path(path: &[PathSegment]) -> String {
    let mut s = String::from("$");
    for seg in path {
        s.push_str(&seg.to_string());
    }
    s
}

/// The single error type passed around by the loader and evaluators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub path: Vec<PathSegment>,
}

impl CoreError {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
            path: Vec::new(),
        }
    }

    /// Attach (or replace) the JSON path at which this error occurred.
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// Push one more segment onto the front of the path as the error
    /// unwinds back up the recursive descent (innermost segment pushed
    /// first, so callers prepend their own frame).
    pub fn prepend(mut self, seg: PathSegment) -> Self {
        self.path.insert(0, seg);
        self
    }

    pub fn schema<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::SchemaError, message)
    }

    pub fn reference<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::ReferenceError, message)
    }

    pub fn invariant<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::InvariantError, message)
    }

    pub fn out_of_range<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::OutOfRange, message)
    }

    pub fn wrong_arity(expected: usize, actual: usize) -> Self {
        Self::new(
            ErrorKind::WrongArity,
            format!("expected {expected} argument(s), got {actual}"),
        )
    }

    pub fn wrong_type(index: usize, expected: &str, actual: &str) -> Self {
        Self::new(
            ErrorKind::WrongType,
            format!("argument {index}: expected {expected}, got {actual}"),
        )
    }

    pub fn shape_mismatch<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::ShapeMismatch, message)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if !self.path.is_empty() {
            write!(f, " (at {})", render_path(&self.path))?;
        }
        Ok(())
    }
}

impl std::error::Error for CoreError {}
