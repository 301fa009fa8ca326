//! The in-memory correction tree: a tagged-union `Content`
//! node per kind, built once by the loader and walked read-only by the
//! evaluator. Every node that names an input stores the input's resolved
//! *slot index* into the owning [`crate::correction::Correction`]'s
//! `inputs` vector, not its name — name resolution is entirely the
//! loader's job.

use rustc_hash::FxHashMap;

use correctionlib_formula::FormulaProgram;

/// A node in the correction tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Constant(f64),
    Binning(Binning),
    MultiBinning(MultiBinning),
    Category(Category),
    Formula(FormulaNode),
    FormulaRef(FormulaRefNode),
    Transform(Transform),
    HashPrng(HashPrngNode),
    Switch(Switch),
}

/// A bin edge list for one axis, already resolved from JSON (uniform
/// objects or non-uniform lists with `"inf"`/`"+inf"`/`"-inf"` literals
/// resolved to `f64::INFINITY`/`NEG_INFINITY`).
#[derive(Debug, Clone, PartialEq)]
pub enum Edges {
    Uniform { n: usize, low: f64, high: f64 },
    NonUniform(Vec<f64>),
}

impl Edges {
    pub fn nbins(&self) -> usize {
        match self {
            Edges::Uniform { n, .. } => *n,
            Edges::NonUniform(v) => v.len() - 1,
        }
    }

    /// Locates `x` among the edges. Returns the in-range bin index, or the
    /// signed would-be index (negative below the first edge, `>= nbins`
    /// above the last) for the flow policy to interpret, or `None` for NaN.
    pub fn locate(&self, x: f64) -> Option<isize> {
        if x.is_nan() {
            return None;
        }
        Some(match self {
            Edges::Uniform { n, low, high } => {
                let frac = (x - low) / (high - low) * (*n as f64);
                frac.floor() as isize
            }
            Edges::NonUniform(edges) => {
                let count = edges.partition_point(|&e| e <= x);
                count as isize - 1
            }
        })
    }
}

/// Out-of-range policy for a Binning/MultiBinning node.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Clamp,
    Error,
    Wrap,
    Content(Box<Content>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binning {
    pub input: usize,
    pub edges: Edges,
    pub content: Vec<Content>,
    pub flow: Flow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiBinning {
    pub inputs: Vec<usize>,
    pub edges: Vec<Edges>,
    /// C-ordered (row-major, last axis fastest) over the per-axis bin
    /// counts; length is the product of all `edges[*].nbins()`.
    pub content: Vec<Content>,
    pub flow: Flow,
}

/// The category key set, homogeneous by construction (all-int or all-string).
/// String keys additionally carry a hash index as a lookup optimisation.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryKeys {
    Int(Vec<(i64, Content)>),
    Str {
        entries: Vec<(String, Content)>,
        index: FxHashMap<String, usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub input: usize,
    pub keys: CategoryKeys,
    pub default: Option<Box<Content>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub input: usize,
    pub rule: Box<Content>,
    pub content: Box<Content>,
}

/// A `Formula` node whose expression has already been parsed and compiled.
/// `var_slots[i]` gives the enclosing Correction's current-inputs slot bound
/// to the formula's local variable `i` (`x`/`y`/`z`/`t`/`x[i]`, resolved
/// positionally by the loader).
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaNode {
    pub program: FormulaProgram,
    pub var_slots: Vec<usize>,
    pub parameters: Vec<f64>,
}

/// A compiled `generic_formulas` entry, shared by every `FormulaRef` that
/// points at it; only the parameter values vary per reference.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericFormula {
    pub program: FormulaProgram,
    pub var_slots: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormulaRefNode {
    pub index: usize,
    pub parameters: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    StdFlat,
    Normal,
    /// Deprecated alias for `Normal`.
    StdNormal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashPrngNode {
    pub inputs: Vec<usize>,
    pub distribution: Distribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub variable: usize,
    pub op: CmpOp,
    pub value: f64,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub selections: Vec<Comparison>,
    pub default: Box<Content>,
}
