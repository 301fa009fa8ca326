//! The correction tree: loading, evaluating, and batch-evaluating JSON-defined
//! lookup/binning/category/formula/transform/PRNG/switch correction trees,
//! plus named `CorrectionSet` lookup and compound corrections.

pub mod batch;
pub mod content;
pub mod correction;
pub mod correctionset;
pub mod eval;
pub mod hashprng;
pub mod loader;

pub use batch::{BatchInput, evalv};
pub use content::{
    Binning, Category, CategoryKeys, CmpOp, Comparison, Content, Distribution, Edges, Flow,
    FormulaNode, FormulaRefNode, GenericFormula, HashPrngNode, MultiBinning, Switch, Transform,
};
pub use correction::Correction;
pub use correctionset::{
    AccumOp, CompoundCorrection, CorrectionSet, CorrectionSummary, InputSummary,
    InputSummaryKind, OutputOp, SetSummary, merge,
};
pub use eval::evaluate;
pub use loader::{LoaderOptions, load};
