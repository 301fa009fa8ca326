//! Meta crate that re-exports the primary correctionlib building blocks with
//! sensible defaults. Downstream users can depend on this crate and opt into
//! specific layers via feature flags while keeping access to the underlying
//! crates when deeper integration is required.

#[cfg(feature = "common")]
pub use correctionlib_common as common;

#[cfg(feature = "formula")]
pub use correctionlib_formula as formula;

#[cfg(feature = "core")]
pub use correctionlib_core as core;

#[cfg(feature = "common")]
pub use correctionlib_common::{Argument, CoreError, ErrorKind, PathSegment, ValueType, Variable};

#[cfg(feature = "core")]
pub use correctionlib_core::{
    BatchInput, Content, Correction, CorrectionSet, LoaderOptions, evaluate, evalv, load, merge,
};
