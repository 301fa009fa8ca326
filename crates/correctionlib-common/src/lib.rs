//! Shared argument, variable, and error types used by the correction tree
//! loader ([`correctionlib-core`]) and the formula dialect
//! ([`correctionlib-formula`]).

pub mod error;
pub mod value;
pub mod variable;

pub use error::{CoreError, ErrorKind, PathSegment};
pub use value::{Argument, ValueType};
pub use variable::Variable;
