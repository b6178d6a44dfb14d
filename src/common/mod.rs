//! Contains datastructures and utility functions common
//! to every stage of the compiler.
//!
//! - Source code representation and span annotations.
//! - The compile-time error model.

pub mod error;
pub mod source;
pub mod span;

pub use error::{Error, ErrorKind, Result};
pub use source::Source;
pub use span::{Span, Spanned};
