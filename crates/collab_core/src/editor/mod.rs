//! Rich-text editing core.
//!
//! # Responsibility
//! - `document`: text-run model and markup conversion.
//! - `ops`: pure editing operations used by the default primitives.
//! - `surface`: stateful surface with command routing, value sync and undo.
//!
//! # See also
//! - `crate::markup` for the shared tag subset.

pub mod document;
pub mod ops;
pub mod surface;
