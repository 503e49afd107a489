// SPDX-License-Identifier: MIT

//! Evaluation context for policy expressions
//!
//! This module provides:
//! - `Value` - runtime values bound into and produced by expressions
//! - `Context` - the named variables an expression can read

mod store;
mod value;

pub use store::{validate_name, Context};
pub use value::Value;
