//! Runtime module
//!
//! Container runtime access used to report the health of the compose stack.

pub mod adapter;
pub mod docker;
pub mod probe;
