//! Docker Runtime Module
//!
//! Docker implementation of the RuntimeAdapter trait.

pub mod adapter;

pub use adapter::DockerAdapter;
