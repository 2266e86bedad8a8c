//! Core traits for cutlist providers and collaborators.

mod collaborators;
mod extractor;

pub use collaborators::*;
pub use extractor::*;
