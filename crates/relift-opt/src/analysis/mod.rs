//! Analyses shared by the passes.

mod dom;

pub use dom::*;
