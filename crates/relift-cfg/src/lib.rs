//! Control flow discovery for the relift binary lifter.
//!
//! The [`BranchResolver`] classifies computed jump and call destinations as
//! solved, unsolved, or ambiguous between a bounded number of candidates,
//! validates candidate addresses against the loaded image, and schedules
//! newly discovered addresses through a [`BlockRegistry`].

mod metrics;
mod oracle;
mod range;
mod registry;
mod resolver;
mod value;

pub use metrics::*;
pub use oracle::*;
pub use range::*;
pub use registry::*;
pub use resolver::*;
pub use value::*;
