//! Optimization pipeline for freshly lifted relift IR.
//!
//! A lifted module is full of pseudo-stack and pseudo-memory traffic. The
//! pipeline is described declaratively by [`build_schedule`], instantiated into
//! pass objects, and run by [`run_to_fixpoint`] until the module stops
//! shrinking or [`MAX_ITERATIONS`] rounds have run.
//!
//! ```ignore
//! let params = ScheduleParams::new(stack, memory);
//! let report = Optimizer::new().optimize(&mut module, &params, &image);
//! ```

pub mod analysis;
mod pass;
pub mod passes;
mod runner;
mod schedule;

pub use pass::*;
pub use runner::*;
pub use schedule::*;
