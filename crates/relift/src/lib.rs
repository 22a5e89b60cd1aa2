//! relift - binary lifter core
//!
//! Recovers the control flow of machine-code functions into relift IR and
//! cleans the result up. Instruction semantics are supplied by a
//! [`BlockLifter`]; the [`LiftSession`] drives discovery, resolves computed
//! jumps, and runs the optimization pipeline.
//!
//! # Example
//!
//! ```ignore
//! use relift::{ImageLayout, LiftConfig, LiftSession};
//!
//! let image = ImageLayout::parse(&std::fs::read("target.exe")?)?;
//! let mut session = LiftSession::new(image, MyX86Lifter::new())
//!     .with_config(LiftConfig::default().with_max_blocks(10_000));
//! let lifted = session.lift_function("main", 0x1_4000_1000)?;
//! println!("{}", lifted.module);
//! ```

// Re-export from sub-crates
pub use relift_cfg::{
    BlockMap, BlockRegistry, BranchResolver, CounterSnapshot, DiscoveryReason, NoopMetrics,
    Outcome, Resolution, ResolutionCounters, ResolutionEvent, ResolutionMetrics,
};
pub use relift_image::{ImageError, ImageLayout, SEC_EXEC, SEC_READ, SEC_WRITE, Section};
pub use relift_ir::{
    BlockId, FuncId, Function, FunctionBuilder, InstKind, Module, Param, Predicate, Terminator, Ty,
    Value,
};
pub use relift_opt::{MemoryPolicy, OptimizeReport, Optimizer, ScheduleParams};

mod config;
mod error;
mod lifter;
pub mod metrics;
mod session;

pub use config::*;
pub use error::*;
pub use lifter::*;
pub use session::*;
