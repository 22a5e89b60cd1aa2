//! IR transformation passes.
//!
//! Generic cleanups run per function through a [`crate::FunctionAdaptor`];
//! the lifter-specific canonicalizations and the module finalizers are
//! [`crate::ModulePass`]es.

mod adce;
mod dce;
mod early_cse;
mod gep_load;
mod global_dce;
mod gvn;
mod instcombine;
mod mem2reg;
mod pseudo_memory;
mod pseudo_stack;
mod simplify_cfg;
mod strip_prototypes;
mod trunc_load;
mod util;

pub use adce::Adce;
pub use dce::Dce;
pub use early_cse::EarlyCse;
pub use gep_load::GepLoad;
pub use global_dce::GlobalDce;
pub use gvn::Gvn;
pub use instcombine::InstCombine;
pub use mem2reg::{Mem2Reg, promote_allocas};
pub use pseudo_memory::PromotePseudoMemory;
pub use pseudo_stack::PromotePseudoStack;
pub use simplify_cfg::SimplifyCfg;
pub use strip_prototypes::StripDeadPrototypes;
pub use trunc_load::ReplaceTruncWithLoad;
