//! Loaded-image layout for the relift binary lifter.
//!
//! Describes where the sections of a PE or ELF object land in memory and
//! serves little-endian reads from their initialized bytes.

mod layout;
mod load;
mod section;

pub use layout::*;
pub use section::*;

use thiserror::Error;

/// Image loading errors.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("object parse error: {0}")]
    Parse(#[from] goblin::error::Error),
    #[error("unsupported object format: {0}")]
    UnsupportedFormat(&'static str),
    #[error("section {name} data out of bounds (offset 0x{offset:x}, size 0x{size:x})")]
    SectionOutOfBounds { name: String, offset: u64, size: u64 },
    #[error("virtual address overflow in section {0}")]
    VirtualAddressOverflow(String),
    #[error("no loadable sections found")]
    NoLoadableSections,
}

pub type Result<T> = std::result::Result<T, ImageError>;
