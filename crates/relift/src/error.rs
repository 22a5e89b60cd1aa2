use thiserror::Error;

/// Lifting errors.
#[derive(Error, Debug)]
pub enum LiftError {
    #[error("image error: {0}")]
    Image(#[from] relift_image::ImageError),
    #[error("entry point 0x{0:x} is outside the loaded image")]
    EntryOutsideImage(u64),
    #[error("function {function} needs more than {limit} blocks")]
    BlockLimitExceeded { function: String, limit: usize },
    #[error("cannot lift instruction at 0x{address:x}: {message}")]
    Semantics { address: u64, message: String },
}

impl LiftError {
    /// Failure reported by instruction semantics.
    pub fn semantics(address: u64, message: impl Into<String>) -> Self {
        Self::Semantics {
            address,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LiftError>;
