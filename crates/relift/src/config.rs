//! Lifting configuration.

use relift_opt::{MAX_ITERATIONS, MemoryPolicy};

/// Default bound on blocks lifted for one function.
pub const DEFAULT_MAX_BLOCKS: usize = 4096;

/// Settings for a [`crate::LiftSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiftConfig {
    /// Which image bytes the optimizer may treat as constant.
    pub memory_policy: MemoryPolicy,
    /// Worklist bound. Lifting fails once a function needs more blocks.
    pub max_blocks: usize,
    /// Run the optimization pipeline after discovery.
    pub optimize: bool,
    /// Cap on full runs of the optimization schedule.
    pub max_iterations: usize,
}

impl Default for LiftConfig {
    fn default() -> Self {
        Self {
            memory_policy: MemoryPolicy::default(),
            max_blocks: DEFAULT_MAX_BLOCKS,
            optimize: true,
            max_iterations: MAX_ITERATIONS,
        }
    }
}

impl LiftConfig {
    #[must_use]
    pub const fn with_memory_policy(mut self, policy: MemoryPolicy) -> Self {
        self.memory_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    #[must_use]
    pub const fn with_optimize(mut self, enabled: bool) -> Self {
        self.optimize = enabled;
        self
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LiftConfig::default();
        assert_eq!(config.memory_policy, MemoryPolicy::ReadOnly);
        assert_eq!(config.max_iterations, 3);
        assert!(config.optimize);
    }

    #[test]
    fn test_builders() {
        let config = LiftConfig::default()
            .with_memory_policy(MemoryPolicy::Never)
            .with_max_blocks(8)
            .with_optimize(false);
        assert_eq!(config.memory_policy, MemoryPolicy::Never);
        assert_eq!(config.max_blocks, 8);
        assert!(!config.optimize);
    }
}
