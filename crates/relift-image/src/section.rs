//! Loaded sections.

/// Section is readable.
pub const SEC_READ: u32 = 1 << 0;
/// Section is writable.
pub const SEC_WRITE: u32 = 1 << 1;
/// Section is executable.
pub const SEC_EXEC: u32 = 1 << 2;

/// A section mapped into the image.
///
/// `virtual_address` is relative to the image base. The `data` field holds
/// only the initialized bytes; anything between `data.len()` and
/// `virtual_size` reads as zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub virtual_address: u64,
    pub virtual_size: u64,
    pub flags: u32,
    pub data: Vec<u8>,
}

impl Section {
    pub fn new(name: &str, virtual_address: u64, virtual_size: u64, flags: u32) -> Self {
        Self {
            name: name.to_string(),
            virtual_address,
            virtual_size,
            flags,
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Relative end address (exclusive).
    pub const fn end(&self) -> u64 {
        self.virtual_address.saturating_add(self.virtual_size)
    }

    /// Check if the relative address falls inside this section.
    pub const fn contains(&self, rva: u64) -> bool {
        rva >= self.virtual_address && rva < self.end()
    }

    /// Check if section is read-only (no write flag).
    pub const fn is_readonly(&self) -> bool {
        (self.flags & SEC_WRITE) == 0
    }

    /// Check if section is executable.
    pub const fn is_executable(&self) -> bool {
        (self.flags & SEC_EXEC) != 0
    }

    /// Byte at a relative address, zero past the initialized data.
    pub fn byte_at(&self, rva: u64) -> Option<u8> {
        if !self.contains(rva) {
            return None;
        }
        let offset = usize::try_from(rva - self.virtual_address).ok()?;
        Some(self.data.get(offset).copied().unwrap_or(0))
    }
}
