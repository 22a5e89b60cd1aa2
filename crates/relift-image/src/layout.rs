//! Image layout: base address plus sections.

use crate::section::Section;

/// Where a binary's sections are mapped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageLayout {
    pub image_base: u64,
    pub sections: Vec<Section>,
}

impl ImageLayout {
    pub const fn new(image_base: u64) -> Self {
        Self {
            image_base,
            sections: Vec::new(),
        }
    }

    /// Single read-execute section holding `code` at `base` (not an actual object file).
    pub fn from_code(base: u64, code: Vec<u8>) -> Self {
        let size = code.len() as u64;
        Self::new(base).with_section(
            Section::new(
                ".text",
                0,
                size,
                crate::section::SEC_READ | crate::section::SEC_EXEC,
            )
            .with_data(code),
        )
    }

    #[must_use]
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Section covering absolute address `address`.
    pub fn section_containing(&self, address: u64) -> Option<&Section> {
        let rva = address.checked_sub(self.image_base)?;
        self.sections.iter().find(|s| s.contains(rva))
    }

    pub fn is_mapped(&self, address: u64) -> bool {
        self.section_containing(address).is_some()
    }

    pub fn is_readonly(&self, address: u64) -> bool {
        self.section_containing(address)
            .is_some_and(Section::is_readonly)
    }

    /// Little-endian read of `width` bytes (1..=8). Every byte must be mapped.
    pub fn read(&self, address: u64, width: u32) -> Option<u64> {
        if width == 0 || width > 8 {
            return None;
        }
        let mut value = 0u64;
        for i in 0..u64::from(width) {
            let addr = address.checked_add(i)?;
            let section = self.section_containing(addr)?;
            let byte = section.byte_at(addr - self.image_base)?;
            value |= u64::from(byte) << (8 * i);
        }
        Some(value)
    }

    /// Like [`read`](Self::read), but only from sections without the write flag.
    pub fn read_readonly(&self, address: u64, width: u32) -> Option<u64> {
        let last = address.checked_add(u64::from(width.max(1)) - 1)?;
        if self.is_readonly(address) && self.is_readonly(last) {
            self.read(address, width)
        } else {
            None
        }
    }
}
