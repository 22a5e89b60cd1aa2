//! Building an [`ImageLayout`] from PE and ELF objects.

use goblin::Object;
use goblin::elf::Elf;
use goblin::elf::section_header::{SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_NOBITS};
use goblin::pe::PE;
use goblin::pe::section_table::{IMAGE_SCN_MEM_EXECUTE, IMAGE_SCN_MEM_READ, IMAGE_SCN_MEM_WRITE};
use tracing::debug;

use crate::layout::ImageLayout;
use crate::section::{SEC_EXEC, SEC_READ, SEC_WRITE, Section};
use crate::{ImageError, Result};

impl ImageLayout {
    /// Parse a PE or ELF object from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let layout = match Object::parse(data)? {
            Object::PE(pe) => Self::from_pe(&pe, data)?,
            Object::Elf(elf) => Self::from_elf(&elf, data)?,
            Object::Mach(_) => return Err(ImageError::UnsupportedFormat("Mach-O")),
            Object::Archive(_) => return Err(ImageError::UnsupportedFormat("archive")),
            _ => return Err(ImageError::UnsupportedFormat("unknown")),
        };

        if layout.sections.is_empty() {
            return Err(ImageError::NoLoadableSections);
        }

        debug!(
            image_base = layout.image_base,
            sections = layout.sections.len(),
            "image layout loaded"
        );
        Ok(layout)
    }

    fn from_pe(pe: &PE<'_>, data: &[u8]) -> Result<Self> {
        let mut layout = Self::new(pe.image_base);
        for header in &pe.sections {
            let name = header.name().unwrap_or("").to_string();
            let mut flags = 0;
            if header.characteristics & IMAGE_SCN_MEM_READ != 0 {
                flags |= SEC_READ;
            }
            if header.characteristics & IMAGE_SCN_MEM_WRITE != 0 {
                flags |= SEC_WRITE;
            }
            if header.characteristics & IMAGE_SCN_MEM_EXECUTE != 0 {
                flags |= SEC_EXEC;
            }

            // Raw data beyond the virtual size is file padding, not mapped memory.
            let raw_len = if header.virtual_size == 0 {
                header.size_of_raw_data
            } else {
                header.size_of_raw_data.min(header.virtual_size)
            };
            let bytes = slice_section(
                data,
                &name,
                u64::from(header.pointer_to_raw_data),
                u64::from(raw_len),
            )?;

            let virtual_size = if header.virtual_size == 0 {
                header.size_of_raw_data
            } else {
                header.virtual_size
            };
            u64::from(header.virtual_address)
                .checked_add(u64::from(virtual_size))
                .ok_or_else(|| ImageError::VirtualAddressOverflow(name.clone()))?;

            layout.sections.push(
                Section::new(
                    &name,
                    u64::from(header.virtual_address),
                    u64::from(virtual_size),
                    flags,
                )
                .with_data(bytes),
            );
        }
        Ok(layout)
    }

    fn from_elf(elf: &Elf<'_>, data: &[u8]) -> Result<Self> {
        let mut layout = Self::new(0);
        for header in &elf.section_headers {
            if header.sh_flags & u64::from(SHF_ALLOC) == 0 || header.sh_size == 0 {
                continue;
            }
            let name = elf
                .shdr_strtab
                .get_at(header.sh_name)
                .unwrap_or("")
                .to_string();

            let mut flags = SEC_READ;
            if header.sh_flags & u64::from(SHF_WRITE) != 0 {
                flags |= SEC_WRITE;
            }
            if header.sh_flags & u64::from(SHF_EXECINSTR) != 0 {
                flags |= SEC_EXEC;
            }

            header
                .sh_addr
                .checked_add(header.sh_size)
                .ok_or_else(|| ImageError::VirtualAddressOverflow(name.clone()))?;

            let bytes = if header.sh_type == SHT_NOBITS {
                Vec::new()
            } else {
                slice_section(data, &name, header.sh_offset, header.sh_size)?
            };

            layout.sections.push(
                Section::new(&name, header.sh_addr, header.sh_size, flags).with_data(bytes),
            );
        }
        Ok(layout)
    }
}

fn slice_section(data: &[u8], name: &str, offset: u64, size: u64) -> Result<Vec<u8>> {
    let out_of_bounds = || ImageError::SectionOutOfBounds {
        name: name.to_string(),
        offset,
        size,
    };
    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let len = usize::try_from(size).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
    data.get(start..end)
        .map(<[u8]>::to_vec)
        .ok_or_else(out_of_bounds)
}
