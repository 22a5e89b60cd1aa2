//! Valid address window of the loaded image.

use std::cell::OnceCell;
use std::sync::Arc;

use relift_image::ImageLayout;
use tracing::debug;

/// A loaded section as seen by the range oracle:
/// `[virtual_address, virtual_address + virtual_size)` relative to the image base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionSpan {
    pub virtual_address: u64,
    pub virtual_size: u64,
}

/// Supplier of section layout.
pub trait SectionSource {
    fn section_spans(&self) -> Vec<SectionSpan>;
    fn image_base(&self) -> u64;
}

impl SectionSource for ImageLayout {
    fn section_spans(&self) -> Vec<SectionSpan> {
        self.sections
            .iter()
            .map(|s| SectionSpan {
                virtual_address: s.virtual_address,
                virtual_size: s.virtual_size,
            })
            .collect()
    }

    fn image_base(&self) -> u64 {
        self.image_base
    }
}

impl<T: SectionSource + ?Sized> SectionSource for Arc<T> {
    fn section_spans(&self) -> Vec<SectionSpan> {
        (**self).section_spans()
    }

    fn image_base(&self) -> u64 {
        (**self).image_base()
    }
}

/// Half-open interval `[low, high)` of loaded addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AddressRange {
    pub low: u64,
    pub high: u64,
}

impl AddressRange {
    pub const EMPTY: Self = Self { low: 0, high: 0 };

    /// Span from the lowest section start to the highest section end.
    ///
    /// Gaps between sections count as valid. With no sections the range is empty.
    pub fn from_sections(spans: &[SectionSpan], image_base: u64) -> Self {
        let mut low = u64::MAX;
        let mut high = 0u64;
        for span in spans {
            let start = image_base.saturating_add(span.virtual_address);
            let end = start.saturating_add(span.virtual_size);
            low = low.min(start);
            high = high.max(end);
        }
        if low >= high {
            return Self::EMPTY;
        }
        Self { low, high }
    }

    pub const fn contains(&self, address: u64) -> bool {
        address >= self.low && address < self.high
    }

    pub const fn is_empty(&self) -> bool {
        self.low >= self.high
    }

    pub const fn len(&self) -> u64 {
        self.high.saturating_sub(self.low)
    }
}

/// Computes the [`AddressRange`] on first use and keeps it for the rest of the session.
pub struct AddressRangeOracle<S: SectionSource> {
    source: S,
    range: OnceCell<AddressRange>,
}

impl<S: SectionSource> AddressRangeOracle<S> {
    pub const fn new(source: S) -> Self {
        Self {
            source,
            range: OnceCell::new(),
        }
    }

    pub fn range(&self) -> AddressRange {
        *self.range.get_or_init(|| {
            let range =
                AddressRange::from_sections(&self.source.section_spans(), self.source.image_base());
            debug!(low = range.low, high = range.high, "computed valid address range");
            range
        })
    }

    pub fn is_valid(&self, address: u64) -> bool {
        self.range().contains(address)
    }

    pub const fn source(&self) -> &S {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use relift_image::{SEC_READ, Section};

    #[test]
    fn test_single_section_range() {
        let image = ImageLayout::new(0x1_4000_0000).with_section(Section::new(
            ".text", 0x1000, 0x2000, SEC_READ,
        ));
        let oracle = AddressRangeOracle::new(image);
        assert_eq!(
            oracle.range(),
            AddressRange {
                low: 0x1_4000_1000,
                high: 0x1_4000_3000
            }
        );
        assert!(oracle.is_valid(0x1_4000_1500));
        assert!(!oracle.is_valid(0x1_4000_4000));
        assert!(!oracle.is_valid(0x1_4000_3000));
    }

    /// The test binary itself is an ELF file on Linux.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_parsed_binary_covers_text() {
        let exe = std::env::current_exe().unwrap();
        let image = ImageLayout::parse(&std::fs::read(exe).unwrap()).unwrap();
        let text = image
            .sections
            .iter()
            .find(|s| s.name == ".text")
            .cloned()
            .unwrap();
        assert!(text.is_executable());

        let oracle = AddressRangeOracle::new(image);
        let start = oracle.source().image_base + text.virtual_address;
        assert!(oracle.is_valid(start));
        assert!(oracle.is_valid(start + text.virtual_size - 1));
        assert!(!oracle.is_valid(oracle.range().high));
    }

    #[test]
    fn test_range_spans_gaps() {
        let spans = [
            SectionSpan {
                virtual_address: 0x5000,
                virtual_size: 0x100,
            },
            SectionSpan {
                virtual_address: 0x1000,
                virtual_size: 0x200,
            },
        ];
        let range = AddressRange::from_sections(&spans, 0x40_0000);
        assert_eq!(range.low, 0x40_1000);
        assert_eq!(range.high, 0x40_5100);
        assert!(range.contains(0x40_3000));
    }

    #[test]
    fn test_no_sections_is_empty() {
        let range = AddressRange::from_sections(&[], 0x1000);
        assert!(range.is_empty());
        assert!(!range.contains(0));
        assert!(!range.contains(0x1000));
    }

    struct CountingSource {
        calls: Cell<usize>,
    }

    impl SectionSource for CountingSource {
        fn section_spans(&self) -> Vec<SectionSpan> {
            self.calls.set(self.calls.get() + 1);
            vec![SectionSpan {
                virtual_address: 0,
                virtual_size: 0x10,
            }]
        }

        fn image_base(&self) -> u64 {
            0x1000
        }
    }

    #[test]
    fn test_range_is_memoized() {
        let oracle = AddressRangeOracle::new(CountingSource {
            calls: Cell::new(0),
        });
        assert!(oracle.is_valid(0x1000));
        assert!(oracle.is_valid(0x100f));
        assert_eq!(oracle.range().len(), 0x10);
        assert_eq!(oracle.source().calls.get(), 1);
    }
}
