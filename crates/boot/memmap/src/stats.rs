//! Memory-map statistics.

use uefi::memory::{EfiMemoryAttributes, EfiMemoryType, size_to_pages};

use crate::error::MapError;
use crate::firmware::FirmwareServices;
use crate::snapshot;
use crate::table::DescriptorTable;

/// The 4 GiB boundary.
const BASE_4GIB: u64 = 1 << 32;

/// Counts descriptors and pages that stay mapped after handoff: entries
/// with the runtime attribute whose type is not reserved. Returns
/// `(descriptor_count, page_count)`.
#[must_use]
pub fn count_runtime_pages(table: &DescriptorTable) -> (usize, u64) {
    let mut descriptors = 0;
    let mut pages = 0;
    for entry in table.iter() {
        if !entry.type_is(EfiMemoryType::ReservedMemoryType)
            && entry.attributes().contains(EfiMemoryAttributes::RUNTIME)
        {
            descriptors += 1;
            pages += entry.number_of_pages;
        }
    }
    (descriptors, pages)
}

/// Free-page totals from [`count_free_pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreePages {
    /// All conventional-memory pages.
    pub total: u64,
    /// The subset addressable below 4 GiB. An entry straddling the
    /// boundary contributes its sub-4 GiB portion, rounded up to whole
    /// pages.
    pub below_4gib: u64,
}

/// Snapshots the memory map and totals its conventional memory.
///
/// # Errors
///
/// Propagates snapshot errors.
pub fn count_free_pages<F: FirmwareServices>(firmware: &mut F) -> Result<FreePages, MapError> {
    let map = snapshot::snapshot(firmware, false)?;

    let mut free = FreePages {
        total: 0,
        below_4gib: 0,
    };
    for entry in map.iter() {
        if !entry.type_is(EfiMemoryType::ConventionalMemory) {
            continue;
        }
        free.total += entry.number_of_pages;

        if entry.physical_start >= BASE_4GIB {
            continue;
        }
        if entry.physical_end() > BASE_4GIB {
            free.below_4gib += size_to_pages(BASE_4GIB - entry.physical_start);
        } else {
            free.below_4gib += entry.number_of_pages;
        }
    }

    Ok(free)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uefi::memory::EfiMemoryDescriptor;

    const STRIDE: usize = core::mem::size_of::<EfiMemoryDescriptor>();

    fn desc(start: u64, pages: u64, ty: EfiMemoryType, attribute: u64) -> EfiMemoryDescriptor {
        EfiMemoryDescriptor {
            memory_type: ty as u32,
            physical_start: start,
            virtual_start: 0,
            number_of_pages: pages,
            attribute,
        }
    }

    #[test]
    fn runtime_pages_exclude_reserved_and_unmarked() {
        let runtime = EfiMemoryAttributes::RUNTIME.bits();
        let table = DescriptorTable::from_entries(
            &[
                desc(0x0000, 4, EfiMemoryType::RuntimeServicesCode, runtime),
                desc(0x4000, 2, EfiMemoryType::RuntimeServicesData, runtime),
                // Reserved is excluded even with the runtime bit.
                desc(0x6000, 8, EfiMemoryType::ReservedMemoryType, runtime),
                // Missing runtime bit is excluded regardless of type.
                desc(0xE000, 1, EfiMemoryType::MemoryMappedIO, 0),
            ],
            4,
            STRIDE,
        );
        assert_eq!(count_runtime_pages(&table), (2, 6));
    }

    #[test]
    fn runtime_pages_of_empty_table_are_zero() {
        let table = DescriptorTable::from_entries(&[], 1, STRIDE);
        assert_eq!(count_runtime_pages(&table), (0, 0));
    }
}
