//! Memory-map normalization: sort, then coalesce.
//!
//! Firmware hands the map back in whatever order suits it; normalization
//! orders entries by physical address and merges adjacent compatible
//! entries so downstream passes (statistics, splitting) can rely on a
//! sorted, minimal table.

use uefi::memory::{EfiMemoryDescriptor, EfiMemoryType};

use crate::table::DescriptorTable;

/// Sorts the table ascending by physical start address.
///
/// Entries never share a start address (regions are non-overlapping by
/// firmware contract), so stability is irrelevant. Insertion sort is
/// deliberate: maps are tens to low hundreds of entries and usually almost
/// sorted already. Only the defined descriptor fields move; stride padding
/// stays where it is.
pub fn sort(table: &mut DescriptorTable) {
    for sorted in 1..table.len() {
        let mut index = sorted;
        while index > 0 && table.get(index - 1).physical_start > table.get(index).physical_start {
            let left = table.get(index - 1);
            let right = table.get(index);
            table.set(index - 1, &right);
            table.set(index, &left);
            index -= 1;
        }
    }
}

/// How two adjacent entries may merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeClass {
    /// Not mergeable.
    No,
    /// Both are boot-reclaimable; the merged entry becomes conventional.
    Free,
    /// Both are the same runtime-services type, which is preserved.
    Runtime,
}

/// Types that fold into conventional memory once boot services end.
fn is_boot_reclaimable(entry: &EfiMemoryDescriptor) -> bool {
    entry.type_is(EfiMemoryType::BootServicesCode)
        || entry.type_is(EfiMemoryType::BootServicesData)
        || entry.type_is(EfiMemoryType::ConventionalMemory)
        || entry.type_is(EfiMemoryType::LoaderCode)
        || entry.type_is(EfiMemoryType::LoaderData)
}

fn merge_class(prev: &EfiMemoryDescriptor, next: &EfiMemoryDescriptor) -> MergeClass {
    if prev.attribute != next.attribute || prev.physical_end() != next.physical_start {
        return MergeClass::No;
    }

    if is_boot_reclaimable(prev) && is_boot_reclaimable(next) {
        return MergeClass::Free;
    }

    // Runtime regions keep their exact type; code never merges with data.
    let both_code = prev.type_is(EfiMemoryType::RuntimeServicesCode)
        && next.type_is(EfiMemoryType::RuntimeServicesCode);
    let both_data = prev.type_is(EfiMemoryType::RuntimeServicesData)
        && next.type_is(EfiMemoryType::RuntimeServicesData);
    if both_code || both_data {
        return MergeClass::Runtime;
    }

    // Persistent, ACPI, and MMIO types never participate in merging.
    MergeClass::No
}

/// Coalesces a sorted table in place.
///
/// Walks left to right, folding each entry into its predecessor when the
/// two are byte-contiguous, carry identical attributes, and are
/// merge-compatible. Contiguous runs of absorbed entries are compacted
/// with one block copy per run rather than one copy per entry.
pub fn coalesce(table: &mut DescriptorTable) {
    if table.is_empty() {
        return;
    }

    // `kept` is the last surviving entry; everything in (kept, cursor) has
    // been absorbed into it and awaits compaction.
    let mut kept = 0;
    let mut cursor = 1;
    while cursor < table.len() {
        let mut prev = table.get(kept);
        let next = table.get(cursor);
        match merge_class(&prev, &next) {
            MergeClass::Free => {
                prev.memory_type = EfiMemoryType::ConventionalMemory as u32;
                prev.number_of_pages += next.number_of_pages;
                table.set(kept, &prev);
                cursor += 1;
            }
            MergeClass::Runtime => {
                prev.number_of_pages += next.number_of_pages;
                table.set(kept, &prev);
                cursor += 1;
            }
            MergeClass::No => {
                if cursor > kept + 1 {
                    table.remove_run(kept + 1, cursor - kept - 1);
                }
                kept += 1;
                cursor = kept + 1;
            }
        }
    }
    if cursor > kept + 1 {
        table.remove_run(kept + 1, cursor - kept - 1);
    }
}

/// Sorts and coalesces in one call.
pub fn normalize(table: &mut DescriptorTable) {
    sort(table);
    coalesce(table);
}
