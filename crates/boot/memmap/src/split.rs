//! The descriptor splitting engine.
//!
//! Coalescing leaves runtime-services entries with a single coarse type
//! even where the Memory Attributes Table knows better. This pass rewrites
//! a normalized map so that every runtime region boundary matches the
//! attributes table, making the map's type field trustworthy page by page
//! for protection-aware consumers.
//!
//! Both tables are sorted ascending and non-overlapping, so the engine is
//! a two-cursor merge: one cursor walks the descriptor table, one walks the
//! attributes table, and neither ever rewinds. The attribute cursor's
//! resume position is explicit state in [`AttributeCursor`] rather than an
//! implicit loop discipline.

use uefi::memory::{
    EfiMemoryAttributes, EfiMemoryDescriptor, EfiMemoryType, pages_to_size, size_to_pages,
};

use crate::attributes::AttributesTable;
use crate::error::MapError;
use crate::firmware::FirmwareServices;
use crate::table::DescriptorTable;

/// The protection type an attribute entry really implies.
///
/// Read-only regions hold code; execute-protected regions hold data;
/// anything else keeps its nominal type.
///
/// # Panics
///
/// Panics if the entry is not a runtime-services entry; the attributes
/// table only carries those, so anything else is a malformed table.
fn real_memory_type(attribute: &EfiMemoryDescriptor) -> u32 {
    assert!(
        attribute.is_runtime_services(),
        "attribute entry is not a runtime-services region"
    );

    if attribute.attributes().contains(EfiMemoryAttributes::RO) {
        EfiMemoryType::RuntimeServicesCode as u32
    } else if attribute.attributes().contains(EfiMemoryAttributes::XP) {
        EfiMemoryType::RuntimeServicesData as u32
    } else {
        attribute.memory_type
    }
}

/// Forward-only cursor over the attributes table.
///
/// The resume position only advances when an attribute is consumed by a
/// split, so repeated scans for the same descriptor pick up where the last
/// split left off and later descriptors never revisit earlier attributes.
struct AttributeCursor<'a> {
    table: &'a AttributesTable,
    next: usize,
}

impl<'a> AttributeCursor<'a> {
    fn new(table: &'a AttributesTable) -> Self {
        Self { table, next: 0 }
    }

    /// Finds the next attribute entry inside `descriptor` whose derived
    /// type differs from the descriptor's current type, consuming it.
    ///
    /// Attribute entries for one descriptor form a contiguous run, so the
    /// scan stops as soon as it leaves a run it had entered; a
    /// same-derived-type attribute is skipped without being consumed.
    fn next_differing(&mut self, descriptor: &EfiMemoryDescriptor) -> Option<EfiMemoryDescriptor> {
        let mut in_run = false;
        for index in self.next..self.table.len() {
            let attribute = self.table.get(index);
            if !attribute.is_runtime_services() {
                continue;
            }

            if descriptor.contains_range(
                attribute.physical_start,
                pages_to_size(attribute.number_of_pages),
            ) {
                in_run = true;
                if real_memory_type(&attribute) != descriptor.memory_type {
                    self.next = index + 1;
                    return Some(attribute);
                }
            } else if in_run {
                // Left the descriptor's attribute run; nothing further can
                // match.
                break;
            }
        }
        None
    }
}

/// Splits the descriptor at `index` against one attribute entry.
///
/// At most two insertions happen: one to shorten the descriptor's head
/// down to the attribute's start, and one to carve the attribute's extent
/// out of the remainder. `index` is left on the entry still to be
/// processed against further attributes.
///
/// Capacity is checked before any mutation of a given insertion, so an
/// `OutOfResources` abort leaves the table well formed with all previous
/// splits applied.
fn split_entry(
    table: &mut DescriptorTable,
    index: &mut usize,
    attribute: &EfiMemoryDescriptor,
) -> Result<(), MapError> {
    let mut descriptor = table.get(*index);

    // The attribute starts inside the descriptor: shorten the descriptor
    // to end at the attribute's start and insert the remainder after it.
    // [DESC] -> [DESC][REST]
    if attribute.physical_start > descriptor.physical_start {
        let head_pages = size_to_pages(attribute.physical_start - descriptor.physical_start);
        let mut rest = descriptor;
        rest.physical_start = attribute.physical_start;
        rest.number_of_pages = descriptor.number_of_pages - head_pages;
        table.insert_at(*index + 1, &rest)?;

        descriptor.number_of_pages = head_pages;
        table.set(*index, &descriptor);

        // The remainder is now the entry being processed.
        *index += 1;
        descriptor = rest;
    }

    assert!(
        attribute.physical_start == descriptor.physical_start,
        "attribute entry crosses a descriptor boundary"
    );

    let real_type = real_memory_type(attribute);

    // The attribute covers the whole descriptor: only the type changes.
    // [DESC] -> [DESC*]
    if descriptor.number_of_pages == attribute.number_of_pages {
        descriptor.memory_type = real_type;
        table.set(*index, &descriptor);
        return Ok(());
    }

    // The attribute is shorter: retype its extent and insert the tail with
    // the original type. [DESC] -> [DESC*][REST]
    let mut rest = descriptor;
    rest.physical_start += pages_to_size(attribute.number_of_pages);
    rest.number_of_pages = descriptor.number_of_pages - attribute.number_of_pages;
    table.insert_at(*index + 1, &rest)?;

    descriptor.memory_type = real_type;
    descriptor.number_of_pages = attribute.number_of_pages;
    table.set(*index, &descriptor);

    // The tail still carries the nominal type and may need further splits.
    *index += 1;
    Ok(())
}

/// Rewrites the runtime-services entries of a normalized map so their
/// boundaries and types match the attributes table.
///
/// # Errors
///
/// [`MapError::OutOfResources`] when the table runs out of capacity; all
/// splits completed so far remain applied and the table stays sorted,
/// non-overlapping, and coverage-preserving. Callers sizing the table with
/// [`count_runtime_entries`](crate::attributes::count_runtime_entries)
/// spare slots never hit this.
pub fn split_by_attributes(
    table: &mut DescriptorTable,
    attributes: &AttributesTable,
) -> Result<(), MapError> {
    let mut cursor = AttributeCursor::new(attributes);

    let mut index = 0;
    while index < table.len() {
        // Split the entry by as many attributes as apply to it.
        loop {
            let descriptor = table.get(index);
            if !descriptor.is_runtime_services() {
                break;
            }
            let Some(attribute) = cursor.next_differing(&descriptor) else {
                break;
            };
            if let Err(error) = split_entry(table, &mut index, &attribute) {
                log::warn!(
                    "descriptor table full at {} entries while splitting",
                    table.len()
                );
                return Err(error);
            }
        }
        index += 1;
    }

    Ok(())
}

/// Locates the firmware's attributes table and splits `table` against it.
///
/// # Errors
///
/// [`MapError::Unsupported`] when the firmware publishes no attributes
/// table (callers may treat refinement as a no-op); otherwise as
/// [`split_by_attributes`].
pub fn refine_runtime_regions<F: FirmwareServices>(
    firmware: &F,
    table: &mut DescriptorTable,
) -> Result<(), MapError> {
    let Some(attributes) = AttributesTable::locate(firmware) else {
        log::debug!("memory attributes table is not published");
        return Err(MapError::Unsupported);
    };
    split_by_attributes(table, &attributes)
}
