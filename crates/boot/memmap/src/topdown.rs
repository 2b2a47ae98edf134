//! Top-down page allocation under an address ceiling.

use uefi::EfiPhysicalAddress;
use uefi::memory::{EfiMemoryType, pages_to_size};

use crate::error::MapError;
use crate::firmware::{AllocateRequest, FirmwareServices};
use crate::{normalize, snapshot};

/// Allocates `pages` pages of `memory_type` as close as possible below
/// `ceiling`, searching free memory from the top down.
///
/// Takes a fresh snapshot and walks conventional entries from the highest
/// address downward. A candidate entry must hold enough pages at or below
/// the ceiling; the candidate address is the top of the entry when the
/// whole entry is below the ceiling, or exactly `ceiling - size` when the
/// entry straddles it. A `conflict(address, size)` callback may veto the
/// candidate, in which case the search moves on to the next lower entry —
/// an entry is never re-probed at a different offset. The accepted
/// candidate is committed with a fixed-address firmware allocation.
///
/// # Errors
///
/// [`MapError::NotFound`] when no entry qualifies; snapshot errors and
/// [`MapError::AllocationFailed`] from the commit are propagated.
pub fn allocate_pages_from_top<F: FirmwareServices>(
    firmware: &mut F,
    memory_type: EfiMemoryType,
    pages: u64,
    ceiling: EfiPhysicalAddress,
    conflict: Option<&dyn Fn(EfiPhysicalAddress, u64) -> bool>,
) -> Result<EfiPhysicalAddress, MapError> {
    let mut map = snapshot::snapshot(firmware, false)?;
    normalize::sort(&mut map);

    let size = pages_to_size(pages);
    let mut result = Err(MapError::NotFound);
    for index in (0..map.len()).rev() {
        let entry = map.get(index);
        if !entry.type_is(EfiMemoryType::ConventionalMemory) || entry.number_of_pages < pages {
            continue;
        }
        // The entry must be able to place the request at or below the
        // ceiling.
        if entry.physical_start + size > ceiling {
            continue;
        }

        let address = if entry.physical_end() <= ceiling {
            // The whole entry is under the ceiling: take its top.
            entry.physical_end() - size
        } else {
            // The entry straddles the ceiling: land exactly below it.
            ceiling - size
        };

        if conflict.is_some_and(|check| check(address, size)) {
            continue;
        }

        result = firmware.allocate_pages(
            AllocateRequest::Address(address),
            memory_type as u32,
            pages,
        );
        break;
    }

    result
}
