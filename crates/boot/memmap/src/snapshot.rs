//! Memory-map snapshot acquisition.
//!
//! Acquiring a map is inherently racy: the buffer allocated to hold the map
//! can itself add entries to the map. The firmware reports this as a
//! buffer-too-small outcome on the fill call, and the whole query/allocate/
//! fill cycle is retried with a grown request. There is no locking to lean
//! on in a boot environment; the retry loop *is* the protocol.

use alloc::vec::Vec;
use core::ptr::NonNull;

use uefi::EfiPhysicalAddress;
use uefi::memory::{EfiMemoryType, pages_to_size, size_to_pages};

use crate::attributes;
use crate::error::MapError;
use crate::firmware::FirmwareServices;
use crate::table::DescriptorTable;
use crate::topdown;

/// Minimum slack in bytes over the reported map size. Apple firmware sizes
/// with a flat 1 KiB; the map grows by at least one descriptor between the
/// size query and the fill, so the slack is never less than one stride.
const POOL_SLACK: usize = 1024;

/// Additional growth applied to each retry after a fill reports the map
/// outgrew the buffer.
const RETRY_GROWTH: usize = 512;

/// Retry bound before declaring the firmware uncooperative.
const MAX_ATTEMPTS: usize = 8;

/// Size query: asks the firmware how big the map is right now.
fn probe<F: FirmwareServices>(firmware: &mut F) -> Result<(usize, usize), MapError> {
    match firmware.memory_map(&mut []) {
        Err(MapError::BufferTooSmall { required, stride }) => Ok((required, stride)),
        Err(error) => Err(error),
        // A zero-length fill can only "succeed" on an empty map, which no
        // real firmware reports.
        Ok(_) => Err(MapError::SnapshotUnavailable),
    }
}

/// Fallible heap allocation for the snapshot buffer.
fn allocate_buffer(bytes: usize) -> Result<Vec<u8>, MapError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(bytes)
        .map_err(|_| MapError::OutOfMemory)?;
    buffer.resize(bytes, 0);
    Ok(buffer)
}

/// Snapshots the current memory map into a heap buffer.
///
/// The buffer is allocated strictly larger than the firmware's reported
/// size. With `include_split_allowance`, enough spare slots are added for
/// the worst-case growth a later [`split_by_attributes`] pass could need,
/// one per runtime entry in the Memory Attributes Table.
///
/// # Errors
///
/// [`MapError::OutOfMemory`] when the buffer cannot be allocated,
/// [`MapError::SnapshotUnavailable`] when the firmware refuses the request
/// or keeps outgrowing the buffer past the retry bound.
///
/// [`split_by_attributes`]: crate::split::split_by_attributes
pub fn snapshot<F: FirmwareServices>(
    firmware: &mut F,
    include_split_allowance: bool,
) -> Result<DescriptorTable, MapError> {
    let (required, stride) = probe(firmware)?;
    let extra = if include_split_allowance {
        attributes::count_runtime_entries(firmware) * stride
    } else {
        0
    };

    let mut request = required + stride.max(POOL_SLACK) + extra;
    for _ in 0..MAX_ATTEMPTS {
        let mut buffer = allocate_buffer(request)?;
        match firmware.memory_map(&mut buffer) {
            Ok(info) => return Ok(DescriptorTable::from_snapshot_buffer(buffer, &info)),
            Err(MapError::BufferTooSmall {
                required: grown, ..
            }) => {
                log::debug!("memory map grew to {grown} bytes, retrying");
                request = grown + extra + RETRY_GROWTH;
            }
            Err(error) => return Err(error),
        }
    }

    log::warn!("memory map kept growing across {MAX_ATTEMPTS} snapshot attempts");
    Err(MapError::SnapshotUnavailable)
}

/// Snapshots the current memory map into firmware pages allocated from the
/// top of memory below `ceiling`.
///
/// Used when pool memory could collide with a reserved high range (for
/// example, a kernel image staging area): the buffer is placed with the
/// top-down allocator, and `conflict` can veto candidate placements. The
/// returned table must be given back with [`DescriptorTable::release`].
///
/// # Errors
///
/// As [`snapshot`], plus any error of the top-down allocation itself.
pub fn snapshot_from_top<F: FirmwareServices>(
    firmware: &mut F,
    include_split_allowance: bool,
    ceiling: EfiPhysicalAddress,
    conflict: Option<&dyn Fn(EfiPhysicalAddress, u64) -> bool>,
) -> Result<DescriptorTable, MapError> {
    let (required, stride) = probe(firmware)?;
    let extra = if include_split_allowance {
        attributes::count_runtime_entries(firmware) * stride
    } else {
        0
    };

    let mut request = required + stride.max(POOL_SLACK) + extra;
    for _ in 0..MAX_ATTEMPTS {
        let pages = size_to_pages(request as u64);
        let base = match topdown::allocate_pages_from_top(
            firmware,
            EfiMemoryType::BootServicesData,
            pages,
            ceiling,
            conflict,
        ) {
            Ok(base) => base,
            Err(error) => {
                log::debug!("snapshot buffer allocation from top failed: {error}");
                return Err(error);
            }
        };

        #[expect(clippy::cast_possible_truncation, reason = "request fits usize by construction")]
        let bytes = pages_to_size(pages) as usize;
        // SAFETY: `base` is a live `pages`-page allocation we just made.
        let Some(ptr) = NonNull::new(unsafe { firmware.page_slice(base, bytes) }) else {
            firmware.free_pages(base, pages)?;
            return Err(MapError::OutOfMemory);
        };

        // SAFETY: `ptr` addresses `bytes` bytes of the allocation above,
        // exclusively ours until freed or handed to the table.
        let slice = unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), bytes) };
        match firmware.memory_map(slice) {
            // SAFETY: Same allocation; the table takes over ownership.
            Ok(info) => {
                return Ok(unsafe { DescriptorTable::from_firmware_pages(base, ptr, bytes, &info) });
            }
            Err(MapError::BufferTooSmall {
                required: grown, ..
            }) => {
                firmware.free_pages(base, pages)?;
                log::debug!("memory map grew to {grown} bytes, retrying");
                request = grown + extra + RETRY_GROWTH;
            }
            Err(error) => {
                firmware.free_pages(base, pages)?;
                return Err(error);
            }
        }
    }

    log::warn!("memory map kept growing across {MAX_ATTEMPTS} snapshot attempts");
    Err(MapError::SnapshotUnavailable)
}
