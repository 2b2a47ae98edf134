//! The firmware service seam.
//!
//! Every operation in this crate reaches the firmware through
//! [`FirmwareServices`], so the algorithms are independent of the execution
//! environment: [`BootFirmware`] binds the trait to real UEFI tables, and
//! the test suite substitutes a mock that owns its own region list.

use core::ffi::c_void;
use core::ptr::NonNull;

use uefi::memory::EfiAllocateType;
use uefi::table::SystemTable;
use uefi::{EfiGuid, EfiPhysicalAddress, EfiStatus};

use crate::error::MapError;

/// Metadata returned alongside a filled memory-map buffer.
#[derive(Debug, Clone, Copy)]
pub struct MapInfo {
    /// Bytes of the buffer actually used.
    pub size: usize,
    /// Opaque token identifying this map revision. Carried through for
    /// `ExitBootServices`-style handshakes; never interpreted here.
    pub key: usize,
    /// Stride between descriptor entries. May exceed the descriptor
    /// structure's natural size.
    pub stride: usize,
    /// Firmware descriptor format version.
    pub version: u32,
}

/// Placement strategy for a page allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocateRequest {
    /// Any available range.
    AnyPages,
    /// Any range ending at or below the given address.
    MaxAddress(EfiPhysicalAddress),
    /// Exactly the given address.
    Address(EfiPhysicalAddress),
}

/// The abstract firmware contract used by this crate.
///
/// Single-threaded by construction: boot firmware has one control flow, so
/// methods take `&mut self` without any locking discipline.
pub trait FirmwareServices {
    /// Copies the current memory map into `buffer`.
    ///
    /// An empty (or too-short) buffer fails with
    /// [`MapError::BufferTooSmall`], whose fields report the size and
    /// stride the firmware requires at this instant; the authoritative map
    /// may grow between calls.
    ///
    /// # Errors
    ///
    /// [`MapError::BufferTooSmall`] when `buffer` cannot hold the map;
    /// [`MapError::SnapshotUnavailable`] when the firmware rejects the
    /// request outright.
    fn memory_map(&mut self, buffer: &mut [u8]) -> Result<MapInfo, MapError>;

    /// Allocates `pages` pages of `memory_type` according to `request`.
    ///
    /// # Errors
    ///
    /// [`MapError::AllocationFailed`] carrying the firmware status.
    fn allocate_pages(
        &mut self,
        request: AllocateRequest,
        memory_type: u32,
        pages: u64,
    ) -> Result<EfiPhysicalAddress, MapError>;

    /// Frees pages previously obtained from
    /// [`allocate_pages`](Self::allocate_pages).
    ///
    /// # Errors
    ///
    /// [`MapError::AllocationFailed`] carrying the firmware status.
    fn free_pages(&mut self, address: EfiPhysicalAddress, pages: u64) -> Result<(), MapError>;

    /// Looks up a configuration table by GUID. Returns `None` when the
    /// firmware does not publish it.
    fn configuration_table(&self, guid: EfiGuid) -> Option<NonNull<c_void>>;

    /// Returns a byte pointer to a page allocation.
    ///
    /// Boot firmware identity-maps physical memory, so a page allocation is
    /// directly addressable; this hook keeps that assumption on the seam so
    /// hosted tests can back allocations with their own storage.
    ///
    /// # Safety
    ///
    /// `[address, address + bytes)` must lie within a live allocation
    /// returned by [`allocate_pages`](Self::allocate_pages).
    unsafe fn page_slice(&mut self, address: EfiPhysicalAddress, bytes: usize) -> *mut u8;
}

// ── Production binding ───────────────────────────────────────────────

/// [`FirmwareServices`] bound to the real UEFI system table.
pub struct BootFirmware {
    system_table: NonNull<SystemTable>,
}

impl BootFirmware {
    /// Wraps the system table handed to the application entry point.
    ///
    /// # Safety
    ///
    /// `system_table` must be the valid system table pointer for this boot,
    /// and boot services must not have been exited.
    #[must_use]
    pub unsafe fn new(system_table: NonNull<SystemTable>) -> Self {
        Self { system_table }
    }

    fn system_table(&self) -> &SystemTable {
        // SAFETY: Validity is a constructor precondition, and the boot
        // environment never relocates the system table.
        unsafe { self.system_table.as_ref() }
    }
}

impl FirmwareServices for BootFirmware {
    fn memory_map(&mut self, buffer: &mut [u8]) -> Result<MapInfo, MapError> {
        let mut size = buffer.len();
        let mut key = 0usize;
        let mut stride = 0usize;
        let mut version = 0u32;

        // SAFETY: The boot services table is live (constructor precondition)
        // and the out-pointers are all valid locals.
        let status = unsafe {
            (self.system_table().boot_services().get_memory_map)(
                &raw mut size,
                buffer.as_mut_ptr(),
                &raw mut key,
                &raw mut stride,
                &raw mut version,
            )
        };

        if status == EfiStatus::BUFFER_TOO_SMALL {
            return Err(MapError::BufferTooSmall {
                required: size,
                stride,
            });
        }
        if status.is_error() {
            return Err(MapError::SnapshotUnavailable);
        }
        Ok(MapInfo {
            size,
            key,
            stride,
            version,
        })
    }

    fn allocate_pages(
        &mut self,
        request: AllocateRequest,
        memory_type: u32,
        pages: u64,
    ) -> Result<EfiPhysicalAddress, MapError> {
        let (alloc_type, mut address) = match request {
            AllocateRequest::AnyPages => (EfiAllocateType::AllocateAnyPages, 0),
            AllocateRequest::MaxAddress(max) => (EfiAllocateType::AllocateMaxAddress, max),
            AllocateRequest::Address(at) => (EfiAllocateType::AllocateAddress, at),
        };

        let pages = usize::try_from(pages)
            .map_err(|_| MapError::AllocationFailed(EfiStatus::INVALID_PARAMETER))?;

        // SAFETY: The boot services table is live and `address` is a valid
        // in/out local.
        let status = unsafe {
            (self.system_table().boot_services().allocate_pages)(
                alloc_type,
                memory_type,
                pages,
                &raw mut address,
            )
        };
        status.to_result().map_err(MapError::AllocationFailed)?;
        Ok(address)
    }

    fn free_pages(&mut self, address: EfiPhysicalAddress, pages: u64) -> Result<(), MapError> {
        let pages = usize::try_from(pages)
            .map_err(|_| MapError::AllocationFailed(EfiStatus::INVALID_PARAMETER))?;

        // SAFETY: The boot services table is live; the caller owns the
        // allocation being returned.
        let status = unsafe { (self.system_table().boot_services().free_pages)(address, pages) };
        status.to_result().map_err(MapError::AllocationFailed)
    }

    fn configuration_table(&self, guid: EfiGuid) -> Option<NonNull<c_void>> {
        // SAFETY: The system table's configuration array is valid for the
        // lifetime of the boot environment.
        let tables = unsafe { self.system_table().configuration_tables() };
        tables
            .iter()
            .find(|entry| entry.vendor_guid == guid)
            .and_then(|entry| NonNull::new(entry.vendor_table))
    }

    #[expect(clippy::cast_possible_truncation, reason = "identity-mapped boot environment")]
    unsafe fn page_slice(&mut self, address: EfiPhysicalAddress, _bytes: usize) -> *mut u8 {
        // Boot-time identity mapping: a physical address is the pointer.
        core::ptr::with_exposed_provenance_mut(address as usize)
    }
}
