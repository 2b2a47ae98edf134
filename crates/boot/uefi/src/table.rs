//! UEFI System Table and Boot Services binding.
//!
//! Only the services the memory-map layer calls are bound by name:
//! the memory services (`AllocatePages` through `FreePool`),
//! `ExitBootServices`, and the configuration-table registry hanging off the
//! system table. Everything else in [`BootServices`] is opaque padding that
//! preserves the specification's field offsets, so this struct is a valid
//! *prefix* view of the firmware table: it must only ever be used through a
//! pointer, never moved or copied by value.

use core::ffi::c_void;

use crate::memory::EfiAllocateType;
use crate::{EfiGuid, EfiHandle, EfiPhysicalAddress, EfiStatus};

// ── Table Header ─────────────────────────────────────────────────────

/// Common header for all UEFI tables.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TableHeader {
    /// A 64-bit signature identifying the table that follows.
    pub signature: u64,
    /// The UEFI specification revision the table conforms to.
    pub revision: u32,
    /// The size of the entire table in bytes, including the header.
    pub header_size: u32,
    /// The 32-bit CRC of the entire table.
    pub crc32: u32,
    /// Reserved; must be zero.
    pub reserved: u32,
}

// ── Configuration Table ──────────────────────────────────────────────

/// An entry in the UEFI configuration table array.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ConfigurationTable {
    /// The GUID identifying the vendor table.
    pub vendor_guid: EfiGuid,
    /// A pointer to the vendor-specific table data.
    pub vendor_table: *mut c_void,
}

// ── System Table ─────────────────────────────────────────────────────

/// The UEFI System Table, the entry point to all firmware services.
///
/// A pointer to this table is handed to the application entry point.
/// Console and runtime-services pointers are carried untyped; this layer
/// never dereferences them.
#[repr(C)]
pub struct SystemTable {
    /// The table header.
    pub header: TableHeader,
    /// Null-terminated UCS-2 firmware vendor string.
    pub firmware_vendor: *const u16,
    /// The firmware revision.
    pub firmware_revision: u32,
    /// Handle for the active console input device.
    pub console_in_handle: EfiHandle,
    /// Simple Text Input Protocol for console input (unbound).
    pub console_in: *mut c_void,
    /// Handle for the active console output device.
    pub console_out_handle: EfiHandle,
    /// Simple Text Output Protocol for console output (unbound).
    pub console_out: *mut c_void,
    /// Handle for the standard error console device.
    pub standard_error_handle: EfiHandle,
    /// Simple Text Output Protocol for standard error (unbound).
    pub standard_error: *mut c_void,
    /// Runtime Services table (unbound).
    pub runtime_services: *mut c_void,
    /// Boot Services table.
    pub boot_services: *mut BootServices,
    /// Number of entries in the configuration table array.
    pub number_of_table_entries: usize,
    /// The configuration table array.
    pub configuration_table: *mut ConfigurationTable,
}

impl SystemTable {
    /// Returns the boot services table.
    ///
    /// # Safety
    ///
    /// `self.boot_services` must be valid and `ExitBootServices` must not
    /// have been called.
    #[must_use]
    pub unsafe fn boot_services(&self) -> &BootServices {
        unsafe { &*self.boot_services }
    }

    /// Returns the configuration table entries as a slice.
    ///
    /// # Safety
    ///
    /// `self.configuration_table` must point to
    /// `self.number_of_table_entries` valid entries.
    #[must_use]
    pub unsafe fn configuration_tables(&self) -> &[ConfigurationTable] {
        unsafe {
            core::slice::from_raw_parts(self.configuration_table, self.number_of_table_entries)
        }
    }
}

// ── Boot Services (prefix binding) ───────────────────────────────────

/// The UEFI Boot Services table, bound as a prefix.
///
/// Padding arrays stand in for service groups this layer never calls; each
/// slot in the real table is one pointer wide, so `[usize; N]` keeps the
/// bound fields at their specified offsets.
#[repr(C)]
pub struct BootServices {
    /// The table header.
    pub header: TableHeader,

    /// Task priority services: `RaiseTPL`, `RestoreTPL`.
    _task_priority: [usize; 2],

    // ── Memory Services ──────────────────────────────────────────
    /// Allocates pages of a given memory type.
    pub allocate_pages: unsafe extern "efiapi" fn(
        alloc_type: EfiAllocateType,
        memory_type: u32,
        pages: usize,
        memory: *mut EfiPhysicalAddress,
    ) -> EfiStatus,
    /// Frees pages allocated by `AllocatePages`.
    pub free_pages:
        unsafe extern "efiapi" fn(memory: EfiPhysicalAddress, pages: usize) -> EfiStatus,
    /// Returns a copy of the current memory map.
    pub get_memory_map: unsafe extern "efiapi" fn(
        memory_map_size: *mut usize,
        memory_map: *mut u8,
        map_key: *mut usize,
        descriptor_size: *mut usize,
        descriptor_version: *mut u32,
    ) -> EfiStatus,
    /// Allocates pool memory.
    pub allocate_pool: unsafe extern "efiapi" fn(
        pool_type: u32,
        size: usize,
        buffer: *mut *mut c_void,
    ) -> EfiStatus,
    /// Returns pool memory to the system.
    pub free_pool: unsafe extern "efiapi" fn(buffer: *mut c_void) -> EfiStatus,

    /// Event and timer services: `CreateEvent` through `CheckEvent`.
    _event_timer: [usize; 6],
    /// Protocol handler services: `InstallProtocolInterface` through
    /// `InstallConfigurationTable` (includes the reserved slot).
    _protocol: [usize; 9],
    /// Image services: `LoadImage`, `StartImage`, `Exit`, `UnloadImage`.
    _image: [usize; 4],

    /// Terminates boot services. After success, only runtime services
    /// remain.
    pub exit_boot_services:
        unsafe extern "efiapi" fn(image_handle: EfiHandle, map_key: usize) -> EfiStatus,
}

// ── Compile-time layout assertions ──────────────────────────────────

const _: () = assert!(core::mem::size_of::<TableHeader>() == 24);

#[cfg(target_pointer_width = "64")]
const _: () = {
    // Memory services start right after the header and the two TPL slots.
    assert!(core::mem::offset_of!(BootServices, allocate_pages) == 24 + 2 * 8);
    assert!(core::mem::offset_of!(BootServices, get_memory_map) == 24 + 4 * 8);
    // ExitBootServices is the 26th service slot.
    assert!(core::mem::offset_of!(BootServices, exit_boot_services) == 24 + 26 * 8);
};
