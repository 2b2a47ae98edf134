//! UEFI memory types, descriptors, and attribute flags.
//!
//! # Memory Map Stride
//!
//! When walking memory descriptors returned by `GetMemoryMap` or found in
//! the Memory Attributes Table, callers **must** advance by the
//! firmware-reported `descriptor_size`, never by
//! `size_of::<EfiMemoryDescriptor>()`. Firmware is free to use a larger
//! stride than the structure's natural size.

use bitflags::bitflags;

/// The UEFI page size in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 4096;

/// Log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// Converts a page count to a byte count (`EFI_PAGES_TO_SIZE`).
#[inline]
#[must_use]
pub const fn pages_to_size(pages: u64) -> u64 {
    pages << PAGE_SHIFT
}

/// Converts a byte count to the number of pages covering it, rounding up
/// (`EFI_SIZE_TO_PAGES`).
#[inline]
#[must_use]
pub const fn size_to_pages(size: u64) -> u64 {
    (size >> PAGE_SHIFT) + if size & (PAGE_SIZE - 1) != 0 { 1 } else { 0 }
}

/// Specifies the placement strategy for `AllocatePages`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfiAllocateType {
    /// Allocate any available range of pages that satisfies the request.
    AllocateAnyPages = 0,
    /// Allocate any available range whose uppermost address is at or below
    /// the specified address.
    AllocateMaxAddress = 1,
    /// Allocate pages at exactly the specified address.
    AllocateAddress = 2,
}

/// The type of a memory region in the UEFI memory map.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EfiMemoryType {
    /// Not usable.
    ReservedMemoryType = 0,
    /// The code portions of a loaded UEFI application.
    LoaderCode = 1,
    /// The data portions of a loaded UEFI application.
    LoaderData = 2,
    /// The code portions of a loaded Boot Services driver.
    BootServicesCode = 3,
    /// The data portions of a loaded Boot Services driver.
    BootServicesData = 4,
    /// The code portions of a loaded Runtime Services driver.
    RuntimeServicesCode = 5,
    /// The data portions of a loaded Runtime Services driver.
    RuntimeServicesData = 6,
    /// Free (unallocated) memory.
    ConventionalMemory = 7,
    /// Memory in which errors have been detected.
    UnusableMemory = 8,
    /// Memory that holds the ACPI tables, reclaimable after they are parsed.
    AcpiReclaimMemory = 9,
    /// Address space reserved by the firmware for ACPI non-volatile storage.
    AcpiMemoryNvs = 10,
    /// Memory-mapped I/O region.
    MemoryMappedIO = 11,
    /// Memory-mapped I/O port space.
    MemoryMappedIOPortSpace = 12,
    /// Address space reserved for processor firmware code.
    PalCode = 13,
    /// Byte-addressable non-volatile memory that operates as conventional.
    PersistentMemory = 14,
    /// System memory not yet accepted by the isolation architecture.
    UnacceptedMemoryType = 15,
}

impl EfiMemoryType {
    /// Converts a raw firmware type value, or `None` for values outside the
    /// specification range (OEM and OS-defined types).
    #[must_use]
    pub const fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::ReservedMemoryType,
            1 => Self::LoaderCode,
            2 => Self::LoaderData,
            3 => Self::BootServicesCode,
            4 => Self::BootServicesData,
            5 => Self::RuntimeServicesCode,
            6 => Self::RuntimeServicesData,
            7 => Self::ConventionalMemory,
            8 => Self::UnusableMemory,
            9 => Self::AcpiReclaimMemory,
            10 => Self::AcpiMemoryNvs,
            11 => Self::MemoryMappedIO,
            12 => Self::MemoryMappedIOPortSpace,
            13 => Self::PalCode,
            14 => Self::PersistentMemory,
            15 => Self::UnacceptedMemoryType,
            _ => return None,
        })
    }
}

/// A descriptor for one contiguous region of physical memory.
///
/// # Layout Note
///
/// Firmware may hand out descriptors larger than this struct; see the
/// module documentation on stride.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EfiMemoryDescriptor {
    /// The raw type of this memory region (an [`EfiMemoryType`] value, or an
    /// OEM/OS-defined value outside that range).
    pub memory_type: u32,
    /// The physical address of the first byte of the region (page-aligned).
    pub physical_start: u64,
    /// The virtual address assigned by firmware. Opaque to this layer and
    /// carried through untouched.
    pub virtual_start: u64,
    /// The number of 4 KiB pages in the region (non-zero).
    pub number_of_pages: u64,
    /// Capability/attribute bits for the region ([`EfiMemoryAttributes`]).
    pub attribute: u64,
}

impl EfiMemoryDescriptor {
    /// Returns `true` if the region's raw type equals `ty`.
    #[inline]
    #[must_use]
    pub fn type_is(&self, ty: EfiMemoryType) -> bool {
        self.memory_type == ty as u32
    }

    /// Returns `true` for runtime-services code or data regions.
    #[inline]
    #[must_use]
    pub fn is_runtime_services(&self) -> bool {
        self.type_is(EfiMemoryType::RuntimeServicesCode)
            || self.type_is(EfiMemoryType::RuntimeServicesData)
    }

    /// The region's attribute bits as typed flags. Unknown bits are kept.
    #[inline]
    #[must_use]
    pub fn attributes(&self) -> EfiMemoryAttributes {
        EfiMemoryAttributes::from_bits_retain(self.attribute)
    }

    /// One past the last byte of the region.
    #[inline]
    #[must_use]
    pub fn physical_end(&self) -> u64 {
        self.physical_start + pages_to_size(self.number_of_pages)
    }

    /// Returns `true` if `[address, address + size)` lies entirely within
    /// this region.
    #[inline]
    #[must_use]
    pub fn contains_range(&self, address: u64, size: u64) -> bool {
        address >= self.physical_start && address + size <= self.physical_end()
    }
}

bitflags! {
    /// Memory attribute flags for memory descriptors.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EfiMemoryAttributes: u64 {
        /// Cacheability: uncacheable.
        const UC = 0x0000_0000_0000_0001;
        /// Cacheability: write combining.
        const WC = 0x0000_0000_0000_0002;
        /// Cacheability: write through.
        const WT = 0x0000_0000_0000_0004;
        /// Cacheability: write back.
        const WB = 0x0000_0000_0000_0008;
        /// Cacheability: uncacheable, exported.
        const UCE = 0x0000_0000_0000_0010;
        /// Protection: write protected.
        const WP = 0x0000_0000_0000_1000;
        /// Protection: read protected.
        const RP = 0x0000_0000_0000_2000;
        /// Protection: execute protected.
        const XP = 0x0000_0000_0000_4000;
        /// Non-volatile memory.
        const NV = 0x0000_0000_0000_8000;
        /// More reliable memory.
        const MORE_RELIABLE = 0x0000_0000_0001_0000;
        /// The region supports being made read-only.
        const RO = 0x0000_0000_0002_0000;
        /// Specific-purpose memory.
        const SP = 0x0000_0000_0004_0000;
        /// The region can be protected with CPU cryptographic capabilities.
        const CPU_CRYPTO = 0x0000_0000_0008_0000;
        /// The region must be mapped by the OS when `SetVirtualAddressMap`
        /// is called.
        const RUNTIME = 0x8000_0000_0000_0000;
    }
}

/// Header of the UEFI Memory Attributes Table configuration table.
///
/// The table body is `number_of_entries` descriptors, each
/// `descriptor_size` bytes apart, starting immediately after this header.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EfiMemoryAttributesTableHeader {
    /// Table format version.
    pub version: u32,
    /// Number of descriptor entries following the header.
    pub number_of_entries: u32,
    /// Stride between entries in bytes (may exceed the descriptor's natural
    /// size).
    pub descriptor_size: u32,
    /// Flags (reserved as zero in version 1 tables).
    pub flags: u32,
}

// ── Compile-time layout assertions ──────────────────────────────────

// EfiMemoryDescriptor carries 4 bytes of padding after memory_type.
const _: () = {
    assert!(core::mem::size_of::<EfiMemoryDescriptor>() == 40);
    assert!(core::mem::offset_of!(EfiMemoryDescriptor, memory_type) == 0);
    assert!(core::mem::offset_of!(EfiMemoryDescriptor, physical_start) == 8);
    assert!(core::mem::offset_of!(EfiMemoryDescriptor, virtual_start) == 16);
    assert!(core::mem::offset_of!(EfiMemoryDescriptor, number_of_pages) == 24);
    assert!(core::mem::offset_of!(EfiMemoryDescriptor, attribute) == 32);
    assert!(core::mem::size_of::<EfiMemoryAttributesTableHeader>() == 16);
};

#[cfg(test)]
mod tests {
    use super::{
        EfiMemoryAttributes, EfiMemoryDescriptor, EfiMemoryType, pages_to_size, size_to_pages,
    };

    #[test]
    fn size_to_pages_rounds_up() {
        assert_eq!(size_to_pages(0), 0);
        assert_eq!(size_to_pages(1), 1);
        assert_eq!(size_to_pages(4096), 1);
        assert_eq!(size_to_pages(4097), 2);
        assert_eq!(size_to_pages(8192), 2);
    }

    #[test]
    fn pages_to_size_is_exact() {
        assert_eq!(pages_to_size(0), 0);
        assert_eq!(pages_to_size(3), 0x3000);
    }

    #[test]
    fn from_raw_round_trips_spec_types() {
        for raw in 0..=15u32 {
            let ty = EfiMemoryType::from_raw(raw).unwrap();
            assert_eq!(ty as u32, raw);
        }
        assert_eq!(EfiMemoryType::from_raw(16), None);
        assert_eq!(EfiMemoryType::from_raw(0x8000_0000), None);
    }

    #[test]
    fn contains_range_is_inclusive_of_bounds() {
        let desc = EfiMemoryDescriptor {
            memory_type: EfiMemoryType::ConventionalMemory as u32,
            physical_start: 0x1000,
            virtual_start: 0,
            number_of_pages: 4,
            attribute: 0,
        };
        assert_eq!(desc.physical_end(), 0x5000);
        assert!(desc.contains_range(0x1000, 0x4000));
        assert!(desc.contains_range(0x2000, 0x1000));
        assert!(!desc.contains_range(0x0000, 0x1000));
        assert!(!desc.contains_range(0x4000, 0x2000));
    }

    #[test]
    fn attribute_bits_survive_unknown_values() {
        let desc = EfiMemoryDescriptor {
            memory_type: EfiMemoryType::RuntimeServicesData as u32,
            physical_start: 0,
            virtual_start: 0,
            number_of_pages: 1,
            attribute: EfiMemoryAttributes::RUNTIME.bits() | 0x0100,
        };
        assert!(desc.attributes().contains(EfiMemoryAttributes::RUNTIME));
        assert_eq!(desc.attributes().bits() & 0x0100, 0x0100);
    }
}
