//! UEFI Globally Unique Identifier (GUID) type and well-known constants.
//!
//! GUIDs identify configuration tables in the system table's registry. The
//! constants here are the tables a boot memory manager cares about, chiefly
//! the Memory Attributes Table.

use core::fmt;

/// A UEFI Globally Unique Identifier (GUID).
///
/// 128-bit identifier formatted as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`,
/// stored in the mixed-endian layout the UEFI specification uses.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EfiGuid {
    /// The first 32 bits of the GUID.
    pub data1: u32,
    /// The next 16 bits of the GUID.
    pub data2: u16,
    /// The next 16 bits of the GUID.
    pub data3: u16,
    /// The remaining 64 bits of the GUID.
    pub data4: [u8; 8],
}

#[expect(
    clippy::unreadable_literal,
    reason = "GUID bytes are inherently opaque"
)]
impl EfiGuid {
    /// Creates a new GUID from its component parts.
    #[must_use]
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    // ── Configuration Table GUIDs ────────────────────────────────────

    /// Memory Attributes Table GUID (`EFI_MEMORY_ATTRIBUTES_TABLE_GUID`).
    ///
    /// Published by firmware that reports fine-grained runtime-region
    /// protections. Absence of this table is valid and common.
    pub const MEMORY_ATTRIBUTES_TABLE: Self = Self::new(
        0xdcfa911d,
        0x26eb,
        0x469f,
        [0xa2, 0x20, 0x38, 0xb7, 0xdc, 0x46, 0x12, 0x20],
    );

    /// ACPI 2.0 Table GUID.
    pub const ACPI_20_TABLE: Self = Self::new(
        0x8868e871,
        0xe4f1,
        0x11d3,
        [0xbc, 0x22, 0x00, 0x80, 0xc7, 0x3c, 0x88, 0x81],
    );

    /// SMBIOS 3.0 Table GUID.
    pub const SMBIOS3_TABLE: Self = Self::new(
        0xf2fd1544,
        0x9794,
        0x4a2c,
        [0x99, 0x2e, 0xe5, 0xbb, 0xcf, 0x20, 0xe3, 0x94],
    );
}

impl fmt::Debug for EfiGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EfiGuid({self})")
    }
}

impl fmt::Display for EfiGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

// ── Compile-time layout assertions ──────────────────────────────────

const _: () = assert!(core::mem::size_of::<EfiGuid>() == 16);
