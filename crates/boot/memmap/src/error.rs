//! Errors for memory-map operations.

use core::fmt;

use uefi::EfiStatus;

/// Errors from memory-map acquisition, allocation, and transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// The provided buffer cannot hold the current memory map. Retryable;
    /// consumed inside the snapshot loop and never escapes it. Both fields
    /// are valid on this outcome, per the firmware contract.
    BufferTooSmall {
        /// The buffer size the firmware requires right now.
        required: usize,
        /// The per-entry stride the firmware will use.
        stride: usize,
    },
    /// A snapshot buffer could not be allocated.
    OutOfMemory,
    /// The firmware page allocator rejected a request.
    AllocationFailed(EfiStatus),
    /// The firmware kept refusing to fill a grown buffer.
    SnapshotUnavailable,
    /// No region satisfied the search, or no descriptor contains the
    /// requested address.
    NotFound,
    /// The Memory Attributes Table is not published by this firmware.
    Unsupported,
    /// The descriptor table's capacity is exhausted. Splits completed so
    /// far remain applied and the table is still well formed.
    OutOfResources,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall { required, .. } => {
                write!(f, "memory map buffer too small ({required} bytes required)")
            }
            Self::OutOfMemory => write!(f, "snapshot buffer allocation failed"),
            Self::AllocationFailed(status) => {
                write!(f, "firmware page allocation failed: {status}")
            }
            Self::SnapshotUnavailable => write!(f, "firmware refused to provide a memory map"),
            Self::NotFound => write!(f, "no matching memory region"),
            Self::Unsupported => write!(f, "memory attributes table not published"),
            Self::OutOfResources => write!(f, "descriptor table capacity exhausted"),
        }
    }
}
