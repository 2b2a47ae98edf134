//! Boot-firmware memory-map toolkit.
//!
//! This crate owns the memory-map work a boot loader does between entry and
//! handoff: snapshot the firmware's authoritative map (retrying as it grows
//! under its own allocations), normalize it by sorting and coalescing,
//! allocate regions from high memory down under an address ceiling, total
//! up free and runtime pages, and split runtime-services entries against
//! the firmware's Memory Attributes Table so each entry's type is
//! trustworthy page by page.
//!
//! All firmware access goes through the [`FirmwareServices`] seam;
//! [`BootFirmware`] binds it to real UEFI tables, and hosted tests bind it
//! to a mock. The crate is `no_std` with `alloc` (the global allocator is
//! firmware pool memory in a boot environment).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod attributes;
pub mod error;
pub mod firmware;
pub mod normalize;
pub mod snapshot;
pub mod split;
pub mod stats;
pub mod table;
pub mod topdown;

pub use attributes::AttributesTable;
pub use error::MapError;
pub use firmware::{AllocateRequest, BootFirmware, FirmwareServices, MapInfo};
pub use normalize::normalize;
pub use snapshot::{snapshot, snapshot_from_top};
pub use split::{refine_runtime_regions, split_by_attributes};
pub use stats::{FreePages, count_free_pages, count_runtime_pages};
pub use table::DescriptorTable;
pub use topdown::allocate_pages_from_top;
