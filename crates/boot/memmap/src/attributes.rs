//! Access to the firmware's Memory Attributes Table.
//!
//! The Memory Attributes Table is a configuration table giving page-level
//! protection flags for runtime-services regions, finer grained than the
//! memory map's own types. The firmware owns it; this module only reads it
//! and patches individual entries in place, never resizing or relocating.

use core::ptr::NonNull;

use uefi::memory::{
    EfiMemoryAttributes, EfiMemoryAttributesTableHeader, EfiMemoryDescriptor,
};
use uefi::{EfiGuid, EfiPhysicalAddress};

use crate::error::MapError;
use crate::firmware::FirmwareServices;

/// A view over the firmware-owned Memory Attributes Table.
///
/// Entries are descriptor-shaped, sorted ascending by physical start,
/// non-overlapping, and contain only runtime-services types. Each entry is
/// expected to lie fully within one memory-map entry of the matching broad
/// class once the map is normalized; that is a firmware contract, asserted
/// where it matters rather than re-derived.
pub struct AttributesTable {
    entries: NonNull<u8>,
    count: usize,
    stride: usize,
}

impl AttributesTable {
    /// Looks the table up in the firmware's configuration registry.
    /// Returns `None` when the firmware does not publish one.
    #[must_use]
    pub fn locate<F: FirmwareServices>(firmware: &F) -> Option<Self> {
        let header = firmware.configuration_table(EfiGuid::MEMORY_ATTRIBUTES_TABLE)?;
        // SAFETY: The registry entry for this GUID is a live memory
        // attributes table for the duration of boot services.
        Some(unsafe { Self::from_header(header.cast()) })
    }

    /// Builds a view from a table header pointer.
    ///
    /// # Safety
    ///
    /// `header` must point to a valid Memory Attributes Table that stays
    /// live and unmoved for the view's lifetime.
    ///
    /// # Panics
    ///
    /// Panics if the header reports a stride below the descriptor size.
    #[must_use]
    pub unsafe fn from_header(header: NonNull<EfiMemoryAttributesTableHeader>) -> Self {
        // SAFETY: Caller guarantees a readable header.
        let head = unsafe { header.as_ptr().read_unaligned() };
        // SAFETY: Entries start immediately after the header.
        let entries = unsafe { NonNull::new_unchecked(header.as_ptr().add(1).cast::<u8>()) };
        unsafe { Self::from_raw_parts(entries, head.number_of_entries as usize, head.descriptor_size as usize) }
    }

    /// Builds a view from raw entry storage, for synthetic tables.
    ///
    /// # Safety
    ///
    /// `entries` must address `count * stride` bytes of descriptor entries
    /// that stay live and unaliased for the view's lifetime.
    ///
    /// # Panics
    ///
    /// Panics if `stride` is below the descriptor size.
    #[must_use]
    pub unsafe fn from_raw_parts(entries: NonNull<u8>, count: usize, stride: usize) -> Self {
        assert!(
            stride >= core::mem::size_of::<EfiMemoryDescriptor>(),
            "stride below descriptor size"
        );
        Self {
            entries,
            count,
            stride,
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The per-entry stride in bytes.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Reads the entry at `index` by value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> EfiMemoryDescriptor {
        assert!(index < self.count, "attribute index out of bounds");
        // SAFETY: index * stride + descriptor size is within the storage
        // the constructor vouched for.
        unsafe {
            self.entries
                .as_ptr()
                .add(index * self.stride)
                .cast::<EfiMemoryDescriptor>()
                .read_unaligned()
        }
    }

    fn set(&mut self, index: usize, entry: &EfiMemoryDescriptor) {
        assert!(index < self.count, "attribute index out of bounds");
        // SAFETY: As in `get`; the view is the exclusive mutator by the
        // firmware's single-threaded contract.
        unsafe {
            self.entries
                .as_ptr()
                .add(index * self.stride)
                .cast::<EfiMemoryDescriptor>()
                .write_unaligned(*entry);
        }
    }

    /// Patches the entry containing `address` in place: sets its type, ORs
    /// in `set_attributes`, then clears `drop_attributes`.
    ///
    /// # Errors
    ///
    /// [`MapError::NotFound`] when no entry contains `address`.
    pub fn update_entry(
        &mut self,
        address: EfiPhysicalAddress,
        memory_type: u32,
        set_attributes: EfiMemoryAttributes,
        drop_attributes: EfiMemoryAttributes,
    ) -> Result<(), MapError> {
        for index in 0..self.count {
            let mut entry = self.get(index);
            if entry.contains_range(address, 1) {
                entry.memory_type = memory_type;
                entry.attribute =
                    (entry.attribute | set_attributes.bits()) & !drop_attributes.bits();
                self.set(index, &entry);
                return Ok(());
            }
        }
        Err(MapError::NotFound)
    }

    /// Number of runtime-services entries; the worst-case descriptor growth
    /// a split pass can cause.
    #[must_use]
    pub fn count_runtime_entries(&self) -> usize {
        (0..self.count)
            .filter(|&index| self.get(index).is_runtime_services())
            .count()
    }
}

/// Runtime-entry count of the published table, or zero when the firmware
/// does not publish one. Used to pre-size snapshot buffers for splitting.
#[must_use]
pub fn count_runtime_entries<F: FirmwareServices>(firmware: &F) -> usize {
    AttributesTable::locate(firmware).map_or(0, |table| table.count_runtime_entries())
}

/// Locates the published table and patches the entry containing `address`.
///
/// # Errors
///
/// [`MapError::Unsupported`] when the table is not published;
/// [`MapError::NotFound`] when no entry contains `address`.
pub fn update_entry<F: FirmwareServices>(
    firmware: &F,
    address: EfiPhysicalAddress,
    memory_type: u32,
    set_attributes: EfiMemoryAttributes,
    drop_attributes: EfiMemoryAttributes,
) -> Result<(), MapError> {
    let mut table = AttributesTable::locate(firmware).ok_or(MapError::Unsupported)?;
    table.update_entry(address, memory_type, set_attributes, drop_attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uefi::memory::EfiMemoryType;

    const DESCRIPTOR_SIZE: usize = core::mem::size_of::<EfiMemoryDescriptor>();

    fn entry(start: u64, pages: u64, ty: EfiMemoryType, attribute: u64) -> EfiMemoryDescriptor {
        EfiMemoryDescriptor {
            memory_type: ty as u32,
            physical_start: start,
            virtual_start: 0,
            number_of_pages: pages,
            attribute,
        }
    }

    /// Serializes entries at the given stride; the buffer must outlive the
    /// returned view.
    fn build(entries: &[EfiMemoryDescriptor], stride: usize) -> (Vec<u8>, AttributesTable) {
        let mut bytes = vec![0u8; entries.len() * stride];
        for (index, e) in entries.iter().enumerate() {
            // SAFETY: Offset is in bounds by construction.
            unsafe {
                bytes
                    .as_mut_ptr()
                    .add(index * stride)
                    .cast::<EfiMemoryDescriptor>()
                    .write_unaligned(*e);
            }
        }
        let ptr = NonNull::new(bytes.as_mut_ptr()).unwrap();
        // SAFETY: `bytes` outlives the view in every test below.
        let table = unsafe { AttributesTable::from_raw_parts(ptr, entries.len(), stride) };
        (bytes, table)
    }

    #[test]
    fn get_reads_at_padded_stride() {
        let entries = [
            entry(0x1000, 1, EfiMemoryType::RuntimeServicesCode, 0),
            entry(0x2000, 2, EfiMemoryType::RuntimeServicesData, 0),
        ];
        let (_bytes, table) = build(&entries, DESCRIPTOR_SIZE + 16);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0), entries[0]);
        assert_eq!(table.get(1), entries[1]);
    }

    #[test]
    fn update_entry_patches_containing_entry() {
        let entries = [
            entry(0x1000, 2, EfiMemoryType::RuntimeServicesCode, 0),
            entry(0x4000, 2, EfiMemoryType::RuntimeServicesData, 0),
        ];
        let (_bytes, mut table) = build(&entries, DESCRIPTOR_SIZE);
        table
            .update_entry(
                0x4800,
                EfiMemoryType::RuntimeServicesCode as u32,
                EfiMemoryAttributes::RO,
                EfiMemoryAttributes::XP,
            )
            .unwrap();
        let patched = table.get(1);
        assert!(patched.type_is(EfiMemoryType::RuntimeServicesCode));
        assert!(patched.attributes().contains(EfiMemoryAttributes::RO));
        // Untouched neighbor.
        assert_eq!(table.get(0), entries[0]);
    }

    #[test]
    fn update_entry_misses_between_entries() {
        let entries = [entry(0x1000, 1, EfiMemoryType::RuntimeServicesCode, 0)];
        let (_bytes, mut table) = build(&entries, DESCRIPTOR_SIZE);
        let result = table.update_entry(
            0x9000,
            EfiMemoryType::RuntimeServicesData as u32,
            EfiMemoryAttributes::empty(),
            EfiMemoryAttributes::empty(),
        );
        assert_eq!(result, Err(MapError::NotFound));
    }

    #[test]
    fn runtime_entry_count_ignores_other_types() {
        let entries = [
            entry(0x1000, 1, EfiMemoryType::RuntimeServicesCode, 0),
            entry(0x2000, 1, EfiMemoryType::ReservedMemoryType, 0),
            entry(0x3000, 1, EfiMemoryType::RuntimeServicesData, 0),
        ];
        let (_bytes, table) = build(&entries, DESCRIPTOR_SIZE);
        assert_eq!(table.count_runtime_entries(), 2);
    }
}
