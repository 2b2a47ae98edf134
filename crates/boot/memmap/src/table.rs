//! The owned, stride-aware descriptor table.
//!
//! A [`DescriptorTable`] is a snapshot of the firmware memory map: a byte
//! buffer holding descriptor entries `stride` bytes apart, where `stride`
//! is whatever the firmware reported and may exceed
//! `size_of::<EfiMemoryDescriptor>()`. Entries are always read and written
//! by value through unaligned copies of the descriptor's defined fields;
//! the buffer is never walked by the structure's natural size, and trailing
//! stride padding is preserved across edits.
//!
//! Capacity is fixed at construction (`buffer_len / stride`); every
//! mutating operation maintains `len <= capacity`, and [`insert_at`]
//! surfaces exhaustion as a result instead of writing past the end.
//!
//! [`insert_at`]: DescriptorTable::insert_at

use alloc::vec;
use alloc::vec::Vec;
use core::ptr::NonNull;

use uefi::EfiPhysicalAddress;
use uefi::memory::{EfiMemoryAttributes, EfiMemoryDescriptor, size_to_pages};

use crate::error::MapError;
use crate::firmware::{FirmwareServices, MapInfo};

/// The size of the descriptor's defined fields; the floor for any stride.
const DESCRIPTOR_SIZE: usize = core::mem::size_of::<EfiMemoryDescriptor>();

/// Backing storage for a descriptor table.
#[derive(Debug, PartialEq)]
enum Storage {
    /// Heap buffer (firmware pool memory in a boot environment).
    Heap(Vec<u8>),
    /// Firmware page allocation, used when the snapshot buffer itself must
    /// avoid a reserved address range. Freed by
    /// [`DescriptorTable::release`], not on drop.
    FirmwarePages {
        /// Physical base of the allocation.
        base: EfiPhysicalAddress,
        /// Identity-mapped view of the allocation.
        ptr: NonNull<u8>,
        /// Whole-page byte length of the allocation.
        bytes: usize,
    },
}

/// An owned memory-map snapshot with stride-opaque entry storage.
#[derive(Debug, PartialEq)]
pub struct DescriptorTable {
    storage: Storage,
    stride: usize,
    len: usize,
    key: usize,
    descriptor_version: u32,
}

impl DescriptorTable {
    /// Builds a heap-backed table from descriptor values, with room for
    /// `capacity` entries at the given stride. Intended for synthetic maps
    /// (handoff tables, tests).
    ///
    /// # Panics
    ///
    /// Panics if `stride` is below the descriptor size or `capacity` is
    /// below `entries.len()`.
    #[must_use]
    pub fn from_entries(
        entries: &[EfiMemoryDescriptor],
        capacity: usize,
        stride: usize,
    ) -> Self {
        assert!(stride >= DESCRIPTOR_SIZE, "stride below descriptor size");
        assert!(capacity >= entries.len(), "capacity below entry count");
        let mut table = Self {
            storage: Storage::Heap(vec![0u8; capacity * stride]),
            stride,
            len: entries.len(),
            key: 0,
            descriptor_version: 1,
        };
        for (index, entry) in entries.iter().enumerate() {
            table.set(index, entry);
        }
        table
    }

    /// Wraps a filled snapshot buffer. The buffer's slack beyond
    /// `info.size` becomes spare capacity.
    pub(crate) fn from_snapshot_buffer(buffer: Vec<u8>, info: &MapInfo) -> Self {
        assert!(info.stride >= DESCRIPTOR_SIZE, "stride below descriptor size");
        Self {
            len: info.size / info.stride,
            stride: info.stride,
            key: info.key,
            descriptor_version: info.version,
            storage: Storage::Heap(buffer),
        }
    }

    /// Wraps a filled snapshot held in firmware pages.
    ///
    /// # Safety
    ///
    /// `ptr` must address `bytes` bytes of a live page allocation starting
    /// at physical `base`, exclusively owned by this table until
    /// [`release`](Self::release).
    pub(crate) unsafe fn from_firmware_pages(
        base: EfiPhysicalAddress,
        ptr: NonNull<u8>,
        bytes: usize,
        info: &MapInfo,
    ) -> Self {
        assert!(info.stride >= DESCRIPTOR_SIZE, "stride below descriptor size");
        Self {
            len: info.size / info.stride,
            stride: info.stride,
            key: info.key,
            descriptor_version: info.version,
            storage: Storage::FirmwarePages { base, ptr, bytes },
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum entries the backing storage can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer_len() / self.stride
    }

    /// The per-entry stride in bytes.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The opaque map key from the snapshot, if any. Pass-through only.
    #[must_use]
    pub fn key(&self) -> usize {
        self.key
    }

    /// The firmware descriptor format version from the snapshot.
    #[must_use]
    pub fn descriptor_version(&self) -> u32 {
        self.descriptor_version
    }

    fn buffer_len(&self) -> usize {
        match &self.storage {
            Storage::Heap(buffer) => buffer.len(),
            Storage::FirmwarePages { bytes, .. } => *bytes,
        }
    }

    fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Heap(buffer) => buffer,
            // SAFETY: Construction guarantees `ptr` addresses `bytes` live
            // bytes exclusively owned by this table.
            Storage::FirmwarePages { ptr, bytes, .. } => unsafe {
                core::slice::from_raw_parts(ptr.as_ptr(), *bytes)
            },
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Heap(buffer) => buffer,
            // SAFETY: As in `bytes`, plus `&mut self` gives unique access.
            Storage::FirmwarePages { ptr, bytes, .. } => unsafe {
                core::slice::from_raw_parts_mut(ptr.as_ptr(), *bytes)
            },
        }
    }

    /// Reads the entry at `index` by value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> EfiMemoryDescriptor {
        assert!(index < self.len, "descriptor index out of bounds");
        let offset = index * self.stride;
        // SAFETY: offset + DESCRIPTOR_SIZE <= len * stride <= buffer_len,
        // and read_unaligned has no alignment requirement.
        unsafe { core::ptr::read_unaligned(self.bytes()[offset..].as_ptr().cast()) }
    }

    /// Overwrites the defined fields of the entry at `index`, leaving any
    /// stride padding untouched.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, entry: &EfiMemoryDescriptor) {
        assert!(index < self.len, "descriptor index out of bounds");
        let offset = index * self.stride;
        // SAFETY: As in `get`; write_unaligned has no alignment requirement.
        unsafe {
            core::ptr::write_unaligned(self.bytes_mut()[offset..].as_mut_ptr().cast(), *entry);
        }
    }

    /// Iterates the entries by value, in table order.
    pub fn iter(&self) -> impl Iterator<Item = EfiMemoryDescriptor> + '_ {
        (0..self.len).map(|index| self.get(index))
    }

    /// Inserts `entry` at `index`, shifting the tail right by one slot with
    /// a single block copy.
    ///
    /// # Errors
    ///
    /// [`MapError::OutOfResources`] when the table is at capacity; the
    /// table is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert_at(&mut self, index: usize, entry: &EfiMemoryDescriptor) -> Result<(), MapError> {
        assert!(index <= self.len, "insertion index out of bounds");
        if self.len == self.capacity() {
            return Err(MapError::OutOfResources);
        }
        let stride = self.stride;
        let used = self.len * stride;
        let offset = index * stride;
        self.bytes_mut().copy_within(offset..used, offset + stride);
        self.len += 1;
        self.set(index, entry);
        Ok(())
    }

    /// Removes `count` consecutive entries starting at `index`, compacting
    /// the tail with a single block copy.
    ///
    /// # Panics
    ///
    /// Panics if the run is empty or extends past the end.
    pub fn remove_run(&mut self, index: usize, count: usize) {
        assert!(count > 0, "empty removal run");
        assert!(index + count <= self.len, "removal run out of bounds");
        let stride = self.stride;
        let used = self.len * stride;
        self.bytes_mut()
            .copy_within((index + count) * stride..used, index * stride);
        self.len -= count;
    }

    /// Rewrites the type and attributes of the entry containing `address`.
    ///
    /// `set_attributes` is OR-ed in, then `drop_attributes` is cleared.
    ///
    /// # Errors
    ///
    /// [`MapError::NotFound`] when no entry contains `address`.
    pub fn update_at(
        &mut self,
        address: EfiPhysicalAddress,
        memory_type: u32,
        set_attributes: EfiMemoryAttributes,
        drop_attributes: EfiMemoryAttributes,
    ) -> Result<(), MapError> {
        for index in 0..self.len {
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

    /// Returns page-backed storage to the firmware. Heap-backed tables are
    /// freed on drop and accept this call as a no-op.
    ///
    /// # Errors
    ///
    /// Propagates [`MapError::AllocationFailed`] from the firmware.
    pub fn release<F: FirmwareServices>(self, firmware: &mut F) -> Result<(), MapError> {
        match self.storage {
            Storage::Heap(_) => Ok(()),
            Storage::FirmwarePages { base, bytes, .. } => {
                firmware.free_pages(base, size_to_pages(bytes as u64))
            }
        }
    }
}
