//! A mock firmware for exercising the toolkit end to end on the host.
//!
//! The mock owns its authoritative region list the way real firmware does:
//! fixed-address page allocations carve typed entries out of conventional
//! regions, so the map genuinely grows under allocation, and
//! [`queue_growth`](MockFirmware::queue_growth) can inject extra growth
//! between a size query and the fill call to exercise the snapshot retry
//! path. Page allocations are backed by host buffers handed out through
//! `page_slice`, and the Memory Attributes Table is a real in-memory table
//! behind the configuration-table lookup.

#![allow(dead_code)]

use std::collections::HashMap;
use std::collections::VecDeque;

use core::ffi::c_void;
use core::ptr::NonNull;

use meson_memmap::{AllocateRequest, FirmwareServices, MapError, MapInfo};
use uefi::memory::{
    EfiMemoryAttributesTableHeader, EfiMemoryDescriptor, EfiMemoryType, pages_to_size,
};
use uefi::{EfiGuid, EfiPhysicalAddress, EfiStatus};

/// Stride used by the mock for both the memory map and the attributes
/// table: the descriptor's natural size plus padding, to catch any code
/// that walks by `size_of` instead of the reported stride.
pub const MOCK_STRIDE: usize = core::mem::size_of::<EfiMemoryDescriptor>() + 8;

/// Builds a descriptor with page-granular start.
pub fn desc(start_page: u64, pages: u64, ty: EfiMemoryType, attribute: u64) -> EfiMemoryDescriptor {
    EfiMemoryDescriptor {
        memory_type: ty as u32,
        physical_start: start_page * 0x1000,
        virtual_start: 0,
        number_of_pages: pages,
        attribute,
    }
}

/// Host-side stand-in for the firmware's memory services.
pub struct MockFirmware {
    regions: Vec<EfiMemoryDescriptor>,
    stride: usize,
    map_key: usize,
    attributes: Option<Box<[u8]>>,
    arena: HashMap<u64, Box<[u8]>>,
    growth_queue: VecDeque<Vec<EfiMemoryDescriptor>>,
}

impl MockFirmware {
    /// Starts with the given authoritative region list.
    pub fn new(regions: &[EfiMemoryDescriptor]) -> Self {
        Self {
            regions: regions.to_vec(),
            stride: MOCK_STRIDE,
            map_key: 0,
            attributes: None,
            arena: HashMap::new(),
            growth_queue: VecDeque::new(),
        }
    }

    /// Publishes a Memory Attributes Table holding `entries`.
    pub fn with_attributes(mut self, entries: &[EfiMemoryDescriptor]) -> Self {
        let header_size = core::mem::size_of::<EfiMemoryAttributesTableHeader>();
        let mut bytes = vec![0u8; header_size + entries.len() * self.stride];
        let header = EfiMemoryAttributesTableHeader {
            version: 1,
            number_of_entries: u32::try_from(entries.len()).unwrap(),
            descriptor_size: u32::try_from(self.stride).unwrap(),
            flags: 0,
        };
        // SAFETY: The buffer holds at least a header.
        unsafe {
            bytes
                .as_mut_ptr()
                .cast::<EfiMemoryAttributesTableHeader>()
                .write_unaligned(header);
        }
        for (index, entry) in entries.iter().enumerate() {
            // SAFETY: Offset is in bounds by construction.
            unsafe {
                bytes
                    .as_mut_ptr()
                    .add(header_size + index * self.stride)
                    .cast::<EfiMemoryDescriptor>()
                    .write_unaligned(*entry);
            }
        }
        self.attributes = Some(bytes.into_boxed_slice());
        self
    }

    /// Queues regions that appear in the map after the next `memory_map`
    /// call, simulating growth between a size query and the fill.
    pub fn queue_growth(&mut self, regions: Vec<EfiMemoryDescriptor>) {
        self.growth_queue.push_back(regions);
    }

    /// Current authoritative region list, for assertions.
    pub fn regions(&self) -> &[EfiMemoryDescriptor] {
        &self.regions
    }

    /// Returns the region starting exactly at `address`, if any.
    pub fn region_at(&self, address: EfiPhysicalAddress) -> Option<&EfiMemoryDescriptor> {
        self.regions.iter().find(|r| r.physical_start == address)
    }
}

impl FirmwareServices for MockFirmware {
    fn memory_map(&mut self, buffer: &mut [u8]) -> Result<MapInfo, MapError> {
        let required = self.regions.len() * self.stride;
        let result = if buffer.len() < required {
            Err(MapError::BufferTooSmall {
                required,
                stride: self.stride,
            })
        } else {
            self.map_key += 1;
            for (index, region) in self.regions.iter().enumerate() {
                // SAFETY: index * stride + descriptor size <= required <=
                // buffer.len().
                unsafe {
                    buffer
                        .as_mut_ptr()
                        .add(index * self.stride)
                        .cast::<EfiMemoryDescriptor>()
                        .write_unaligned(*region);
                }
            }
            Ok(MapInfo {
                size: required,
                key: self.map_key,
                stride: self.stride,
                version: 1,
            })
        };

        // The authoritative map may change between calls.
        if let Some(growth) = self.growth_queue.pop_front() {
            self.regions.extend(growth);
        }

        result
    }

    fn allocate_pages(
        &mut self,
        request: AllocateRequest,
        memory_type: u32,
        pages: u64,
    ) -> Result<EfiPhysicalAddress, MapError> {
        let AllocateRequest::Address(address) = request else {
            return Err(MapError::AllocationFailed(EfiStatus::UNSUPPORTED));
        };
        let size = pages_to_size(pages);

        let index = self
            .regions
            .iter()
            .position(|region| {
                region.type_is(EfiMemoryType::ConventionalMemory)
                    && region.contains_range(address, size)
            })
            .ok_or(MapError::AllocationFailed(EfiStatus::NOT_FOUND))?;

        // Carve the typed allocation out of the conventional region, the
        // way real firmware mutates its map.
        let region = self.regions[index];
        let mut replacement = Vec::new();
        if address > region.physical_start {
            let mut head = region;
            head.number_of_pages = (address - region.physical_start) / 0x1000;
            replacement.push(head);
        }
        replacement.push(EfiMemoryDescriptor {
            memory_type,
            physical_start: address,
            virtual_start: 0,
            number_of_pages: pages,
            attribute: region.attribute,
        });
        if address + size < region.physical_end() {
            let mut tail = region;
            tail.physical_start = address + size;
            tail.number_of_pages = (region.physical_end() - tail.physical_start) / 0x1000;
            replacement.push(tail);
        }
        self.regions.splice(index..=index, replacement);

        self.arena
            .insert(address, vec![0u8; usize::try_from(size).unwrap()].into_boxed_slice());
        Ok(address)
    }

    fn free_pages(&mut self, address: EfiPhysicalAddress, pages: u64) -> Result<(), MapError> {
        self.arena.remove(&address);
        match self
            .regions
            .iter_mut()
            .find(|r| r.physical_start == address && r.number_of_pages == pages)
        {
            Some(region) => {
                region.memory_type = EfiMemoryType::ConventionalMemory as u32;
                Ok(())
            }
            None => Err(MapError::AllocationFailed(EfiStatus::NOT_FOUND)),
        }
    }

    fn configuration_table(&self, guid: EfiGuid) -> Option<NonNull<c_void>> {
        if guid != EfiGuid::MEMORY_ATTRIBUTES_TABLE {
            return None;
        }
        self.attributes
            .as_ref()
            .and_then(|table| NonNull::new(table.as_ptr().cast_mut().cast()))
    }

    unsafe fn page_slice(&mut self, address: EfiPhysicalAddress, bytes: usize) -> *mut u8 {
        let allocation = self
            .arena
            .get_mut(&address)
            .expect("page_slice of an address that was never allocated");
        assert!(bytes <= allocation.len(), "page_slice beyond the allocation");
        allocation.as_mut_ptr()
    }
}
