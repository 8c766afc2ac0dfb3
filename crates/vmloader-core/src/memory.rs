use std::{
    collections::{BTreeMap, HashMap},
    ops::Range,
};

use crate::{AddressSpace, LoaderError, Pa, RegionHandle};

/// Guest memory as seen by the loader.
///
/// This is the only way the registry touches guest-visible memory. The
/// embedding machine model implements it on top of its own address space
/// and memory region machinery.
pub trait GuestMemory {
    /// Writes `data` at `address` in `space`. Writes into ROM-type mappings
    /// must succeed: the loader seeds ROM content.
    fn write(&mut self, space: AddressSpace, address: Pa, data: &[u8]) -> Result<(), LoaderError>;

    /// Fills `count` bytes at `address` in `space` with `value`.
    fn fill(
        &mut self,
        space: AddressSpace,
        address: Pa,
        value: u8,
        count: u64,
    ) -> Result<(), LoaderError>;

    /// Writes `data` at `offset` inside an external region.
    fn write_region(
        &mut self,
        region: RegionHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), LoaderError> {
        let _ = (offset, data);
        Err(LoaderError::UnknownRegion(region))
    }

    /// Fills `count` bytes at `offset` inside an external region.
    fn fill_region(
        &mut self,
        region: RegionHandle,
        offset: u64,
        value: u8,
        count: u64,
    ) -> Result<(), LoaderError> {
        let _ = (offset, value, count);
        Err(LoaderError::UnknownRegion(region))
    }

    /// Returns the size of an external region.
    fn region_size(&self, region: RegionHandle) -> Option<u64> {
        let _ = region;
        None
    }

    /// Returns `true` if `address` resolves to a ROM-type mapping.
    fn is_rom(&self, space: AddressSpace, address: Pa) -> bool {
        let _ = (space, address);
        false
    }

    /// Returns `true` if the external region is a ROM.
    fn is_rom_region(&self, region: RegionHandle) -> bool {
        let _ = region;
        false
    }

    /// Returns a human readable name of the address space.
    fn space_name(&self, space: AddressSpace) -> Option<&str> {
        let _ = space;
        None
    }
}

struct Region {
    data: Vec<u8>,
    rom: bool,
}

/// Sparse, page-granular guest memory.
///
/// Pages are allocated on first write; unwritten memory reads as zero.
/// Useful for probing images offline and in tests.
#[derive(Default)]
pub struct PagedMemory {
    pages: HashMap<(AddressSpace, u64), Box<[u8]>>,
    regions: BTreeMap<RegionHandle, Region>,
    rom_ranges: Vec<(AddressSpace, Range<u64>)>,
    names: HashMap<AddressSpace, String>,
}

impl PagedMemory {
    /// Page size used for the backing store.
    pub const PAGE_SIZE: u64 = 4096;

    /// Page shift used for the backing store.
    pub const PAGE_SHIFT: u64 = 12;

    /// Creates an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names an address space for diagnostics.
    pub fn with_space_name(mut self, space: AddressSpace, name: impl Into<String>) -> Self {
        self.names.insert(space, name.into());
        self
    }

    /// Marks `range` in `space` as a ROM-type mapping.
    pub fn with_rom_range(mut self, space: AddressSpace, range: Range<u64>) -> Self {
        self.rom_ranges.push((space, range));
        self
    }

    /// Creates an external region of `size` bytes.
    pub fn with_region(mut self, region: RegionHandle, size: usize, rom: bool) -> Self {
        self.regions.insert(
            region,
            Region {
                data: vec![0; size],
                rom,
            },
        );
        self
    }

    /// Reads guest memory into `buffer`.
    pub fn read(&self, space: AddressSpace, address: Pa, buffer: &mut [u8]) {
        let mut address = address.0;
        let mut buffer = buffer;

        while !buffer.is_empty() {
            let gfn = address >> Self::PAGE_SHIFT;
            let offset = (address & (Self::PAGE_SIZE - 1)) as usize;
            let size = buffer.len().min(Self::PAGE_SIZE as usize - offset);

            let (chunk, rest) = std::mem::take(&mut buffer).split_at_mut(size);
            match self.pages.get(&(space, gfn)) {
                Some(page) => chunk.copy_from_slice(&page[offset..offset + size]),
                None => chunk.fill(0),
            }

            buffer = rest;
            address = address.wrapping_add(size as u64);
        }
    }

    /// Reads `len` bytes of guest memory.
    pub fn read_vec(&self, space: AddressSpace, address: Pa, len: usize) -> Vec<u8> {
        let mut buffer = vec![0; len];
        self.read(space, address, &mut buffer);
        buffer
    }

    /// Returns the content of an external region.
    pub fn region(&self, region: RegionHandle) -> Option<&[u8]> {
        self.regions.get(&region).map(|region| region.data.as_slice())
    }

    /// Returns the number of allocated pages.
    pub fn allocated_pages(&self) -> usize {
        self.pages.len()
    }

    fn for_each_chunk(
        &mut self,
        space: AddressSpace,
        address: Pa,
        count: u64,
        allocate: bool,
        mut f: impl FnMut(&mut [u8], u64),
    ) -> Result<(), LoaderError> {
        if count == 0 {
            return Ok(());
        }

        address
            .0
            .checked_add(count - 1)
            .ok_or(LoaderError::OutOfBounds)?;

        let mut address = address.0;
        let mut done = 0;

        while done < count {
            let gfn = address >> Self::PAGE_SHIFT;
            let offset = address & (Self::PAGE_SIZE - 1);
            let size = (count - done).min(Self::PAGE_SIZE - offset);

            let range = offset as usize..(offset + size) as usize;

            if allocate {
                let page = self
                    .pages
                    .entry((space, gfn))
                    .or_insert_with(|| vec![0; Self::PAGE_SIZE as usize].into_boxed_slice());
                f(&mut page[range], done);
            } else if let Some(page) = self.pages.get_mut(&(space, gfn)) {
                f(&mut page[range], done);
            }

            done += size;
            address = address.wrapping_add(size);
        }

        Ok(())
    }
}

impl GuestMemory for PagedMemory {
    fn write(&mut self, space: AddressSpace, address: Pa, data: &[u8]) -> Result<(), LoaderError> {
        self.for_each_chunk(space, address, data.len() as u64, true, |chunk, done| {
            let done = done as usize;
            chunk.copy_from_slice(&data[done..done + chunk.len()]);
        })
    }

    fn fill(
        &mut self,
        space: AddressSpace,
        address: Pa,
        value: u8,
        count: u64,
    ) -> Result<(), LoaderError> {
        // Absent pages already read as zero.
        let allocate = value != 0;
        self.for_each_chunk(space, address, count, allocate, |chunk, _| chunk.fill(value))
    }

    fn write_region(
        &mut self,
        region: RegionHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), LoaderError> {
        let target = self
            .regions
            .get_mut(&region)
            .ok_or(LoaderError::UnknownRegion(region))?;

        let start = usize::try_from(offset).map_err(|_| LoaderError::OutOfBounds)?;
        let end = start
            .checked_add(data.len())
            .ok_or(LoaderError::OutOfBounds)?;

        target
            .data
            .get_mut(start..end)
            .ok_or(LoaderError::OutOfBounds)?
            .copy_from_slice(data);

        Ok(())
    }

    fn fill_region(
        &mut self,
        region: RegionHandle,
        offset: u64,
        value: u8,
        count: u64,
    ) -> Result<(), LoaderError> {
        let target = self
            .regions
            .get_mut(&region)
            .ok_or(LoaderError::UnknownRegion(region))?;

        let start = usize::try_from(offset).map_err(|_| LoaderError::OutOfBounds)?;
        let count = usize::try_from(count).map_err(|_| LoaderError::OutOfBounds)?;
        let end = start.checked_add(count).ok_or(LoaderError::OutOfBounds)?;

        target
            .data
            .get_mut(start..end)
            .ok_or(LoaderError::OutOfBounds)?
            .fill(value);

        Ok(())
    }

    fn region_size(&self, region: RegionHandle) -> Option<u64> {
        self.regions
            .get(&region)
            .map(|region| region.data.len() as u64)
    }

    fn is_rom(&self, space: AddressSpace, address: Pa) -> bool {
        self.rom_ranges
            .iter()
            .any(|(rom_space, range)| *rom_space == space && range.contains(&address.0))
    }

    fn is_rom_region(&self, region: RegionHandle) -> bool {
        self.regions.get(&region).is_some_and(|region| region.rom)
    }

    fn space_name(&self, space: AddressSpace) -> Option<&str> {
        self.names.get(&space).map(String::as_str)
    }
}
