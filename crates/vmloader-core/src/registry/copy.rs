use super::RomRegistry;
use crate::{AddressSpace, Pa, Rom};

impl RomRegistry {
    /// Copies the registered content of `[address, address + dest.len())`
    /// in the system address space into `dest`.
    ///
    /// See [`copy_as`](Self::copy_as).
    pub fn copy(&self, dest: &mut [u8], address: impl Into<Pa>) -> usize {
        self.copy_as(AddressSpace::SYSTEM, dest, address)
    }

    /// Copies the registered content of `[address, address + dest.len())`
    /// in `space` into `dest`.
    ///
    /// Regions partially inside the range contribute their overlapping
    /// part; reserved bytes past a region's data are copied as zeros. Bytes
    /// not covered by any region are left untouched. Returns the number of
    /// bytes from the start of `dest` up to the end of the last byte
    /// written.
    pub fn copy_as(&self, space: AddressSpace, dest: &mut [u8], address: impl Into<Pa>) -> usize {
        let start = address.into().0;
        let end = start.saturating_add(dest.len() as u64);
        let mut written = 0;

        for (rom, rom_address) in self.placed_in(space) {
            let rom_start = rom_address.0;
            let rom_end = rom_start.saturating_add(rom.rom_size);

            if rom_end <= start || rom_start >= end {
                continue;
            }

            let Some(data) = rom.data()
            else {
                tracing::trace!(name = %rom.name, "rom data released, skipping");
                continue;
            };

            let from = rom_start.max(start);
            let to = rom_end.min(end);

            let data_end = rom_start + rom.data_size;

            // Data part.
            if from < data_end {
                let copy_to = to.min(data_end);
                let src = &data[(from - rom_start) as usize..(copy_to - rom_start) as usize];
                let dst = (from - start) as usize;
                dest[dst..dst + src.len()].copy_from_slice(src);
            }

            // Zero-filled tail.
            if to > data_end {
                let zero_from = from.max(data_end);
                dest[(zero_from - start) as usize..(to - start) as usize].fill(0);
            }

            written = written.max((to - start) as usize);
        }

        written
    }

    /// Returns the registered bytes of `[address, address + size)` in the
    /// system address space.
    pub fn rom_ptr(&self, address: impl Into<Pa>, size: u64) -> Option<&[u8]> {
        self.rom_ptr_as(AddressSpace::SYSTEM, address, size)
    }

    /// Returns the registered bytes of `[address, address + size)` in
    /// `space`.
    ///
    /// The range must lie within the data of a single region.
    pub fn rom_ptr_as(&self, space: AddressSpace, address: impl Into<Pa>, size: u64) -> Option<&[u8]> {
        let address = address.into();
        let (rom, offset) = self.find_rom(space, address, size)?;

        rom.data()?.get(offset..offset + size as usize)
    }

    /// Returns the registered bytes of `[address, address + size)` in the
    /// system address space for patching before reset.
    ///
    /// Data borrowed from a mapped file is copied first.
    pub fn rom_ptr_mut(&mut self, address: impl Into<Pa>, size: u64) -> Option<&mut [u8]> {
        let address = address.into();
        let space = AddressSpace::SYSTEM;
        let (rom, offset) = self.find_rom(space, address, size)?;
        let id = rom.id;

        let rom = self.roms.iter_mut().find(|rom| rom.id == id)?;
        rom.data
            .as_mut()?
            .make_mut()
            .get_mut(offset..offset + size as usize)
    }

    fn find_rom(&self, space: AddressSpace, address: Pa, size: u64) -> Option<(&Rom, usize)> {
        let end = address.checked_add(size)?;

        self.placed_in(space)
            .find(|(rom, rom_address)| {
                *rom_address <= address && end <= rom_address.wrapping_add(rom.data_size)
            })
            .map(|(rom, rom_address)| (rom, (address - rom_address) as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LoaderError, MappedFile};

    #[test]
    fn copy_handles_partial_overlaps() -> Result<(), LoaderError> {
        let mut registry = RomRegistry::new();
        registry.add_blob_fixed("head", vec![0x11; 0x10], 0xff8u64)?;
        registry.add_elf_program("bss", vec![0x22; 4], AddressSpace::SYSTEM, Pa(0x1008), 8)?;

        let mut dest = [0xee; 0x20];
        let written = registry.copy(&mut dest, 0x1000u64);

        let mut expected = [0xee; 0x20];
        expected[..8].fill(0x11);
        expected[8..12].fill(0x22);
        expected[12..16].fill(0);

        assert_eq!(written, 16);
        assert_eq!(dest, expected);
        Ok(())
    }

    #[test]
    fn rom_ptr_stays_within_data() -> Result<(), LoaderError> {
        let mut registry = RomRegistry::new();
        registry.add_elf_program("seg", vec![1u8, 2, 3, 4], AddressSpace::SYSTEM, Pa(0x100), 8)?;

        assert_eq!(registry.rom_ptr(0x101u64, 2), Some(&[2u8, 3][..]));
        assert_eq!(registry.rom_ptr(0x103u64, 2), None);
        assert_eq!(registry.rom_ptr(0xffu64, 1), None);
        Ok(())
    }

    #[test]
    fn rom_ptr_mut_copies_mapped_data() -> Result<(), LoaderError> {
        let file = MappedFile::new(vec![0u8; 8]);
        let slice = file.slice(0, 8).ok_or(LoaderError::OutOfBounds)?;

        let mut registry = RomRegistry::new();
        registry.add_blob_fixed("dtb", slice, 0x4000u64)?;

        registry
            .rom_ptr_mut(0x4004u64, 2)
            .ok_or(LoaderError::OutOfBounds)?
            .copy_from_slice(&[0xd0, 0x0d]);

        assert_eq!(
            registry.rom_ptr(0x4000u64, 8),
            Some(&[0u8, 0, 0, 0, 0xd0, 0x0d, 0, 0][..])
        );
        assert_eq!(&file[..], &[0u8; 8]);
        Ok(())
    }
}
