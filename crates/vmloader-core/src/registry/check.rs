use super::RomRegistry;
use crate::{
    AddressSpace, GuestMemory, LoaderError, Overlap, Overlaps, Pa, Placement, Rom, RomSpan,
};

impl RomRegistry {
    /// Checks the layout for overlaps and freezes the registry.
    ///
    /// Every overlapping pair of placed regions in the same address space is
    /// reported, not just the first one. On success, each region learns
    /// whether it targets a ROM-type mapping, firmware files are published
    /// to the firmware configuration channel, and no further region can be
    /// registered.
    pub fn check_and_register_reset(
        &mut self,
        memory: &impl GuestMemory,
    ) -> Result<(), LoaderError> {
        if self.transaction {
            return Err(LoaderError::TransactionActive);
        }

        let overlaps = self.overlaps(memory);
        if !overlaps.is_empty() {
            for overlap in &overlaps {
                tracing::error!(
                    space = %overlap.space_name,
                    first = %overlap.first,
                    second = %overlap.second,
                    "rom regions overlap"
                );
            }

            return Err(LoaderError::Overlap(overlaps));
        }

        for rom in &self.roms {
            if let Placement::Region(region) = rom.placement {
                let size = memory
                    .region_size(region)
                    .ok_or(LoaderError::UnknownRegion(region))?;

                if rom.rom_size > size {
                    return Err(LoaderError::TooBig {
                        size: rom.rom_size,
                        limit: size,
                    });
                }
            }
        }

        for rom in &mut self.roms {
            if rom.fw_file.is_some() {
                continue;
            }

            rom.is_rom = match rom.placement {
                Placement::Address { space, address } => memory.is_rom(space, address),
                Placement::Region(region) => memory.is_rom_region(region),
            };
        }

        self.publish_firmware_files();

        self.finalized = true;
        Ok(())
    }

    /// Returns every overlapping pair of placed regions.
    pub fn overlaps(&self, memory: &impl GuestMemory) -> Overlaps {
        let mut overlaps = Overlaps::new();

        // Regions of the current space that reach past the current address.
        let mut open: Vec<(&Rom, Pa)> = Vec::new();
        let mut current: Option<AddressSpace> = None;

        for rom in self.roms.iter().filter(|rom| rom.is_placed()) {
            let Some((space, address)) = rom.address()
            else {
                continue;
            };

            if current != Some(space) {
                open.clear();
                current = Some(space);
            }

            open.retain(|&(_, end)| end > address);

            for &(open_rom, _) in &open {
                overlaps.push(Overlap {
                    space,
                    space_name: memory.space_name(space).unwrap_or("anonymous").into(),
                    first: span(open_rom),
                    second: span(rom),
                });
            }

            open.push((rom, address.wrapping_add(rom.rom_size)));
        }

        overlaps
    }

    fn publish_firmware_files(&mut self) {
        for rom in &self.roms {
            let Some(fw_file) = &rom.fw_file
            else {
                continue;
            };

            let path = fw_file.path();

            match (&mut self.fw_cfg, &rom.data) {
                (Some(fw_cfg), Some(data)) => {
                    tracing::debug!(name = %rom.name, %path, "firmware file published");
                    fw_cfg.add_file(&path, data.as_slice(), rom.read_only);
                }
                (None, _) => {
                    tracing::warn!(name = %rom.name, %path, "no firmware configuration channel");
                }
                (_, None) => {}
            }
        }
    }
}

fn span(rom: &Rom) -> RomSpan {
    let start = rom.address().map(|(_, address)| address).unwrap_or_default();

    RomSpan {
        name: rom.name.clone(),
        start,
        end: start.wrapping_add(rom.rom_size),
    }
}
