use serde::{Deserialize, Serialize};

use super::RomRegistry;
use crate::{GuestMemory, LoaderError, Placement};

/// How guest memory is brought up on reset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetMode {
    /// Write every region into guest memory.
    #[default]
    Normal,

    /// Guest memory arrives with an incoming migration stream. Nothing is
    /// written, ROM copies are released.
    IncomingMigration,
}

impl RomRegistry {
    /// Writes every region into guest memory.
    ///
    /// Each region's data is written at its placement and the rest of the
    /// reserved span is zero-filled. Regions backing ROM-type mappings are
    /// written once and their private copy is released afterwards; other
    /// regions keep their copy so that every reset restores them.
    #[tracing::instrument(skip_all)]
    pub fn reset(
        &mut self,
        memory: &mut impl GuestMemory,
        mode: ResetMode,
    ) -> Result<(), LoaderError> {
        if !self.finalized {
            return Err(LoaderError::NotFinalized);
        }

        for rom in &mut self.roms {
            if rom.fw_file.is_some() {
                continue;
            }

            if mode == ResetMode::IncomingMigration {
                if rom.is_rom && rom.data.take().is_some() {
                    tracing::trace!(name = %rom.name, "rom released");
                }

                continue;
            }

            let Some(data) = &rom.data
            else {
                continue;
            };

            let data = data.as_slice();
            let tail = rom.rom_size - rom.data_size;

            match rom.placement {
                Placement::Address { space, address } => {
                    memory.write(space, address, data)?;
                    memory.fill(space, address + rom.data_size, 0, tail)?;
                }
                Placement::Region(region) => {
                    memory.write_region(region, 0, data)?;
                    memory.fill_region(region, rom.data_size, 0, tail)?;
                }
            }

            tracing::trace!(
                name = %rom.name,
                data_size = rom.data_size,
                rom_size = rom.rom_size,
                "rom written"
            );

            if rom.is_rom {
                rom.data = None;
            }
        }

        Ok(())
    }
}
