mod check;
mod copy;
mod file;
mod gap;
mod reset;

pub use self::{
    file::{FileOptions, get_image_size, load_image_size},
    gap::RomGap,
    reset::ResetMode,
};
use crate::{
    AddressSpace, FirmwareConfig, FwFile, LoaderError, Pa, Placement, Rom, RomData, RomId,
    RomInfo,
};

/// Options for [`RomRegistry::add_blob`].
#[derive(Debug, Clone, Default)]
pub struct BlobOptions {
    /// Reserved span. Defaults to the length of the data; a larger value
    /// zero-fills the tail.
    pub max_len: Option<u64>,

    /// The target address space.
    pub space: AddressSpace,

    /// Deliver the blob as a firmware file with this name.
    pub fw_file: Option<String>,

    /// Publish the firmware file read-only.
    pub read_only: bool,
}

/// The ordered collection of image regions waiting to be placed into
/// guest memory.
///
/// Loaders register regions here while the machine is being set up. Once
/// the machine is complete, [`check_and_register_reset`] validates the
/// layout and freezes the registry; from then on, every machine reset
/// writes the regions into guest memory through [`reset`].
///
/// Regions are kept sorted by address space and address, so the overlap
/// check is a single linear pass.
///
/// [`check_and_register_reset`]: Self::check_and_register_reset
/// [`reset`]: Self::reset
#[derive(Default)]
pub struct RomRegistry {
    roms: Vec<Rom>,
    next_id: u64,
    finalized: bool,
    transaction: bool,
    fw_cfg: Option<Box<dyn FirmwareConfig>>,
}

impl RomRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the firmware configuration channel used for regions delivered
    /// as firmware files.
    pub fn set_firmware_config(&mut self, fw_cfg: impl FirmwareConfig + 'static) {
        self.fw_cfg = Some(Box::new(fw_cfg));
    }

    /// Returns the firmware configuration channel.
    pub fn firmware_config(&self) -> Option<&dyn FirmwareConfig> {
        self.fw_cfg.as_deref()
    }

    /// Returns `true` once the registry has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Returns `true` while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction
    }

    /// Returns the number of registered regions.
    pub fn len(&self) -> usize {
        self.roms.len()
    }

    /// Returns `true` if no region is registered.
    pub fn is_empty(&self) -> bool {
        self.roms.is_empty()
    }

    /// Returns the regions in placement order.
    pub fn iter(&self) -> impl Iterator<Item = &Rom> {
        self.roms.iter()
    }

    /// Returns the region with the given identity.
    pub fn get(&self, id: RomId) -> Option<&Rom> {
        self.roms.iter().find(|rom| rom.id == id)
    }

    /// Returns the identities of all regions in placement order.
    pub fn ids(&self) -> Vec<RomId> {
        self.roms.iter().map(Rom::id).collect()
    }

    /// Describes all regions in placement order.
    pub fn info(&self) -> Vec<RomInfo> {
        self.roms.iter().map(Rom::info).collect()
    }

    /// Registers a region.
    ///
    /// Regions registered inside a transaction stay uncommitted until the
    /// transaction ends.
    pub fn insert(&mut self, mut rom: Rom) -> Result<RomId, LoaderError> {
        if self.finalized {
            tracing::error!(name = %rom.name, "ROM images must be loaded at startup");
            return Err(LoaderError::Finalized);
        }

        let id = RomId(self.next_id);
        self.next_id += 1;

        rom.id = id;
        rom.committed = !self.transaction;

        match rom.placement {
            Placement::Address { space, address } => tracing::debug!(
                name = %rom.name,
                %space,
                %address,
                rom_size = rom.rom_size,
                data_size = rom.data_size,
                "rom added"
            ),
            Placement::Region(region) => tracing::debug!(
                name = %rom.name,
                %region,
                rom_size = rom.rom_size,
                data_size = rom.data_size,
                "rom added"
            ),
        }

        // Equal keys keep their insertion order.
        let key = rom.placement.order_key();
        let index = self
            .roms
            .partition_point(|other| other.placement.order_key() <= key);

        self.roms.insert(index, rom);
        Ok(id)
    }

    /// Registers `data` at `address`, reserving `options.max_len` bytes.
    pub fn add_blob(
        &mut self,
        name: &str,
        data: impl Into<RomData>,
        address: impl Into<Pa>,
        options: BlobOptions,
    ) -> Result<RomId, LoaderError> {
        let data = data.into();
        let rom_size = options.max_len.unwrap_or(data.len() as u64);

        let placement = Placement::Address {
            space: options.space,
            address: address.into(),
        };

        let mut rom = Rom::new(name, placement, data, rom_size)?;
        if let Some(fw_file) = options.fw_file {
            rom = rom.with_fw_file(
                FwFile {
                    dir: None,
                    name: fw_file,
                },
                options.read_only,
            );
        }

        self.insert(rom)
    }

    /// Registers `data` at `address` in the system address space.
    pub fn add_blob_fixed(
        &mut self,
        name: &str,
        data: impl Into<RomData>,
        address: impl Into<Pa>,
    ) -> Result<RomId, LoaderError> {
        self.add_blob(name, data, address, BlobOptions::default())
    }

    /// Registers `data` at `address` in `space`.
    pub fn add_blob_fixed_as(
        &mut self,
        name: &str,
        data: impl Into<RomData>,
        address: impl Into<Pa>,
        space: AddressSpace,
    ) -> Result<RomId, LoaderError> {
        self.add_blob(
            name,
            data,
            address,
            BlobOptions {
                space,
                ..Default::default()
            },
        )
    }

    /// Registers a loadable program segment.
    ///
    /// `rom_size` may exceed the data; the tail is zero-filled on reset.
    pub fn add_elf_program(
        &mut self,
        name: &str,
        data: impl Into<RomData>,
        space: AddressSpace,
        address: Pa,
        rom_size: u64,
    ) -> Result<RomId, LoaderError> {
        let rom = Rom::new(name, Placement::Address { space, address }, data, rom_size)?;
        self.insert(rom)
    }

    /// Starts a transaction.
    ///
    /// Regions registered until [`end_transaction`] are tentative and can
    /// be discarded as a group. Transactions do not nest.
    ///
    /// [`end_transaction`]: Self::end_transaction
    pub fn begin_transaction(&mut self) -> Result<(), LoaderError> {
        if self.transaction {
            return Err(LoaderError::TransactionActive);
        }

        for rom in &mut self.roms {
            rom.committed = true;
        }

        self.transaction = true;
        Ok(())
    }

    /// Ends a transaction, committing its regions on success and removing
    /// them otherwise.
    pub fn end_transaction(&mut self, commit: bool) -> Result<(), LoaderError> {
        if !self.transaction {
            return Err(LoaderError::NoTransaction);
        }

        self.transaction = false;

        if commit {
            for rom in &mut self.roms {
                rom.committed = true;
            }

            return Ok(());
        }

        self.roms.retain(|rom| {
            if !rom.committed {
                tracing::trace!(name = %rom.name, "rom discarded");
            }

            rom.committed
        });

        Ok(())
    }

    /// Runs `f` inside a transaction that is committed if `f` succeeds.
    pub fn transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<LoaderError>,
    {
        self.begin_transaction()?;
        let result = f(self);
        self.end_transaction(result.is_ok())?;
        result
    }

    /// Returns the address-placed regions of `space` in order.
    pub(crate) fn placed_in(&self, space: AddressSpace) -> impl Iterator<Item = (&Rom, Pa)> {
        self.roms
            .iter()
            .filter(|rom| rom.is_placed())
            .filter_map(move |rom| match rom.address() {
                Some((rom_space, address)) if rom_space == space => Some((rom, address)),
                _ => None,
            })
    }
}

impl std::fmt::Debug for RomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RomRegistry")
            .field("roms", &self.roms)
            .field("finalized", &self.finalized)
            .field("transaction", &self.transaction)
            .finish()
    }
}
