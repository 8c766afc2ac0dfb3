use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AddressSpace, Hex, LoaderError, MappedSlice, Pa, RegionHandle};

/// Identity of a registered region.
///
/// Identifiers are never reused within a registry, so they can be used to
/// compare registry snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RomId(pub u64);

/// The bytes backing a region.
#[derive(Debug, Clone)]
pub enum RomData {
    /// A private heap buffer.
    Owned(Vec<u8>),

    /// A window into a shared file mapping.
    Mapped(MappedSlice),
}

impl RomData {
    /// Returns the data as a slice.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(data) => data,
            Self::Mapped(data) => data,
        }
    }

    /// Returns the data for modification, copying mapped content first.
    pub fn make_mut(&mut self) -> &mut Vec<u8> {
        if let Self::Mapped(data) = self {
            *self = Self::Owned(data.to_vec());
        }

        match self {
            Self::Owned(data) => data,
            Self::Mapped(_) => unreachable!(),
        }
    }

    /// Returns the number of bytes.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns `true` if there are no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> RomBacking {
        match self {
            Self::Owned(_) => RomBacking::Owned,
            Self::Mapped(_) => RomBacking::Mapped,
        }
    }
}

impl From<Vec<u8>> for RomData {
    fn from(value: Vec<u8>) -> Self {
        Self::Owned(value)
    }
}

impl From<MappedSlice> for RomData {
    fn from(value: MappedSlice) -> Self {
        Self::Mapped(value)
    }
}

/// Where the content of a region goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Placement {
    /// A fixed address in an address space.
    Address {
        /// The address space.
        space: AddressSpace,

        /// The first address.
        address: Pa,
    },

    /// The start of an externally owned region.
    Region(RegionHandle),
}

impl Placement {
    /// Fixed placement in the system address space.
    pub fn fixed(address: impl Into<Pa>) -> Self {
        Self::Address {
            space: AddressSpace::SYSTEM,
            address: address.into(),
        }
    }

    /// Sort key: address-placed regions by space then address, external
    /// regions after them.
    pub(crate) fn order_key(&self) -> (u8, u32, u64) {
        match *self {
            Self::Address { space, address } => (0, u32::from(space.0), address.0),
            Self::Region(region) => (1, region.0, 0),
        }
    }
}

/// A firmware file name made of a directory and a file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FwFile {
    /// Directory, e.g. `genroms`.
    pub dir: Option<String>,

    /// File name.
    pub name: String,
}

impl FwFile {
    /// Returns `dir/name`, or `name` without a directory.
    pub fn path(&self) -> String {
        match &self.dir {
            Some(dir) => format!("{}/{}", dir, self.name),
            None => self.name.clone(),
        }
    }
}

/// A named, placed span of guest image content.
#[derive(Debug)]
pub struct Rom {
    pub(crate) id: RomId,
    pub(crate) name: String,
    pub(crate) path: Option<PathBuf>,
    pub(crate) placement: Placement,
    pub(crate) rom_size: u64,
    pub(crate) data_size: u64,
    pub(crate) data: Option<RomData>,
    pub(crate) fw_file: Option<FwFile>,
    pub(crate) read_only: bool,
    pub(crate) is_rom: bool,
    pub(crate) committed: bool,
}

impl Rom {
    /// Creates a region reserving `rom_size` bytes, the first `data.len()`
    /// of which are backed by `data`.
    pub fn new(
        name: impl Into<String>,
        placement: Placement,
        data: impl Into<RomData>,
        rom_size: u64,
    ) -> Result<Self, LoaderError> {
        let data = data.into();
        let data_size = data.len() as u64;

        if rom_size < data_size {
            return Err(LoaderError::InvalidSize {
                rom_size,
                data_size,
            });
        }

        if let Placement::Address { address, .. } = placement {
            address
                .checked_add(rom_size)
                .ok_or(LoaderError::OutOfBounds)?;
        }

        Ok(Self {
            id: RomId(0),
            name: name.into(),
            path: None,
            placement,
            rom_size,
            data_size,
            data: Some(data),
            fw_file: None,
            read_only: true,
            is_rom: false,
            committed: true,
        })
    }

    /// Sets the source file path.
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..self
        }
    }

    /// Delivers the region through the firmware configuration channel.
    pub fn with_fw_file(self, fw_file: FwFile, read_only: bool) -> Self {
        Self {
            fw_file: Some(fw_file),
            read_only,
            ..self
        }
    }

    /// Returns the identity assigned on insertion.
    pub fn id(&self) -> RomId {
        self.id
    }

    /// Returns the diagnostic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the source file path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the placement.
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Returns the address space and address for address-placed regions.
    pub fn address(&self) -> Option<(AddressSpace, Pa)> {
        match self.placement {
            Placement::Address { space, address } => Some((space, address)),
            Placement::Region(_) => None,
        }
    }

    /// Returns one past the last reserved address.
    pub fn end(&self) -> Option<Pa> {
        self.address()
            .map(|(_, address)| address.wrapping_add(self.rom_size))
    }

    /// Returns the reserved span.
    pub fn rom_size(&self) -> u64 {
        self.rom_size
    }

    /// Returns the number of bytes backed by data.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Returns the private copy of the data, unless it was released.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_ref().map(RomData::as_slice)
    }

    /// Returns the firmware file, if the region is delivered that way.
    pub fn fw_file(&self) -> Option<&FwFile> {
        self.fw_file.as_ref()
    }

    /// Returns `true` if the region targets a ROM-type mapping.
    ///
    /// Resolved when the registry is finalized.
    pub fn is_rom(&self) -> bool {
        self.is_rom
    }

    /// Returns `true` unless the region was added by an open transaction.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Returns `true` if the region takes part in direct memory placement.
    pub(crate) fn is_placed(&self) -> bool {
        self.fw_file.is_none() && matches!(self.placement, Placement::Address { .. })
    }

    /// Describes the region.
    pub fn info(&self) -> RomInfo {
        let (space, address, region) = match self.placement {
            Placement::Address { space, address } => (Some(space), Some(address), None),
            Placement::Region(region) => (None, None, Some(region)),
        };

        RomInfo {
            id: self.id,
            name: self.name.clone(),
            path: self.path.clone(),
            space,
            address,
            region,
            rom_size: self.rom_size,
            data_size: self.data_size,
            fw_file: self.fw_file.as_ref().map(FwFile::path),
            backing: self
                .data
                .as_ref()
                .map(RomData::kind)
                .unwrap_or(RomBacking::Released),
            is_rom: self.is_rom,
            committed: self.committed,
        }
    }
}

/// How the content of a region is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RomBacking {
    /// Private heap buffer.
    Owned,

    /// Shared file mapping.
    Mapped,

    /// The private copy was released after the content reached guest memory.
    Released,
}

/// A description of a registered region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomInfo {
    /// Identity.
    pub id: RomId,

    /// Diagnostic name.
    pub name: String,

    /// Source file path.
    pub path: Option<PathBuf>,

    /// Address space for address-placed regions.
    pub space: Option<AddressSpace>,

    /// Address for address-placed regions.
    pub address: Option<Pa>,

    /// External region handle.
    pub region: Option<RegionHandle>,

    /// Reserved span.
    pub rom_size: u64,

    /// Bytes backed by data.
    pub data_size: u64,

    /// Firmware file path.
    pub fw_file: Option<String>,

    /// Backing kind.
    pub backing: RomBacking,

    /// Whether the region targets a ROM-type mapping.
    pub is_rom: bool,

    /// Whether the region survived its transaction.
    pub committed: bool,
}

impl std::fmt::Display for RomInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(region) = self.region {
            write!(
                f,
                "{} size=0x{:06x} name=\"{}\"",
                region, self.rom_size, self.name
            )
        }
        else if let Some(fw_file) = &self.fw_file {
            write!(
                f,
                "fw={} size=0x{:06x} name=\"{}\"",
                fw_file, self.rom_size, self.name
            )
        }
        else {
            write!(
                f,
                "addr={} size=0x{:06x} mem={} name=\"{}\"",
                Hex(self.address.unwrap_or_default().0),
                self.rom_size,
                if self.is_rom { "rom" } else { "ram" },
                self.name
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MappedFile;

    #[test]
    fn rom_size_must_cover_data() {
        let result = Rom::new("blob", Placement::fixed(0x1000), vec![0u8; 16], 8);

        assert!(matches!(
            result,
            Err(LoaderError::InvalidSize {
                rom_size: 8,
                data_size: 16
            })
        ));
    }

    #[test]
    fn end_must_not_wrap() {
        let result = Rom::new("blob", Placement::fixed(u64::MAX - 4), vec![0u8; 4], 8);
        assert!(matches!(result, Err(LoaderError::OutOfBounds)));
    }

    #[test]
    fn mapped_data_is_copied_on_write() -> Result<(), LoaderError> {
        let file = MappedFile::new(vec![1u8, 2, 3, 4]);
        let mut data = RomData::from(file.slice(0, 4).ok_or(LoaderError::OutOfBounds)?);

        data.make_mut()[0] = 0xff;

        assert_eq!(data.as_slice(), &[0xff, 2, 3, 4]);
        assert_eq!(&file[..], &[1, 2, 3, 4]);
        assert_eq!(file.ref_count(), 1);
        Ok(())
    }

    #[test]
    fn info_display() -> Result<(), LoaderError> {
        let rom = Rom::new("bios.bin", Placement::fixed(0xfffc0000), vec![0u8; 0x100], 0x1000)?;
        assert_eq!(
            rom.info().to_string(),
            "addr=0x00000000fffc0000 size=0x001000 mem=ram name=\"bios.bin\""
        );

        let rom = rom.with_fw_file(
            FwFile {
                dir: Some("genroms".into()),
                name: "bios.bin".into(),
            },
            true,
        );
        assert_eq!(
            rom.info().to_string(),
            "fw=genroms/bios.bin size=0x001000 name=\"bios.bin\""
        );
        Ok(())
    }
}
