use std::{fs::File, io::Read as _, path::Path};

use super::RomRegistry;
use crate::{
    AddressSpace, FwFile, GuestMemory, LoaderError, MappedFile, Pa, Placement, RegionHandle, Rom,
    RomId,
};

/// Options for [`RomRegistry::add_file`].
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Deliver the file as a firmware file in this directory.
    pub fw_dir: Option<String>,

    /// The target address.
    pub address: Pa,

    /// The target address space. Mutually exclusive with `region`.
    pub space: Option<AddressSpace>,

    /// Place the file at the start of an external region.
    pub region: Option<RegionHandle>,
}

/// Returns the size of the file at `path`.
pub fn get_image_size(path: impl AsRef<Path>) -> Result<u64, LoaderError> {
    Ok(std::fs::metadata(path)?.len())
}

/// Reads the start of the file at `path` into `buffer`.
///
/// Returns the number of bytes read, which is less than the length of
/// `buffer` for shorter files.
pub fn load_image_size(path: impl AsRef<Path>, buffer: &mut [u8]) -> Result<usize, LoaderError> {
    let mut file = File::open(path)?;
    let mut done = 0;

    while done < buffer.len() {
        match file.read(&mut buffer[done..])? {
            0 => break,
            count => done += count,
        }
    }

    Ok(done)
}

impl RomRegistry {
    /// Registers the content of the file at `path`.
    ///
    /// The file is memory mapped and shared with the region. With a
    /// firmware directory, the region is delivered as the firmware file
    /// `fw_dir/<file name>` instead of being placed.
    pub fn add_file(
        &mut self,
        path: impl AsRef<Path>,
        options: FileOptions,
    ) -> Result<RomId, LoaderError> {
        let path = path.as_ref();

        let placement = match (options.space, options.region) {
            (Some(_), Some(_)) => return Err(LoaderError::ConflictingPlacement),
            (_, Some(region)) => Placement::Region(region),
            (space, None) => Placement::Address {
                space: space.unwrap_or_default(),
                address: options.address,
            },
        };

        let file = MappedFile::open(path).inspect_err(|err| {
            tracing::error!(path = %path.display(), %err, "could not open image file");
        })?;

        let size = file.len();
        let data = file.slice(0, size).ok_or(LoaderError::OutOfBounds)?;

        let mut rom = Rom::new(path.display().to_string(), placement, data, size as u64)?
            .with_path(path);

        if let Some(dir) = options.fw_dir {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            rom = rom.with_fw_file(
                FwFile {
                    dir: Some(dir),
                    name,
                },
                true,
            );
        }

        self.insert(rom)
    }

    /// Registers the file at `address` in the system address space.
    pub fn add_file_fixed(
        &mut self,
        path: impl AsRef<Path>,
        address: impl Into<Pa>,
    ) -> Result<RomId, LoaderError> {
        self.add_file_fixed_as(path, address, AddressSpace::SYSTEM)
    }

    /// Registers the file at `address` in `space`.
    pub fn add_file_fixed_as(
        &mut self,
        path: impl AsRef<Path>,
        address: impl Into<Pa>,
        space: AddressSpace,
    ) -> Result<RomId, LoaderError> {
        self.add_file(
            path,
            FileOptions {
                address: address.into(),
                space: Some(space),
                ..Default::default()
            },
        )
    }

    /// Registers the file at the start of an external region.
    pub fn add_file_region(
        &mut self,
        path: impl AsRef<Path>,
        region: RegionHandle,
    ) -> Result<RomId, LoaderError> {
        self.add_file(
            path,
            FileOptions {
                region: Some(region),
                ..Default::default()
            },
        )
    }

    /// Registers an option ROM delivered as firmware file `genroms/<name>`.
    pub fn add_option_rom(&mut self, path: impl AsRef<Path>) -> Result<RomId, LoaderError> {
        self.add_file(
            path,
            FileOptions {
                fw_dir: Some("genroms".into()),
                ..Default::default()
            },
        )
    }

    /// Registers a VGA ROM delivered as firmware file `vgaroms/<name>`.
    pub fn add_vga_rom(&mut self, path: impl AsRef<Path>) -> Result<RomId, LoaderError> {
        self.add_file(
            path,
            FileOptions {
                fw_dir: Some("vgaroms".into()),
                ..Default::default()
            },
        )
    }

    /// Registers the file at `address` if it is at most `max_size` bytes.
    ///
    /// Returns the size of the file. Empty files register nothing.
    pub fn load_image_targphys(
        &mut self,
        path: impl AsRef<Path>,
        address: impl Into<Pa>,
        max_size: u64,
    ) -> Result<u64, LoaderError> {
        self.load_image_targphys_as(path, address, max_size, AddressSpace::SYSTEM)
    }

    /// Registers the file at `address` in `space` if it is at most
    /// `max_size` bytes.
    pub fn load_image_targphys_as(
        &mut self,
        path: impl AsRef<Path>,
        address: impl Into<Pa>,
        max_size: u64,
        space: AddressSpace,
    ) -> Result<u64, LoaderError> {
        let path = path.as_ref();
        let size = get_image_size(path)?;

        if size > max_size {
            return Err(LoaderError::TooBig {
                size,
                limit: max_size,
            });
        }

        if size > 0 {
            self.add_file_fixed_as(path, address, space)?;
        }

        Ok(size)
    }

    /// Registers the file at the start of an external region it fits in.
    pub fn load_image_mr(
        &mut self,
        memory: &impl GuestMemory,
        path: impl AsRef<Path>,
        region: RegionHandle,
    ) -> Result<u64, LoaderError> {
        let path = path.as_ref();
        let limit = memory
            .region_size(region)
            .ok_or(LoaderError::UnknownRegion(region))?;

        let size = get_image_size(path)?;
        if size > limit {
            return Err(LoaderError::TooBig { size, limit });
        }

        if size > 0 {
            self.add_file_region(path, region)?;
        }

        Ok(size)
    }

    /// Registers `source` as a NUL-terminated string of at most `buf_size`
    /// bytes at `address`.
    ///
    /// Longer strings are truncated and the last byte of the buffer is
    /// replaced with a NUL. Returns `None` if `buf_size` is zero.
    pub fn pstrcpy_targphys(
        &mut self,
        name: &str,
        address: impl Into<Pa>,
        buf_size: u64,
        source: &[u8],
    ) -> Result<Option<RomId>, LoaderError> {
        if buf_size == 0 {
            return Ok(None);
        }

        let limit = usize::try_from(buf_size).unwrap_or(usize::MAX);
        let data = match memchr::memchr(0, &source[..source.len().min(limit)]) {
            Some(nul) => source[..=nul].to_vec(),
            None => {
                let len = source.len().min(limit - 1);
                let mut data = source[..len].to_vec();
                data.push(0);
                data
            }
        };

        self.add_blob_fixed(name, data, address).map(Some)
    }
}
