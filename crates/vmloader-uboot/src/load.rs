use std::path::Path;

use vmloader_core::{AddressSpace, ImageInfo, MappedFile, Pa, RomData, RomRegistry};
use vmloader_gzip::gunzip_vec;

use crate::{
    UbootError,
    header::{
        IH_COMP_GZIP, IH_COMP_NONE, IH_TYPE_KERNEL, IH_TYPE_KERNEL_NOLOAD, IH_TYPE_RAMDISK,
        UbootHeader,
    },
};

/// Upper bound for decompressed U-Boot payloads.
pub const UBOOT_MAX_GUNZIP_BYTES: usize = 64 << 20;

/// A kernel loaded from a U-Boot image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbootKernel {
    /// Entry point and extent of the payload.
    pub info: ImageInfo,

    /// The load address from the header, before translation.
    pub load_address: Pa,

    /// The kernel boots with the Linux boot protocol.
    pub is_linux: bool,

    /// The image name.
    pub name: String,
}

/// Loads legacy U-Boot images.
pub struct UbootLoader<'a> {
    space: AddressSpace,
    translate: Option<Box<dyn Fn(u64) -> u64 + 'a>>,
    load_address: Option<Pa>,
}

impl Default for UbootLoader<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> UbootLoader<'a> {
    /// Creates a loader for the system address space.
    pub fn new() -> Self {
        Self {
            space: AddressSpace::SYSTEM,
            translate: None,
            load_address: None,
        }
    }

    /// Places the payload in `space`.
    pub fn with_space(self, space: AddressSpace) -> Self {
        Self { space, ..self }
    }

    /// Maps the kernel load address through `translate`.
    pub fn with_translate(self, translate: impl Fn(u64) -> u64 + 'a) -> Self {
        Self {
            translate: Some(Box::new(translate)),
            ..self
        }
    }

    /// Sets where `KERNEL_NOLOAD` images go.
    ///
    /// Without it, such images are rejected.
    pub fn with_load_address(self, address: impl Into<Pa>) -> Self {
        Self {
            load_address: Some(address.into()),
            ..self
        }
    }

    /// Loads the kernel image at `path`.
    pub fn load_kernel(
        &self,
        registry: &mut RomRegistry,
        path: impl AsRef<Path>,
    ) -> Result<UbootKernel, UbootError> {
        let path = path.as_ref();
        let file = MappedFile::open(path)?;

        self.load_kernel_mapped(registry, &path.display().to_string(), &file)
    }

    /// Loads an already mapped kernel image.
    pub fn load_kernel_mapped(
        &self,
        registry: &mut RomRegistry,
        name: &str,
        file: &MappedFile,
    ) -> Result<UbootKernel, UbootError> {
        let header = parse(file, IH_TYPE_KERNEL)?;

        let mut load = u64::from(header.ih_load.get());
        let mut entry = u64::from(header.ih_ep.get());

        if header.ih_type == IH_TYPE_KERNEL_NOLOAD {
            let Some(address) = self.load_address
            else {
                tracing::warn!(name, "KERNEL_NOLOAD image needs a load address");
                return Err(UbootError::NoLoadAddress);
            };

            load = address.0.wrapping_add(size_of::<UbootHeader>() as u64);
            entry = entry.wrapping_add(load);
        }

        let address = match &self.translate {
            Some(translate) => translate(load),
            None => load,
        };

        let data = payload(file, header)?;
        let size = data.len() as u64;
        registry.add_blob_fixed_as(name, data, address, self.space)?;

        tracing::debug!(
            name,
            image = %header.name(),
            address = %Pa(address),
            entry = %Pa(entry),
            size,
            "U-Boot kernel loaded"
        );

        Ok(UbootKernel {
            info: ImageInfo::flat(Pa(address), size, Some(Pa(entry))),
            load_address: Pa(load),
            is_linux: header.is_linux(),
            name: header.name(),
        })
    }

    /// Loads the ramdisk image at `path` to `address`.
    ///
    /// Returns the size of the (decompressed) ramdisk.
    pub fn load_ramdisk(
        &self,
        registry: &mut RomRegistry,
        path: impl AsRef<Path>,
        address: impl Into<Pa>,
        max_size: u64,
    ) -> Result<u64, UbootError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = MappedFile::open(path)?;
        let header = parse(&file, IH_TYPE_RAMDISK)?;

        let data = payload(&file, header)?;
        let size = data.len() as u64;
        if size > max_size {
            return Err(UbootError::TooBig {
                size,
                limit: max_size,
            });
        }

        let address = address.into();
        registry.add_blob_fixed_as(&name, data, address, self.space)?;

        tracing::debug!(name = %name, %address, size, "U-Boot ramdisk loaded");
        Ok(size)
    }
}

/// Loads the U-Boot kernel image at `path` with default options.
pub fn load_uimage(
    registry: &mut RomRegistry,
    path: impl AsRef<Path>,
) -> Result<UbootKernel, UbootError> {
    UbootLoader::new().load_kernel(registry, path)
}

/// Loads the U-Boot ramdisk image at `path` to `address`.
pub fn load_ramdisk(
    registry: &mut RomRegistry,
    path: impl AsRef<Path>,
    address: impl Into<Pa>,
    max_size: u64,
) -> Result<u64, UbootError> {
    UbootLoader::new().load_ramdisk(registry, path, address, max_size)
}

/// Validates the header and its type against `expected`.
fn parse(file: &MappedFile, expected: u8) -> Result<&UbootHeader, UbootError> {
    let header = UbootHeader::parse(file).ok_or(UbootError::NotUboot)?;

    let accepted = header.ih_type == expected
        || (expected == IH_TYPE_KERNEL && header.ih_type == IH_TYPE_KERNEL_NOLOAD);

    if !accepted {
        tracing::warn!(
            found = header.ih_type,
            expected,
            "wrong U-Boot image type"
        );

        return Err(UbootError::WrongType {
            found: header.ih_type,
            expected,
        });
    }

    Ok(header)
}

/// Returns the payload, decompressed if needed.
fn payload(file: &MappedFile, header: &UbootHeader) -> Result<RomData, UbootError> {
    let offset = size_of::<UbootHeader>();
    let size = header.ih_size.get() as usize;

    let compression = header.ih_comp;
    if compression != IH_COMP_NONE && compression != IH_COMP_GZIP {
        tracing::warn!(compression, "unsupported U-Boot compression");
        return Err(UbootError::Compression(compression));
    }

    let data = file.slice(offset, size).ok_or(UbootError::Truncated)?;

    if compression == IH_COMP_NONE {
        return Ok(RomData::from(data));
    }

    let data = gunzip_vec(&data, UBOOT_MAX_GUNZIP_BYTES).inspect_err(|err| {
        tracing::warn!(%err, "unable to decompress gzipped image");
    })?;

    Ok(RomData::from(data))
}
