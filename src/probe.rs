use std::path::Path;

use vmloader_core::{AddressSpace, ImageInfo, LoaderError, MappedFile, Pa, RomData, RomRegistry};
#[cfg(feature = "elf")]
use vmloader_elf::{ElfEndian, ElfLoader};
#[cfg(feature = "gzip")]
use vmloader_gzip::{MAX_GUNZIP_BYTES, gunzip_vec, is_gzip, unpack_efi_zboot_image};
#[cfg(feature = "uboot")]
use vmloader_uboot::UbootLoader;

/// The format a kernel image was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelFormat {
    /// ELF executable.
    Elf,

    /// Linux EFI zboot executable, unpacked and loaded raw.
    Zboot,

    /// gzip-compressed raw image.
    Gzip,

    /// Legacy U-Boot image.
    Uboot,

    /// Raw image at the fallback address.
    Raw,
}

/// A kernel loaded by [`load_kernel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelImage {
    /// The recognized format.
    pub format: KernelFormat,

    /// Entry point and extent of the image.
    pub info: ImageInfo,
}

/// Options for [`load_kernel`].
pub struct ProbeOptions<'a> {
    #[cfg_attr(not(feature = "elf"), allow(dead_code))]
    machine: u16,
    #[cfg(feature = "elf")]
    endian: Option<ElfEndian>,
    space: AddressSpace,
    address: Pa,
    max_size: u64,
    #[cfg_attr(not(any(feature = "elf", feature = "uboot")), allow(dead_code))]
    translate: Option<Box<dyn Fn(u64) -> u64 + 'a>>,
}

impl<'a> ProbeOptions<'a> {
    /// Creates options for a board with the given ELF machine that places
    /// images without a load address of their own at `address`.
    ///
    /// `EM_NONE` accepts ELF images of any machine.
    pub fn new(machine: u16, address: impl Into<Pa>) -> Self {
        Self {
            machine,
            #[cfg(feature = "elf")]
            endian: None,
            space: AddressSpace::SYSTEM,
            address: address.into(),
            max_size: i32::MAX as u64,
            translate: None,
        }
    }

    /// Rejects ELF images of the other byte order.
    #[cfg(feature = "elf")]
    pub fn with_endian(self, endian: ElfEndian) -> Self {
        Self {
            endian: Some(endian),
            ..self
        }
    }

    /// Places the kernel in `space`.
    pub fn with_space(self, space: AddressSpace) -> Self {
        Self { space, ..self }
    }

    /// Limits the size of the loaded image.
    pub fn with_max_size(self, max_size: u64) -> Self {
        Self { max_size, ..self }
    }

    /// Maps ELF and U-Boot load addresses through `translate`.
    pub fn with_translate(self, translate: impl Fn(u64) -> u64 + 'a) -> Self {
        Self {
            translate: Some(Box::new(translate)),
            ..self
        }
    }
}

/// Loads the kernel at `path`, trying ELF, EFI zboot, gzip, U-Boot and
/// finally a raw image at the fallback address.
///
/// Every attempt runs in a registry transaction, so a failed attempt leaves
/// nothing behind for the next one. An ELF image built for another machine
/// or byte order stops the probe.
pub fn load_kernel(
    registry: &mut RomRegistry,
    path: impl AsRef<Path>,
    options: &ProbeOptions,
) -> Result<KernelImage, LoaderError> {
    let path = path.as_ref();

    let file = MappedFile::open(path).inspect_err(|err| {
        tracing::warn!(path = %path.display(), %err, "could not open kernel image");
    })?;

    load_kernel_mapped(registry, &path.display().to_string(), &file, options)
}

/// Loads an already mapped kernel image.
pub fn load_kernel_mapped(
    registry: &mut RomRegistry,
    name: &str,
    file: &MappedFile,
    options: &ProbeOptions,
) -> Result<KernelImage, LoaderError> {
    #[cfg(feature = "elf")]
    {
        let mut loader = ElfLoader::new(options.machine)
            .with_space(options.space)
            .with_max_size(options.max_size);

        if let Some(endian) = options.endian {
            loader = loader.with_endian(endian);
        }

        if let Some(translate) = &options.translate {
            loader = loader.with_translate(|address| translate(address));
        }

        match attempt(registry, |registry| loader.load_mapped(registry, name, file)) {
            Ok(info) => return Ok(found(name, KernelFormat::Elf, info)),
            Err(err) if err.is_mismatch() => {
                tracing::warn!(name, %err, "kernel does not match the machine");
                return Err(err.into());
            }
            Err(err) => tracing::debug!(name, %err, "not an ELF kernel"),
        }
    }

    #[cfg(feature = "gzip")]
    {
        if let Some(kernel) = unpack_efi_zboot_image(file)? {
            return load_raw(registry, name, kernel.into(), options, KernelFormat::Zboot);
        }

        if is_gzip(file) {
            let limit = usize::try_from(options.max_size).unwrap_or(MAX_GUNZIP_BYTES);
            let kernel = gunzip_vec(file, limit.min(MAX_GUNZIP_BYTES))?;
            return load_raw(registry, name, kernel.into(), options, KernelFormat::Gzip);
        }
    }

    #[cfg(feature = "uboot")]
    {
        let mut loader = UbootLoader::new()
            .with_space(options.space)
            .with_load_address(options.address);

        if let Some(translate) = &options.translate {
            loader = loader.with_translate(|address| translate(address));
        }

        match attempt(registry, |registry| loader.load_kernel_mapped(registry, name, file)) {
            Ok(kernel) => return Ok(found(name, KernelFormat::Uboot, kernel.info)),
            Err(err) => tracing::debug!(name, %err, "not a U-Boot kernel"),
        }
    }

    let data = file
        .slice(0, file.len())
        .ok_or(LoaderError::Other("kernel image changed size"))?;

    load_raw(registry, name, data.into(), options, KernelFormat::Raw)
}

/// Runs `f` in a transaction unless the caller already opened one.
fn attempt<T, E>(
    registry: &mut RomRegistry,
    f: impl FnOnce(&mut RomRegistry) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<LoaderError>,
{
    if registry.in_transaction() {
        f(registry)
    }
    else {
        registry.transaction(f)
    }
}

fn load_raw(
    registry: &mut RomRegistry,
    name: &str,
    data: RomData,
    options: &ProbeOptions,
    format: KernelFormat,
) -> Result<KernelImage, LoaderError> {
    let size = data.len() as u64;
    if size > options.max_size {
        return Err(LoaderError::TooBig {
            size,
            limit: options.max_size,
        });
    }

    attempt(registry, |registry| {
        registry.add_blob_fixed_as(name, data, options.address, options.space)
    })?;

    let info = ImageInfo::flat(options.address, size, Some(options.address));
    Ok(found(name, format, info))
}

fn found(name: &str, format: KernelFormat, info: ImageInfo) -> KernelImage {
    tracing::info!(
        name,
        ?format,
        entry = ?info.entry,
        low = %info.low,
        high = %info.high,
        "kernel loaded"
    );

    KernelImage { format, info }
}
