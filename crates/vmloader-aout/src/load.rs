use std::path::Path;

use vmloader_core::{
    AddressSpace, ImageInfo, LoaderError, MappedFile, MappedSlice, Pa, RomRegistry,
};
use zerocopy::{
    FromBytes as _,
    byteorder::{BigEndian, ByteOrder, LittleEndian},
};

use crate::{
    AoutError,
    exec::{Exec, NMAGIC, OMAGIC, QMAGIC, ZMAGIC},
};

/// Options for [`load_aout`].
#[derive(Debug, Clone, Copy)]
pub struct AoutOptions {
    /// Where the text section goes.
    pub address: Pa,

    /// Size of the space available at `address`.
    pub max_size: u64,

    /// Target page size, used to place the data section of NMAGIC images.
    pub page_size: u64,

    /// The header is stored big-endian.
    pub big_endian: bool,

    /// The target address space.
    pub space: AddressSpace,
}

impl AoutOptions {
    /// Creates options for loading at `address` with 4 KiB pages and a
    /// little-endian header.
    pub fn new(address: impl Into<Pa>, max_size: u64) -> Self {
        Self {
            address: address.into(),
            max_size,
            page_size: 0x1000,
            big_endian: false,
            space: AddressSpace::SYSTEM,
        }
    }
}

/// Loads the a.out image at `path`.
///
/// Text and data are registered as one flat region at `options.address`,
/// except for NMAGIC images whose data section starts on the next target
/// page. The bss section is not registered. Returns the entry point and the
/// number of bytes loaded.
pub fn load_aout(
    registry: &mut RomRegistry,
    path: impl AsRef<Path>,
    options: &AoutOptions,
) -> Result<ImageInfo, AoutError> {
    let path = path.as_ref();
    let file = MappedFile::open(path)?;

    load_aout_mapped(registry, &path.display().to_string(), &file, options)
}

/// Loads an already mapped a.out image.
pub fn load_aout_mapped(
    registry: &mut RomRegistry,
    name: &str,
    file: &MappedFile,
    options: &AoutOptions,
) -> Result<ImageInfo, AoutError> {
    match options.big_endian {
        true => load::<BigEndian>(registry, name, file, options),
        false => load::<LittleEndian>(registry, name, file, options),
    }
}

fn load<O: ByteOrder>(
    registry: &mut RomRegistry,
    name: &str,
    file: &MappedFile,
    options: &AoutOptions,
) -> Result<ImageInfo, AoutError> {
    let (exec, _) = Exec::<O>::ref_from_prefix(file).map_err(|_| AoutError::Truncated)?;

    let text = u64::from(exec.a_text.get());
    let data = u64::from(exec.a_data.get());
    let text_offset = exec.text_offset();

    let (first_len, data_offset, end) = match exec.magic() {
        OMAGIC | ZMAGIC | QMAGIC => (text + data, None, text + data),
        NMAGIC => {
            let data_offset = exec.data_offset(options.page_size);
            (text, Some(data_offset), data_offset + data)
        }
        magic => {
            tracing::debug!(name, magic, "not an a.out image");
            return Err(AoutError::BadMagic(magic));
        }
    };

    if end > options.max_size {
        return Err(AoutError::TooBig {
            size: end,
            limit: options.max_size,
        });
    }

    let high = options
        .address
        .checked_add(end)
        .ok_or(LoaderError::OutOfBounds)?;

    let slice = |offset: u64, len: u64| -> Result<MappedSlice, AoutError> {
        let offset = usize::try_from(offset).map_err(|_| AoutError::Truncated)?;
        let len = usize::try_from(len).map_err(|_| AoutError::Truncated)?;
        file.slice(offset, len).ok_or(AoutError::Truncated)
    };

    let mut blobs = vec![(options.address, slice(text_offset, first_len)?)];
    if let Some(data_offset) = data_offset {
        blobs.push((
            options.address.wrapping_add(data_offset),
            slice(text_offset + text, data)?,
        ));
    }

    for (address, blob) in blobs {
        if blob.is_empty() {
            continue;
        }

        registry.add_blob_fixed_as(name, blob, address, options.space)?;
    }

    tracing::debug!(
        name,
        magic = exec.magic(),
        address = %options.address,
        text,
        data,
        "a.out image loaded"
    );

    Ok(ImageInfo {
        entry: Some(Pa(u64::from(exec.a_entry.get()))),
        bias: 0,
        low: options.address,
        high,
        size: text + data,
    })
}
