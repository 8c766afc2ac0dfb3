use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{LittleEndian, U32},
};

use crate::{GzipError, MAX_GUNZIP_BYTES, gunzip_vec};

/// Header of a Linux EFI zboot image.
///
/// The image is a PE/COFF executable that carries the compressed kernel
/// as an opaque payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ZbootHeader {
    /// `"MZ"`.
    pub msdos_magic: [u8; 2],

    /// Reserved.
    pub reserved0: [u8; 2],

    /// `"zimg"`.
    pub zimg: [u8; 4],

    /// Offset of the payload from the start of the image.
    pub payload_offset: U32<LittleEndian>,

    /// Size of the payload.
    pub payload_size: U32<LittleEndian>,

    /// Reserved.
    pub reserved1: [u8; 8],

    /// NUL-terminated compression name.
    pub compression_type: [u8; 32],

    /// Linux PE magic.
    pub linux_magic: [u8; 4],

    /// Offset of the PE header.
    pub pe_header_offset: U32<LittleEndian>,
}

impl ZbootHeader {
    /// PE/COFF MS-DOS stub magic.
    pub const MSDOS_MAGIC: [u8; 2] = *b"MZ";

    /// zboot image magic.
    pub const ZIMG_MAGIC: [u8; 4] = *b"zimg";

    /// Linux EFI PE magic.
    pub const LINUX_MAGIC: [u8; 4] = [0xcd, 0x23, 0x82, 0x81];

    /// Parses the header at the start of `image`, if it is a zboot image.
    pub fn parse(image: &[u8]) -> Option<&Self> {
        let (header, _) = Self::ref_from_prefix(image).ok()?;

        if header.msdos_magic != Self::MSDOS_MAGIC
            || header.zimg != Self::ZIMG_MAGIC
            || header.linux_magic != Self::LINUX_MAGIC
        {
            return None;
        }

        Some(header)
    }

    /// Returns the compression name.
    pub fn compression_type(&self) -> &[u8] {
        let end = memchr::memchr(0, &self.compression_type).unwrap_or(self.compression_type.len());
        &self.compression_type[..end]
    }
}

/// Unpacks a Linux EFI zboot image.
///
/// Returns `None` if `image` is not a zboot image, the decompressed kernel
/// otherwise. Only gzip payloads are supported.
pub fn unpack_efi_zboot_image(image: &[u8]) -> Result<Option<Vec<u8>>, GzipError> {
    let Some(header) = ZbootHeader::parse(image)
    else {
        return Ok(None);
    };

    let compression = header.compression_type();
    if compression != b"gzip" {
        return Err(GzipError::ZbootCompression(
            String::from_utf8_lossy(compression).into_owned(),
        ));
    }

    let offset = header.payload_offset.get() as usize;
    let size = header.payload_size.get() as usize;

    let payload = offset
        .checked_add(size)
        .and_then(|end| image.get(offset..end))
        .ok_or(GzipError::ZbootCorrupt)?;

    let kernel = gunzip_vec(payload, MAX_GUNZIP_BYTES)?;
    tracing::debug!(
        compressed = size,
        decompressed = kernel.len(),
        "EFI zboot image unpacked"
    );

    Ok(Some(kernel))
}
