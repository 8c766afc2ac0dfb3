use std::path::Path;

use vmloader_core::{Pa, RomRegistry};

use crate::{GzipError, gunzip_vec, is_gzip};

/// Reads the gzip-compressed file at `path` and decompresses at most
/// `max_size` bytes of it.
pub fn load_image_gzipped_buffer(
    path: impl AsRef<Path>,
    max_size: usize,
) -> Result<Vec<u8>, GzipError> {
    let path = path.as_ref();
    let compressed = std::fs::read(path)?;

    if !is_gzip(&compressed) {
        return Err(GzipError::NotGzip);
    }

    let data = gunzip_vec(&compressed, max_size).inspect_err(|err| {
        tracing::warn!(path = %path.display(), %err, "unable to decompress gzipped image");
    })?;

    Ok(data)
}

/// Decompresses the gzip-compressed file at `path` and registers it at
/// `address`.
///
/// Returns the decompressed size.
pub fn load_image_gzipped(
    registry: &mut RomRegistry,
    path: impl AsRef<Path>,
    address: impl Into<Pa>,
    max_size: usize,
) -> Result<u64, GzipError> {
    let path = path.as_ref();
    let data = load_image_gzipped_buffer(path, max_size)?;
    let size = data.len() as u64;

    registry.add_blob_fixed(&path.display().to_string(), data, address)?;
    Ok(size)
}
