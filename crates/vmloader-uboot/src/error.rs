use vmloader_core::LoaderError;
use vmloader_gzip::GzipError;

/// An error that can occur when loading a U-Boot image.
#[derive(thiserror::Error, Debug)]
pub enum UbootError {
    /// The file is not a U-Boot image.
    #[error("not a U-Boot image")]
    NotUboot,

    /// The payload is shorter than the header declares.
    #[error("error reading U-Boot payload")]
    Truncated,

    /// The image type is not the requested one.
    #[error("wrong image type {found}, expected {expected}")]
    WrongType {
        /// Type in the header.
        found: u8,

        /// Requested type.
        expected: u8,
    },

    /// A `KERNEL_NOLOAD` image was found but no load address was given.
    #[error("this image format (kernel_noload) cannot be loaded on this machine type")]
    NoLoadAddress,

    /// The compression type is not supported.
    #[error("unable to load U-Boot images with compression type {0}")]
    Compression(u8),

    /// The payload does not fit into the space allowed for it.
    #[error("U-Boot payload is {size:#x} bytes, {limit:#x} allowed")]
    TooBig {
        /// Payload size.
        size: u64,

        /// Allowed size.
        limit: u64,
    },

    /// The payload could not be decompressed.
    #[error("unable to decompress gzipped image")]
    Gzip(#[from] GzipError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The registry refused the image.
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl From<UbootError> for LoaderError {
    fn from(value: UbootError) -> Self {
        match value {
            UbootError::Loader(err) => err,
            UbootError::Io(err) => LoaderError::Io(err),
            err => LoaderError::format(err),
        }
    }
}
