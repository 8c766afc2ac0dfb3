use vmloader_core::LoaderError;
use zlib_rs::ReturnCode;

/// An error that can occur when decompressing an image.
#[derive(thiserror::Error, Debug)]
pub enum GzipError {
    /// The buffer is too short to hold a gzip member header.
    #[error("gzip header is truncated")]
    Truncated,

    /// The buffer does not start with the gzip magic.
    #[error("not a gzip image")]
    NotGzip,

    /// The member is not compressed with DEFLATE.
    #[error("unsupported gzip compression method {0}")]
    Method(u8),

    /// A reserved header flag is set.
    #[error("reserved gzip header flags set ({0:#04x})")]
    ReservedFlags(u8),

    /// The DEFLATE stream is corrupt or ends early.
    #[error("inflate failed: {0:?}")]
    Inflate(ReturnCode),

    /// The decompressed data does not fit into the space allowed for it.
    #[error("decompressed image exceeds {limit:#x} bytes")]
    TooBig {
        /// Allowed size.
        limit: usize,
    },

    /// The EFI zboot container uses an unsupported compression.
    #[error("unable to handle EFI zboot image with \"{0}\" compression")]
    ZbootCompression(String),

    /// The EFI zboot payload lies outside the image.
    #[error("unable to handle corrupt EFI zboot image")]
    ZbootCorrupt,

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The registry refused the image.
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl From<GzipError> for LoaderError {
    fn from(value: GzipError) -> Self {
        match value {
            GzipError::Loader(err) => err,
            GzipError::Io(err) => LoaderError::Io(err),
            err => LoaderError::format(err),
        }
    }
}
