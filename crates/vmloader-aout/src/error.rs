use vmloader_core::LoaderError;

/// An error that can occur when loading an a.out image.
#[derive(thiserror::Error, Debug)]
pub enum AoutError {
    /// The file is shorter than the header or the sections it declares.
    #[error("a.out image is truncated")]
    Truncated,

    /// The magic number is none of OMAGIC, NMAGIC, ZMAGIC or QMAGIC.
    #[error("unknown a.out magic {0:#o}")]
    BadMagic(u16),

    /// The image does not fit into the space allowed for it.
    #[error("a.out image needs {size:#x} bytes, {limit:#x} allowed")]
    TooBig {
        /// Needed size.
        size: u64,

        /// Allowed size.
        limit: u64,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The registry refused the image.
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl From<AoutError> for LoaderError {
    fn from(value: AoutError) -> Self {
        match value {
            AoutError::Loader(err) => err,
            AoutError::Io(err) => LoaderError::Io(err),
            err => LoaderError::format(err),
        }
    }
}
