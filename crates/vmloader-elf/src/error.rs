use vmloader_core::LoaderError;

/// An error that can occur when loading an ELF image.
#[derive(thiserror::Error, Debug)]
pub enum ElfError {
    /// The image is malformed or could not be read.
    #[error("Failed to load ELF")]
    LoadFailed,

    /// The image does not start with the ELF magic.
    #[error("The image is not ELF")]
    NotElf,

    /// The image targets a different machine than requested.
    #[error("The image is from incompatible architecture")]
    WrongArch {
        /// The requested machine.
        expected: u16,

        /// The machine in the header.
        found: u16,
    },

    /// The image has a different byte order than requested.
    #[error("The image has incorrect endianness")]
    WrongEndian,

    /// A segment or the whole image exceeds the size limit.
    #[error("The image segments are too big to load")]
    TooBig {
        /// Offending size.
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

impl ElfError {
    /// Generic failure.
    pub const LOAD_FAILED: i32 = -1;

    /// Not an ELF image.
    pub const NOT_ELF: i32 = -2;

    /// Machine mismatch.
    pub const WRONG_ARCH: i32 = -3;

    /// Byte order mismatch.
    pub const WRONG_ENDIAN: i32 = -4;

    /// Size limit exceeded.
    pub const TOO_BIG: i32 = -5;

    /// Returns the numeric code of the error.
    ///
    /// Codes are negative, so they never collide with a loaded size.
    pub fn code(&self) -> i32 {
        match self {
            Self::LoadFailed | Self::Io(_) | Self::Loader(_) => Self::LOAD_FAILED,
            Self::NotElf => Self::NOT_ELF,
            Self::WrongArch { .. } => Self::WRONG_ARCH,
            Self::WrongEndian => Self::WRONG_ENDIAN,
            Self::TooBig { .. } => Self::TOO_BIG,
        }
    }

    /// Returns a message for a numeric code.
    pub fn strerror(code: i32) -> &'static str {
        match code {
            0 => "No error",
            Self::LOAD_FAILED => "Failed to load ELF",
            Self::NOT_ELF => "The image is not ELF",
            Self::WRONG_ARCH => "The image is from incompatible architecture",
            Self::WRONG_ENDIAN => "The image has incorrect endianness",
            Self::TOO_BIG => "The image segments are too big to load",
            _ => "Unknown error",
        }
    }

    /// Returns `true` if the image contradicts an explicit expectation of
    /// the caller rather than being a different format.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::WrongArch { .. } | Self::WrongEndian)
    }
}

impl From<ElfError> for LoaderError {
    fn from(value: ElfError) -> Self {
        match value {
            ElfError::Loader(err) => err,
            ElfError::Io(err) => LoaderError::Io(err),
            err => LoaderError::format(err),
        }
    }
}
