use vmloader_core::LoaderError;

/// An error that can occur when parsing an Intel HEX image.
#[derive(thiserror::Error, Debug)]
pub enum HexError {
    /// A character that is neither a hex digit nor whitespace, or a hex
    /// digit outside of a record.
    #[error("line {line}: unexpected character {ch:?}")]
    UnexpectedChar {
        /// Line number, starting at 1.
        line: usize,

        /// The offending character.
        ch: char,
    },

    /// A record started before the previous one was terminated.
    #[error("line {line}: record is not terminated")]
    Unterminated {
        /// Line number, starting at 1.
        line: usize,
    },

    /// The number of digits does not match the byte count.
    #[error("line {line}: record length does not match byte count")]
    Length {
        /// Line number, starting at 1.
        line: usize,
    },

    /// The bytes of the record do not sum up to zero.
    #[error("line {line}: checksum mismatch")]
    Checksum {
        /// Line number, starting at 1.
        line: usize,
    },

    /// An address record has the wrong size or a non-zero address field.
    #[error("line {line}: malformed record of type {kind:#04x}")]
    Malformed {
        /// Line number, starting at 1.
        line: usize,

        /// Record type.
        kind: u8,
    },

    /// The record type is not one of the six defined types.
    #[error("line {line}: unknown record type {kind:#04x}")]
    UnknownRecord {
        /// Line number, starting at 1.
        line: usize,

        /// Record type.
        kind: u8,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The registry refused a region.
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl From<HexError> for LoaderError {
    fn from(value: HexError) -> Self {
        match value {
            HexError::Loader(err) => err,
            HexError::Io(err) => LoaderError::Io(err),
            err => LoaderError::format(err),
        }
    }
}
