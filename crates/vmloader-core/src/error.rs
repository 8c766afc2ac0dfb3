use crate::{AddressSpace, Pa, RegionHandle};

/// An error that can occur when registering or committing guest images.
#[derive(thiserror::Error, Debug)]
pub enum LoaderError {
    /// An error occurred in an image format parser.
    #[error(transparent)]
    Format(Box<dyn std::error::Error>),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Two or more placed regions overlap.
    #[error("Some ROM regions are overlapping ({} conflicts)", .0.len())]
    Overlap(Overlaps),

    /// A region was registered after the registry has been finalized.
    #[error("ROM images must be loaded at startup")]
    Finalized,

    /// The registry has not been finalized yet.
    #[error("ROM registry has not been finalized")]
    NotFinalized,

    /// A transaction was started while another one is open.
    #[error("A ROM transaction is already in progress")]
    TransactionActive,

    /// A transaction was ended without being started.
    #[error("No ROM transaction is in progress")]
    NoTransaction,

    /// Both an address space and an external region were given.
    #[error("Specifying an address space and a memory region is not valid")]
    ConflictingPlacement,

    /// The reserved span is smaller than the data backing it.
    #[error("Region size {rom_size:#x} is smaller than its data ({data_size:#x})")]
    InvalidSize {
        /// Reserved span.
        rom_size: u64,

        /// Backed data size.
        data_size: u64,
    },

    /// The image does not fit into the space allowed for it.
    #[error("Image is too big ({size:#x} bytes, limit {limit:#x})")]
    TooBig {
        /// Image size.
        size: u64,

        /// Allowed size.
        limit: u64,
    },

    /// The external region is unknown to the memory collaborator.
    #[error("Unknown memory region {0}")]
    UnknownRegion(RegionHandle),

    /// Operation not supported.
    #[error("Operation not supported.")]
    NotSupported,

    /// Out of bounds.
    #[error("Out of bounds")]
    OutOfBounds,

    /// Other error.
    #[error("{0}")]
    Other(&'static str),
}

/// One side of an overlap report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomSpan {
    /// The region name.
    pub name: String,

    /// First address of the region.
    pub start: Pa,

    /// One past the last address of the region.
    pub end: Pa,
}

impl std::fmt::Display for RomSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} (addresses {} - {})",
            self.name, self.start, self.end
        )
    }
}

/// Two placed regions colliding in the same address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    /// The address space both regions live in.
    pub space: AddressSpace,

    /// The name of the address space, or `"anonymous"`.
    pub space_name: String,

    /// The region starting first.
    pub first: RomSpan,

    /// The region starting inside `first`.
    pub second: RomSpan,
}

impl std::fmt::Display for Overlap {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(
            f,
            "The following two regions overlap (in the {} address space):",
            self.space_name
        )?;
        writeln!(f, "  {}", self.first)?;
        write!(f, "  {}", self.second)
    }
}

/// A collection of overlaps.
pub type Overlaps = smallvec::SmallVec<[Overlap; 1]>;

impl LoaderError {
    /// Creates a new error wrapping a format parser error.
    pub fn format(err: impl std::error::Error + 'static) -> Self {
        Self::Format(Box::new(err))
    }

    /// Renders the full multi-line overlap report, if this is an overlap error.
    pub fn overlap_report(&self) -> Option<String> {
        let Self::Overlap(overlaps) = self else {
            return None;
        };

        let mut report = String::from(
            "Some ROM regions are overlapping\n\
             These ROM regions might have been loaded by direct user request or by default.\n\
             They could be BIOS/firmware images, a guest kernel, initrd or some other file \
             loaded into guest memory.\n\
             Check whether you intended to load all this guest code, and whether it has been \
             built to load to the correct addresses.\n",
        );

        for overlap in overlaps {
            report.push('\n');
            report.push_str(&overlap.to_string());
            report.push('\n');
        }

        Some(report)
    }
}
