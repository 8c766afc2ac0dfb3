use std::{fs::File, ops::Deref, path::Path, rc::Rc};

use memmap2::Mmap;

/// Shared, read-only file content.
///
/// Files are memory mapped and the mapping is reference counted, so every
/// region that borrows a slice of the file keeps the mapping alive and the
/// bytes are shared with the OS file cache. In-memory buffers can be wrapped
/// the same way.
#[derive(Clone)]
pub struct MappedFile(Rc<Box<dyn Deref<Target = [u8]>>>);

impl MappedFile {
    /// Creates a new shared buffer.
    pub fn new<T>(inner: T) -> Self
    where
        T: Deref<Target = [u8]> + 'static,
    {
        Self(Rc::new(Box::new(inner)))
    }

    /// Maps the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = File::open(path)?;

        // Empty files cannot be mapped.
        if file.metadata()?.len() == 0 {
            return Ok(Self::new(Vec::new()));
        }

        // SAFETY: The mapping is read-only. Files handed to the loader are
        // expected not to be truncated while the guest is being set up.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self::new(mmap))
    }

    /// Returns a slice of the file, or `None` if the range is out of bounds.
    pub fn slice(&self, offset: usize, len: usize) -> Option<MappedSlice> {
        let end = offset.checked_add(len)?;
        if end > self.len() {
            return None;
        }

        Some(MappedSlice {
            file: self.clone(),
            offset,
            len,
        })
    }

    /// Returns the number of references held on the file content.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl Deref for MappedFile {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for MappedFile {
    fn as_ref(&self) -> &[u8] {
        self.deref()
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("len", &self.len())
            .finish()
    }
}

/// A window into a [`MappedFile`].
#[derive(Clone)]
pub struct MappedSlice {
    file: MappedFile,
    offset: usize,
    len: usize,
}

impl MappedSlice {
    /// Returns the underlying file.
    pub fn file(&self) -> &MappedFile {
        &self.file
    }

    /// Returns the offset of the window within the file.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Deref for MappedSlice {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.file[self.offset..self.offset + self.len]
    }
}

impl std::fmt::Debug for MappedSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MappedSlice")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}
