use std::collections::BTreeMap;

/// A side channel that exposes named files to guest firmware.
///
/// Regions registered with a firmware file name are delivered through this
/// channel instead of being written into guest memory; the guest firmware
/// decides where the content ends up.
pub trait FirmwareConfig {
    /// Publishes a file under `path`.
    fn add_file(&mut self, path: &str, data: &[u8], read_only: bool);

    /// Returns the content of a published file.
    fn file(&self, path: &str) -> Option<&[u8]> {
        let _ = path;
        None
    }
}

/// An in-memory table of firmware files.
#[derive(Debug, Default)]
pub struct FirmwareFiles {
    files: BTreeMap<String, (Vec<u8>, bool)>,
}

impl FirmwareFiles {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the published paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Returns `true` if the file was published read-only.
    pub fn is_read_only(&self, path: &str) -> Option<bool> {
        self.files.get(path).map(|(_, read_only)| *read_only)
    }
}

impl FirmwareConfig for FirmwareFiles {
    fn add_file(&mut self, path: &str, data: &[u8], read_only: bool) {
        if self
            .files
            .insert(path.to_owned(), (data.to_vec(), read_only))
            .is_some()
        {
            tracing::warn!(path, "firmware file replaced");
        }
    }

    fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|(data, _)| data.as_slice())
    }
}
