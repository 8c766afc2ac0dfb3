use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Access permissions of a loadable segment.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MemoryAccess: u8 {
        /// Read permission.
        const R = 0b00000001;

        /// Write permission.
        const W = 0b00000010;

        /// Execute permission.
        const X = 0b00000100;

        /// Combined Read and Write permissions.
        const RW = Self::R.bits() | Self::W.bits();

        /// Combined Read and Execute permissions.
        const RX = Self::R.bits() | Self::X.bits();

        /// Full access: Read, Write, and Execute permissions.
        const RWX = Self::R.bits() | Self::W.bits() | Self::X.bits();
    }
}

/// Segment is executable.
const PF_X: u32 = 1;

/// Segment is writable.
const PF_W: u32 = 2;

/// Segment is readable.
const PF_R: u32 = 4;

impl MemoryAccess {
    /// Converts ELF program header `p_flags`.
    pub fn from_elf_flags(flags: u32) -> Self {
        let mut result = Self::empty();

        if flags & PF_R != 0 {
            result |= Self::R;
        }
        if flags & PF_W != 0 {
            result |= Self::W;
        }
        if flags & PF_X != 0 {
            result |= Self::X;
        }

        result
    }
}

impl std::fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut result = [b'-'; 3];

        if self.contains(MemoryAccess::R) {
            result[0] = b'r';
        }
        if self.contains(MemoryAccess::W) {
            result[1] = b'w';
        }
        if self.contains(MemoryAccess::X) {
            result[2] = b'x';
        }

        // SAFETY: The `result` array is always valid UTF-8.
        f.write_str(unsafe { std::str::from_utf8_unchecked(&result) })
    }
}
