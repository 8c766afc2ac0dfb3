/// Record type of an Intel HEX record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Data at a 16-bit offset from the current base.
    Data = 0,

    /// End of file.
    EndOfFile = 1,

    /// Sets bits 4-19 of the base address.
    ExtendedSegmentAddress = 2,

    /// Initial CS:IP of an x86 real mode program.
    StartSegmentAddress = 3,

    /// Sets bits 16-31 of the base address.
    ExtendedLinearAddress = 4,

    /// Initial 32-bit instruction pointer.
    StartLinearAddress = 5,
}

impl TryFrom<u8> for RecordType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Data,
            1 => Self::EndOfFile,
            2 => Self::ExtendedSegmentAddress,
            3 => Self::StartSegmentAddress,
            4 => Self::ExtendedLinearAddress,
            5 => Self::StartLinearAddress,
            other => return Err(other),
        })
    }
}

/// Digits of a record excluding the data field: byte count, address,
/// record type and checksum.
const FIXED_DIGITS: usize = 10;

/// A record being decoded one hex digit at a time.
#[derive(Debug, Clone)]
pub(crate) struct Record {
    pub byte_count: u8,
    pub address: u16,
    pub kind: u8,
    pub data: [u8; 255],
    pub checksum: u8,
    digits: usize,
    sum: u8,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            byte_count: 0,
            address: 0,
            kind: 0,
            data: [0; 255],
            checksum: 0,
            digits: 0,
            sum: 0,
        }
    }
}

impl Record {
    /// Adds the next hex digit.
    ///
    /// Returns `false` if the record already holds all the digits its byte
    /// count allows.
    pub fn push_digit(&mut self, digit: u8) -> bool {
        let index = self.digits;
        let data_end = 8 + 2 * usize::from(self.byte_count);

        let value = if index & 1 == 1 { digit } else { digit << 4 };

        match index {
            0..2 => self.byte_count |= value,
            2..6 => self.address = (self.address << 4) | u16::from(digit),
            6..8 => self.kind |= value,
            _ if index < data_end => self.data[(index - 8) / 2] |= value,
            _ if index < data_end + 2 => self.checksum |= value,
            _ => return false,
        }

        self.sum = self.sum.wrapping_add(value);
        self.digits += 1;
        true
    }

    /// Returns `true` if the record holds exactly as many digits as its
    /// byte count requires.
    pub fn is_complete(&self) -> bool {
        self.digits == FIXED_DIGITS + 2 * usize::from(self.byte_count)
    }

    /// Returns `true` if all bytes of the record, checksum included, sum
    /// up to zero.
    pub fn checksum_ok(&self) -> bool {
        self.sum == 0
    }

    /// Returns the data field.
    pub fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.byte_count)]
    }
}
