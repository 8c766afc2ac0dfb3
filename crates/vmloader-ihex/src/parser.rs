use vmloader_core::{ImageInfo, Pa};

use crate::{
    HexError,
    record::{Record, RecordType},
};

/// A contiguous run of data decoded from consecutive records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBlob {
    /// Address of the first byte.
    pub address: u32,

    /// The data.
    pub data: Vec<u8>,
}

/// Streaming Intel HEX decoder.
///
/// Characters are fed one at a time. Each completed run of contiguous data
/// is handed to a sink as a [`HexBlob`], so the caller decides where it
/// goes. Whitespace is ignored everywhere, a `:` starts a record and a line
/// break ends it.
#[derive(Debug)]
pub struct HexParser {
    /// The record being decoded, if any.
    record: Option<Record>,

    /// Current line, for diagnostics.
    line: usize,

    /// Data waiting to be flushed.
    pending: Vec<u8>,

    /// Address of the first pending byte.
    start: u32,

    /// Address the next data record has to have to extend `pending`.
    next: u32,

    /// Total number of data bytes.
    total: u64,

    low: Option<u32>,
    high: u64,
    entry: Option<u32>,
    complete: bool,
}

impl Default for HexParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HexParser {
    /// Creates a parser positioned at the start of a file.
    pub fn new() -> Self {
        Self {
            record: None,
            line: 1,
            pending: Vec::new(),
            start: 0,
            next: 0,
            total: 0,
            low: None,
            high: 0,
            entry: None,
            complete: false,
        }
    }

    /// Returns `true` once the end-of-file record has been processed.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Feeds one character.
    pub fn feed(
        &mut self,
        ch: u8,
        sink: &mut impl FnMut(HexBlob) -> Result<(), HexError>,
    ) -> Result<(), HexError> {
        match ch {
            b'\r' | b'\n' => {
                if let Some(record) = self.record.take() {
                    self.handle(&record, sink)?;
                }

                if ch == b'\n' {
                    self.line += 1;
                }
            }

            b':' => {
                if self.record.is_some() {
                    return Err(HexError::Unterminated { line: self.line });
                }

                self.record = Some(Record::default());
            }

            _ if ch.is_ascii_whitespace() => {}

            _ => {
                let line = self.line;

                let (Some(record), Some(digit)) = (&mut self.record, hex_digit(ch))
                else {
                    return Err(HexError::UnexpectedChar {
                        line,
                        ch: char::from(ch),
                    });
                };

                if !record.push_digit(digit) {
                    return Err(HexError::Length { line });
                }
            }
        }

        Ok(())
    }

    /// Finishes parsing.
    ///
    /// A record cut off by the end of input is processed as if a line break
    /// followed it. Data still pending without an end-of-file record is
    /// flushed.
    pub fn finish(
        mut self,
        sink: &mut impl FnMut(HexBlob) -> Result<(), HexError>,
    ) -> Result<ImageInfo, HexError> {
        if let Some(record) = self.record.take() {
            self.handle(&record, sink)?;
        }

        if !self.complete {
            tracing::warn!(line = self.line, "missing end-of-file record");
            self.flush(sink)?;
        }

        let low = Pa(self.low.map(u64::from).unwrap_or_default());

        Ok(ImageInfo {
            entry: self.entry.map(|entry| Pa(u64::from(entry))),
            bias: 0,
            low,
            high: Pa(self.high.max(low.0)),
            size: self.total,
        })
    }

    fn handle(
        &mut self,
        record: &Record,
        sink: &mut impl FnMut(HexBlob) -> Result<(), HexError>,
    ) -> Result<(), HexError> {
        let line = self.line;

        if !record.is_complete() {
            return Err(HexError::Length { line });
        }

        if !record.checksum_ok() {
            return Err(HexError::Checksum { line });
        }

        let kind = RecordType::try_from(record.kind)
            .map_err(|kind| HexError::UnknownRecord { line, kind })?;

        let check_size = |byte_count: u8| {
            if record.byte_count != byte_count || record.address != 0 {
                return Err(HexError::Malformed {
                    line,
                    kind: record.kind,
                });
            }

            Ok(())
        };

        match kind {
            RecordType::Data => {
                let address = (self.next & 0xffff_0000) | u32::from(record.address);

                if address != self.next {
                    self.flush(sink)?;
                    self.start = address;
                }

                let data = record.data();
                self.pending.extend_from_slice(data);
                self.total += data.len() as u64;
                self.next = address.wrapping_add(data.len() as u32);
            }

            RecordType::EndOfFile => {
                self.flush(sink)?;
                self.complete = true;
            }

            RecordType::ExtendedSegmentAddress | RecordType::ExtendedLinearAddress => {
                check_size(2)?;
                self.flush(sink)?;

                let base = u32::from(u16::from_be_bytes([record.data[0], record.data[1]]));
                self.next = match kind {
                    RecordType::ExtendedSegmentAddress => base << 4,
                    _ => base << 16,
                };

                self.start = self.next;
            }

            RecordType::StartSegmentAddress => {
                check_size(4)?;

                let cs = u32::from(u16::from_be_bytes([record.data[0], record.data[1]]));
                let ip = u32::from(u16::from_be_bytes([record.data[2], record.data[3]]));
                self.entry = Some((cs << 4) + ip);
            }

            RecordType::StartLinearAddress => {
                check_size(4)?;

                let data = [record.data[0], record.data[1], record.data[2], record.data[3]];
                self.entry = Some(u32::from_be_bytes(data));
            }
        }

        Ok(())
    }

    fn flush(
        &mut self,
        sink: &mut impl FnMut(HexBlob) -> Result<(), HexError>,
    ) -> Result<(), HexError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let data = std::mem::take(&mut self.pending);
        let end = u64::from(self.start) + data.len() as u64;

        self.low = Some(self.low.map_or(self.start, |low| low.min(self.start)));
        self.high = self.high.max(end);

        tracing::trace!(
            address = %Pa(u64::from(self.start)),
            size = data.len(),
            "hex blob"
        );

        sink(HexBlob {
            address: self.start,
            data,
        })
    }
}

fn hex_digit(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<(Vec<HexBlob>, ImageInfo), HexError> {
        let mut blobs = Vec::new();
        let mut sink = |blob: HexBlob| -> Result<(), HexError> {
            blobs.push(blob);
            Ok(())
        };

        let mut parser = HexParser::new();
        for &ch in text.as_bytes() {
            if parser.is_complete() {
                break;
            }

            parser.feed(ch, &mut sink)?;
        }

        let info = parser.finish(&mut sink)?;
        Ok((blobs, info))
    }

    #[test]
    fn contiguous_records_form_one_blob() -> Result<(), HexError> {
        let (blobs, info) = parse(
            ":0401000001020304F1\n\
             :0401040005060708DD\n\
             :00000001FF\n",
        )?;

        assert_eq!(
            blobs,
            [HexBlob {
                address: 0x100,
                data: vec![1, 2, 3, 4, 5, 6, 7, 8],
            }]
        );
        assert_eq!(info.size, 8);
        assert_eq!(info.low, Pa(0x100));
        assert_eq!(info.high, Pa(0x108));
        assert_eq!(info.entry, None);
        Ok(())
    }

    #[test]
    fn extended_segment_address() -> Result<(), HexError> {
        let (blobs, _) = parse(
            ":020000021000EC\r\n\
             :01000000AA55\r\n\
             :00000001FF\r\n",
        )?;

        assert_eq!(blobs[0].address, 0x1_0000);
        Ok(())
    }

    #[test]
    fn extended_linear_address() -> Result<(), HexError> {
        let (blobs, _) = parse(
            ":020000040800F2\n\
             :02000000BEEF51\n\
             :00000001FF\n",
        )?;

        assert_eq!(blobs[0].address, 0x0800_0000);
        assert_eq!(blobs[0].data, [0xbe, 0xef]);
        Ok(())
    }

    #[test]
    fn start_addresses() -> Result<(), HexError> {
        let (_, info) = parse(":0400000312345678E5\n:00000001FF\n")?;
        assert_eq!(info.entry, Some(Pa(0x12340 + 0x5678)));

        let (_, info) = parse(":04000005080001C12D\n:00000001FF\n")?;
        assert_eq!(info.entry, Some(Pa(0x0800_01c1)));
        Ok(())
    }

    #[test]
    fn input_after_end_of_file_is_ignored() -> Result<(), HexError> {
        let (blobs, _) = parse(":00000001FF\ngarbage")?;
        assert!(blobs.is_empty());
        Ok(())
    }

    #[test]
    fn missing_end_of_file_flushes() -> Result<(), HexError> {
        let (blobs, _) = parse(":0401000001020304F1")?;
        assert_eq!(blobs.len(), 1);
        Ok(())
    }

    #[test]
    fn blank_lines_and_indentation() -> Result<(), HexError> {
        let (blobs, _) = parse("\n\n  :0401000001020304F1\n\n\t:00000001FF\n")?;
        assert_eq!(blobs.len(), 1);
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse(":0401000001020304F1\n:0401G4"),
            Err(HexError::UnexpectedChar { line: 2, ch: 'G' })
        ));

        assert!(matches!(
            parse("0401000001020304F1\n"),
            Err(HexError::UnexpectedChar { line: 1, ch: '0' })
        ));
    }

    #[test]
    fn rejects_short_and_long_records() {
        assert!(matches!(
            parse(":0401000001020304\n"),
            Err(HexError::Length { line: 1 })
        ));

        assert!(matches!(
            parse(":0401000001020304F100\n"),
            Err(HexError::Length { line: 1 })
        ));
    }

    #[test]
    fn rejects_unterminated_record() {
        assert!(matches!(
            parse(":0401000001020304F1:00000001FF\n"),
            Err(HexError::Unterminated { line: 1 })
        ));
    }

    #[test]
    fn rejects_malformed_address_records() {
        // Extended linear address with three data bytes.
        assert!(matches!(
            parse(":03000004080000F1\n"),
            Err(HexError::Malformed { kind: 4, .. })
        ));

        // Start linear address with a non-zero address field.
        assert!(matches!(
            parse(":04000105080001C12C\n"),
            Err(HexError::Malformed { kind: 5, .. })
        ));
    }

    #[test]
    fn rejects_unknown_record_type() {
        assert!(matches!(
            parse(":00000006FA\n"),
            Err(HexError::UnknownRecord { kind: 6, .. })
        ));
    }
}
