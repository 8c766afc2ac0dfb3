use zlib_rs::{
    InflateFlush, ReturnCode,
    c_api::z_stream,
    inflate::{InflateConfig, InflateStream, end, inflate, init},
};

use crate::GzipError;

/// The gzip member magic.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const DEFLATED: u8 = 8;

const HEAD_CRC: u8 = 0x02;
const EXTRA_FIELD: u8 = 0x04;
const ORIG_NAME: u8 = 0x08;
const COMMENT: u8 = 0x10;
const RESERVED: u8 = 0xe0;

const FIXED_HEADER_SIZE: usize = 10;

// Negative window bits select a raw DEFLATE stream.
const RAW_DEFLATE: InflateConfig = InflateConfig { window_bits: -15 };

/// Returns `true` if `src` starts with the gzip magic.
pub fn is_gzip(src: &[u8]) -> bool {
    src.starts_with(&GZIP_MAGIC)
}

/// Returns the offset of the DEFLATE stream inside a gzip member.
///
/// The magic itself is not checked.
pub fn skip_gzip_header(src: &[u8]) -> Result<usize, GzipError> {
    if src.len() < FIXED_HEADER_SIZE {
        return Err(GzipError::Truncated);
    }

    let method = src[2];
    if method != DEFLATED {
        return Err(GzipError::Method(method));
    }

    let flags = src[3];
    if flags & RESERVED != 0 {
        return Err(GzipError::ReservedFlags(flags));
    }

    let mut offset = FIXED_HEADER_SIZE;

    if flags & EXTRA_FIELD != 0 {
        let length = src.get(10..12).ok_or(GzipError::Truncated)?;
        offset = 12 + usize::from(u16::from_le_bytes([length[0], length[1]]));
    }

    if flags & ORIG_NAME != 0 {
        offset = skip_string(src, offset);
    }

    if flags & COMMENT != 0 {
        offset = skip_string(src, offset);
    }

    if flags & HEAD_CRC != 0 {
        offset += 2;
    }

    if offset >= src.len() {
        return Err(GzipError::Truncated);
    }

    Ok(offset)
}

/// Skips a NUL-terminated string starting at `offset`.
fn skip_string(src: &[u8], offset: usize) -> usize {
    let rest = src.get(offset..).unwrap_or_default();

    match memchr::memchr(0, rest) {
        Some(nul) => offset + nul + 1,
        None => src.len(),
    }
}

/// Decompresses the gzip member in `src` into `dst`.
///
/// Returns the number of bytes written. The whole member must fit: a
/// stream that does not end within `dst` is an error.
pub fn gunzip(dst: &mut [u8], src: &[u8]) -> Result<usize, GzipError> {
    let offset = skip_gzip_header(src)?;
    let src = &src[offset..];

    let mut strm = z_stream {
        next_in: src.as_ptr() as *mut _,
        avail_in: src.len().try_into().map_err(|_| GzipError::Truncated)?,
        next_out: dst.as_mut_ptr(),
        avail_out: dst.len().try_into().unwrap_or(u32::MAX),
        ..Default::default()
    };

    let ret = init(&mut strm, RAW_DEFLATE);
    if ret != ReturnCode::Ok {
        return Err(GzipError::Inflate(ret));
    }

    // SAFETY: `strm` was initialized by `init` above.
    let stream = unsafe { InflateStream::from_stream_mut(&mut strm) }
        .ok_or(GzipError::Inflate(ReturnCode::StreamError))?;

    // SAFETY: The input and output pointers cover live slices.
    let ret = unsafe { inflate(stream, InflateFlush::Finish) };
    let _ = end(stream);

    match ret {
        ReturnCode::StreamEnd => Ok(strm.total_out as usize),
        ReturnCode::BufError | ReturnCode::Ok if strm.avail_out == 0 => {
            Err(GzipError::TooBig { limit: dst.len() })
        }
        ret => Err(GzipError::Inflate(ret)),
    }
}

/// Decompresses the gzip member in `src` into a new buffer of at most
/// `limit` bytes.
///
/// The buffer grows as the stream is decoded, so small images do not
/// allocate `limit` bytes up front.
pub fn gunzip_vec(src: &[u8], limit: usize) -> Result<Vec<u8>, GzipError> {
    const INITIAL_SIZE: usize = 64 * 1024;

    let offset = skip_gzip_header(src)?;
    let src = &src[offset..];

    let mut strm = z_stream {
        next_in: src.as_ptr() as *mut _,
        avail_in: src.len().try_into().map_err(|_| GzipError::Truncated)?,
        ..Default::default()
    };

    let ret = init(&mut strm, RAW_DEFLATE);
    if ret != ReturnCode::Ok {
        return Err(GzipError::Inflate(ret));
    }

    let mut out = vec![0u8; INITIAL_SIZE.min(limit)];

    let result = loop {
        let done = strm.total_out as usize;
        let room = out.len() - done;

        strm.next_out = out[done..].as_mut_ptr();
        strm.avail_out = room.try_into().unwrap_or(u32::MAX);

        // SAFETY: `strm` was initialized by `init` above.
        let Some(stream) = (unsafe { InflateStream::from_stream_mut(&mut strm) })
        else {
            break Err(GzipError::Inflate(ReturnCode::StreamError));
        };

        // SAFETY: The input and output pointers cover live slices.
        let ret = unsafe { inflate(stream, InflateFlush::NoFlush) };

        match ret {
            ReturnCode::StreamEnd => break Ok(strm.total_out as usize),
            ReturnCode::Ok | ReturnCode::BufError if strm.avail_out == 0 => {
                if out.len() >= limit {
                    break Err(GzipError::TooBig { limit });
                }

                let size = out.len().saturating_mul(2).min(limit);
                out.resize(size, 0);
            }
            ReturnCode::Ok => continue,
            // Input exhausted before the end of the stream.
            ReturnCode::BufError => break Err(GzipError::Inflate(ReturnCode::DataError)),
            ret => break Err(GzipError::Inflate(ret)),
        }
    };

    // SAFETY: `strm` was initialized by `init` above.
    if let Some(stream) = unsafe { InflateStream::from_stream_mut(&mut strm) } {
        let _ = end(stream);
    }

    let size = result?;
    out.truncate(size);
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a gzip member out of stored DEFLATE blocks.
    pub(crate) fn stored_gzip(data: &[u8], flags: u8, extra: &[u8]) -> Vec<u8> {
        let mut out = vec![0x1f, 0x8b, DEFLATED, flags, 0, 0, 0, 0, 0, 0xff];
        out.extend_from_slice(extra);

        let mut chunks = data.chunks(0xffff).peekable();
        if chunks.peek().is_none() {
            out.extend_from_slice(&[0x01, 0x00, 0x00, 0xff, 0xff]);
        }

        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            let len = chunk.len() as u16;

            out.push(u8::from(last));
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&(!len).to_le_bytes());
            out.extend_from_slice(chunk);
        }

        // CRC32 and ISIZE are not verified.
        out.extend_from_slice(&[0; 8]);
        out
    }

    #[test]
    fn gunzip_stored_member() -> Result<(), GzipError> {
        let data = b"Linux version 6.1.0";
        let src = stored_gzip(data, 0, &[]);

        let mut dst = [0u8; 64];
        let size = gunzip(&mut dst, &src)?;

        assert_eq!(&dst[..size], data);
        Ok(())
    }

    #[test]
    fn optional_header_fields_are_skipped() -> Result<(), GzipError> {
        let mut extra = vec![4, 0, b'a', b'b', b'c', b'd'];
        extra.extend_from_slice(b"vmlinux\0");
        extra.extend_from_slice(b"built today\0");
        extra.extend_from_slice(&[0xaa, 0xbb]);

        let src = stored_gzip(b"payload", EXTRA_FIELD | ORIG_NAME | COMMENT | HEAD_CRC, &extra);

        assert_eq!(skip_gzip_header(&src)?, 10 + extra.len());
        assert_eq!(gunzip_vec(&src, 1024)?, b"payload");
        Ok(())
    }

    #[test]
    fn malformed_headers() {
        assert!(matches!(skip_gzip_header(&[0x1f, 0x8b, 8]), Err(GzipError::Truncated)));

        let mut src = stored_gzip(b"x", 0, &[]);
        src[2] = 7;
        assert!(matches!(skip_gzip_header(&src), Err(GzipError::Method(7))));

        let src = stored_gzip(b"x", 0x20, &[]);
        assert!(matches!(skip_gzip_header(&src), Err(GzipError::ReservedFlags(0x20))));

        // A file name running to the end of the buffer.
        let src = [0x1f, 0x8b, 8, ORIG_NAME, 0, 0, 0, 0, 0, 0xff, b'a', b'b'];
        assert!(matches!(skip_gzip_header(&src), Err(GzipError::Truncated)));
    }

    #[test]
    fn output_must_fit() {
        let src = stored_gzip(&[0x5a; 100], 0, &[]);
        let mut dst = [0u8; 50];

        assert!(matches!(gunzip(&mut dst, &src), Err(GzipError::TooBig { limit: 50 })));
        assert!(matches!(gunzip_vec(&src, 99), Err(GzipError::TooBig { limit: 99 })));
    }

    #[test]
    fn output_grows_across_blocks() -> Result<(), GzipError> {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let src = stored_gzip(&data, 0, &[]);

        assert_eq!(gunzip_vec(&src, 1 << 20)?, data);
        Ok(())
    }

    #[test]
    fn truncated_stream() {
        let src = stored_gzip(&[1u8; 100], 0, &[]);
        let src = &src[..60];

        assert!(matches!(gunzip_vec(src, 1024), Err(GzipError::Inflate(_))));
    }
}
