//! Content-Encoding decoding (gzip, deflate).

use miniz_oxide::inflate::{decompress_to_vec, decompress_to_vec_zlib};

use crate::util::compare_lowercase_ascii;
use crate::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 0x08;

// Flag bits in header byte 3
const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

const GZIP_HEADER_LEN: usize = 10;
const GZIP_TRAILER_LEN: usize = 8;

/// Decode a response body according to its `Content-Encoding`.
///
/// Absent and `identity` are no-ops. Several codings (`deflate, gzip`) are
/// undone in reverse order of application. Unknown codings are an error rather
/// than passing the raw bytes through.
pub fn decode(body: Vec<u8>, content_encoding: Option<&str>) -> Result<Vec<u8>, Error> {
    let Some(encoding) = content_encoding else {
        return Ok(body);
    };

    let codings: Vec<String> = encoding
        .split(',')
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    // Check all codings upfront, also for empty bodies.
    for coding in &codings {
        if !is_supported(coding) {
            return Err(Error::UnsupportedEncoding(coding.clone()));
        }
    }

    // No body (HEAD, 204, 304 or just empty) means nothing to decode.
    if body.is_empty() {
        return Ok(body);
    }

    let mut body = body;

    for coding in codings.iter().rev() {
        body = match coding.as_str() {
            "gzip" | "x-gzip" => gunzip(&body)?,
            "deflate" => inflate(&body)?,
            _ => body,
        };
        trace!("Decoded {}: {} bytes", coding, body.len());
    }

    Ok(body)
}

fn is_supported(coding: &str) -> bool {
    ["identity", "gzip", "x-gzip", "deflate"]
        .iter()
        .any(|c| compare_lowercase_ascii(coding, c))
}

/// Decompress gzip data (RFC 1952), validating the CRC-32 and size trailer.
fn gunzip(data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.len() < GZIP_HEADER_LEN + GZIP_TRAILER_LEN {
        return Err(Error::Decoding("gzip: too short".into()));
    }

    if data[..2] != GZIP_MAGIC {
        return Err(Error::Decoding("gzip: bad magic bytes".into()));
    }

    if data[2] != METHOD_DEFLATE {
        return Err(Error::Decoding(format!("gzip: unknown method {}", data[2])));
    }

    let flags = data[3];
    let mut pos = GZIP_HEADER_LEN;

    let truncated = || Error::Decoding("gzip: truncated header".into());

    if flags & FEXTRA != 0 {
        let xlen = data.get(pos..pos + 2).ok_or_else(truncated)?;
        let xlen = u16::from_le_bytes([xlen[0], xlen[1]]) as usize;
        pos += 2 + xlen;
    }

    // FNAME and FCOMMENT are zero terminated.
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            let rest = data.get(pos..).ok_or_else(truncated)?;
            let end = rest.iter().position(|c| *c == 0).ok_or_else(truncated)?;
            pos += end + 1;
        }
    }

    if flags & FHCRC != 0 {
        pos += 2;
    }

    if data.len() < pos + GZIP_TRAILER_LEN {
        return Err(truncated());
    }

    let trailer_start = data.len() - GZIP_TRAILER_LEN;
    let trailer = &data[trailer_start..];

    let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let expected_size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

    let out = decompress_to_vec(&data[pos..trailer_start])
        .map_err(|e| Error::Decoding(format!("gzip: {:?}", e.status)))?;

    let actual_crc = crc32(&out);
    if actual_crc != expected_crc {
        return Err(Error::Decoding(format!(
            "gzip: crc mismatch (expected {:08x}, got {:08x})",
            expected_crc, actual_crc
        )));
    }

    // ISIZE is the original size mod 2^32
    if out.len() as u32 != expected_size {
        return Err(Error::Decoding(format!(
            "gzip: size mismatch (expected {}, got {})",
            expected_size,
            out.len()
        )));
    }

    Ok(out)
}

/// `deflate` is supposed to be zlib wrapped, but some servers send a raw
/// deflate stream. Try both.
fn inflate(data: &[u8]) -> Result<Vec<u8>, Error> {
    match decompress_to_vec_zlib(data) {
        Ok(v) => Ok(v),
        Err(zlib_err) => {
            trace!("Not zlib ({:?}), trying raw deflate", zlib_err.status);
            decompress_to_vec(data).map_err(|e| {
                Error::Decoding(format!(
                    "deflate: {:?} / {:?}",
                    zlib_err.status, e.status
                ))
            })
        }
    }
}

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

/// CRC-32 (ISO 3309) as used by the gzip trailer.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFFu32;
    for &b in data {
        crc = CRC32_TABLE[((crc ^ b as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    crc ^ 0xFFFFFFFF
}

#[cfg(test)]
pub(crate) mod test {
    use miniz_oxide::deflate::{compress_to_vec, compress_to_vec_zlib};

    use super::*;

    pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
        let mut out = vec![0x1f, 0x8b, 8, 0, 0, 0, 0, 0, 0, 0xff];
        out.extend(compress_to_vec(data, 6));
        out.extend(crc32(data).to_le_bytes());
        out.extend((data.len() as u32).to_le_bytes());
        out
    }

    const TEXT: &[u8] = b"The quick brown fox jumps over the lazy dog. \
        The quick brown fox jumps over the lazy dog.";

    #[test]
    fn crc32_known_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn identity() {
        assert_eq!(decode(b"abc".to_vec(), None).unwrap(), b"abc");
        assert_eq!(decode(b"abc".to_vec(), Some("identity")).unwrap(), b"abc");
    }

    #[test]
    fn gzip_decodes() {
        let body = gzip(TEXT);
        assert_ne!(body, TEXT);
        assert_eq!(decode(body.clone(), Some("gzip")).unwrap(), TEXT);
        assert_eq!(decode(body, Some("X-GZIP")).unwrap(), TEXT);
    }

    #[test]
    fn gzip_with_file_name() {
        let mut body = gzip(TEXT);
        body[3] = FNAME;
        // Insert "name.txt\0" after the fixed header.
        let tail = body.split_off(GZIP_HEADER_LEN);
        body.extend(b"name.txt\0");
        body.extend(tail);
        assert_eq!(decode(body, Some("gzip")).unwrap(), TEXT);
    }

    #[test]
    fn gzip_corrupt_trailer() {
        let mut body = gzip(TEXT);
        let n = body.len();
        body[n - 8] ^= 0xff;
        assert!(matches!(
            decode(body, Some("gzip")),
            Err(Error::Decoding(_))
        ));
    }

    #[test]
    fn gzip_wrong_size() {
        let mut body = gzip(TEXT);
        let n = body.len();
        body[n - 1] ^= 0x01;
        assert!(matches!(
            decode(body, Some("gzip")),
            Err(Error::Decoding(_))
        ));
    }

    #[test]
    fn gzip_bad_magic() {
        assert!(matches!(
            decode(vec![0; 30], Some("gzip")),
            Err(Error::Decoding(_))
        ));
    }

    #[test]
    fn deflate_zlib_and_raw() {
        let zlib = compress_to_vec_zlib(TEXT, 6);
        assert_eq!(decode(zlib, Some("deflate")).unwrap(), TEXT);

        let raw = compress_to_vec(TEXT, 6);
        assert_eq!(decode(raw, Some("deflate")).unwrap(), TEXT);
    }

    #[test]
    fn stacked_encodings() {
        // deflate applied first, then gzip.
        let body = gzip(&compress_to_vec_zlib(TEXT, 6));
        assert_eq!(decode(body, Some("deflate, gzip")).unwrap(), TEXT);
    }

    #[test]
    fn unsupported() {
        assert!(matches!(
            decode(b"abc".to_vec(), Some("br")),
            Err(Error::UnsupportedEncoding(e)) if e == "br"
        ));
    }

    #[test]
    fn empty_body_untouched() {
        assert_eq!(decode(vec![], Some("gzip")).unwrap(), b"");
    }
}
