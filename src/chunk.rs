use std::str;

use crate::util::find_crlf;
use crate::Error;

/// Incremental decoder for `transfer-encoding: chunked`.
///
/// Input can arrive in any split. Whatever can't be decided yet (like a
/// partial size line) is left unconsumed for the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dechunker {
    Size,
    Chunk(u64),
    CrLf,
    Ending,
    Trailer,
    Ended,
}

impl Dechunker {
    pub fn new() -> Self {
        Dechunker::Size
    }

    /// Consume from `src`, appending chunk data to `dst`. Returns amount of input used.
    pub fn parse_input(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize, Error> {
        let mut index_in = 0;

        loop {
            let src = &src[index_in..];

            let used = match self {
                Dechunker::Size => self.read_size(src)?,
                Dechunker::Chunk(_) => self.read_data(src, dst),
                Dechunker::CrLf => self.expect_crlf(src)?,
                Dechunker::Ending => self.trailer_or_ended(src),
                Dechunker::Trailer => self.trailer(src),
                Dechunker::Ended => None,
            };

            match used {
                Some(n) => index_in += n,
                None => break,
            }
        }

        Ok(index_in)
    }

    #[cfg(test)]
    fn left(&self) -> u64 {
        if let Self::Chunk(l) = self {
            *l
        } else {
            0
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }

    fn read_size(&mut self, src: &[u8]) -> Result<Option<usize>, Error> {
        const SANITY_CHECK: usize = 100;

        let i = match find_crlf(src) {
            Some(v) => v,
            None => {
                if src.len() > SANITY_CHECK {
                    return Err(Error::Protocol("chunk size line too long".into()));
                }
                return Ok(None);
            }
        };

        if i > SANITY_CHECK {
            return Err(Error::Protocol("chunk size line too long".into()));
        }

        // Chunk extensions after ';' are ignored.
        let line = &src[..i];
        let len_end = line.iter().position(|c| *c == b';').unwrap_or(i);

        let len_str = str::from_utf8(&line[..len_end])
            .map_err(|_| Error::Protocol("chunk length is not ascii".into()))?
            .trim();

        let len = u64::from_str_radix(len_str, 16).map_err(|_| {
            Error::Protocol(format!("chunk length is not a number: {:?}", len_str))
        })?;

        trace!("Chunk size: {}", len);

        *self = if len == 0 {
            Self::Ending
        } else {
            Self::Chunk(len)
        };

        Ok(Some(i + 2))
    }

    fn read_data(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Option<usize> {
        let Self::Chunk(left) = self else {
            unreachable!()
        };

        let left_usize = (*left).min(usize::MAX as u64) as usize;
        let to_read = src.len().min(left_usize);

        dst.extend_from_slice(&src[..to_read]);
        *left -= to_read as u64;

        if *left == 0 {
            *self = Self::CrLf;
        }

        if to_read > 0 {
            Some(to_read)
        } else {
            None
        }
    }

    fn expect_crlf(&mut self, src: &[u8]) -> Result<Option<usize>, Error> {
        if src.len() < 2 {
            return Ok(None);
        }

        if &src[..2] != b"\r\n" {
            return Err(Error::Protocol("chunk expected crlf after data".into()));
        }

        *self = Self::Size;

        Ok(Some(2))
    }

    fn trailer_or_ended(&mut self, src: &[u8]) -> Option<usize> {
        let i = find_crlf(src)?;

        if i == 0 {
            *self = Self::Ended;
            Some(2)
        } else {
            // Trailer headers are read past and ignored.
            *self = Self::Trailer;
            Some(0)
        }
    }

    fn trailer(&mut self, src: &[u8]) -> Option<usize> {
        let i = find_crlf(src)?;

        // advance the trailer, and 2 for the crlf.
        *self = Self::Ending;

        Some(i + 2)
    }
}
