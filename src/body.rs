use std::fmt;

use http::{Method, Version};

use crate::chunk::Dechunker;
use crate::header::Headers;
use crate::Error;

/// How the response body is delimited on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyReader {
    /// No body is expected either due to the status or method.
    NoBody,
    /// Delimited by content-length.
    /// The value is what's left to receive.
    LengthDelimited { expected: u64, left: u64 },
    /// Chunked transfer encoding
    Chunked(Dechunker),
    /// Expect remote to close at end of body. `signaled` is true when the
    /// server said so via `Connection: close` or HTTP/1.0.
    CloseDelimited { signaled: bool },
}

impl BodyReader {
    pub fn for_response(
        version: Version,
        method: &Method,
        status_code: u16,
        headers: &Headers,
    ) -> Result<Self, Error> {
        let is_success = (200..=299).contains(&status_code);
        let is_informational = (100..=199).contains(&status_code);

        let has_no_body =
            // https://datatracker.ietf.org/doc/html/rfc2616#section-4.3
            // All responses to the HEAD request method
            // MUST NOT include a message-body, even though the presence of entity-
            // header fields might lead one to believe they do.
            method == Method::HEAD ||
            // A client MUST ignore any Content-Length or Transfer-Encoding
            // header fields received in a successful response to CONNECT.
            is_success && method == Method::CONNECT ||
            // All 1xx (informational), 204 (no content), and 304 (not modified) responses
            // MUST NOT include a message-body.
            is_informational ||
            matches!(status_code, 204 | 304);

        if has_no_body {
            return Ok(Self::NoBody);
        }

        // https://datatracker.ietf.org/doc/html/rfc2616#section-4.3
        // All other responses do include a message-body, although it MAY be of zero length.
        Self::header_defined(version, headers)
    }

    fn header_defined(version: Version, headers: &Headers) -> Result<Self, Error> {
        let http10 = version == Version::HTTP_10;

        if !http10 && headers.has_token("transfer-encoding", "chunked") {
            // https://datatracker.ietf.org/doc/html/rfc2616#section-4.4
            // Messages MUST NOT include both a Content-Length header field and a
            // non-identity transfer-coding. If the message does include a non-
            // identity transfer-coding, the Content-Length MUST be ignored.
            return Ok(Self::Chunked(Dechunker::new()));
        }

        let mut content_length: Option<u64> = None;

        for value in headers.get_all("content-length") {
            let v = value.trim().parse::<u64>().map_err(|_| {
                Error::Protocol(format!("content-length header not a number: {:?}", value))
            })?;

            // Repeated identical values are tolerated, conflicting ones are not.
            if content_length.map(|c| c != v).unwrap_or(false) {
                return Err(Error::Protocol(
                    "conflicting content-length headers".into(),
                ));
            }
            content_length = Some(v);
        }

        if let Some(len) = content_length {
            return Ok(Self::LengthDelimited {
                expected: len,
                left: len,
            });
        }

        let signaled = http10 || headers.has_token("connection", "close");

        Ok(Self::CloseDelimited { signaled })
    }

    /// Consume body bytes from `src` into `dst`. Returns the amount of input used.
    pub fn read(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize, Error> {
        let used = match self {
            BodyReader::NoBody => 0,
            BodyReader::LengthDelimited { left, .. } => {
                let left_usize = (*left).min(usize::MAX as u64) as usize;
                let to_read = src.len().min(left_usize);
                dst.extend_from_slice(&src[..to_read]);
                *left -= to_read as u64;
                to_read
            }
            BodyReader::Chunked(dechunker) => dechunker.parse_input(src, dst)?,
            BodyReader::CloseDelimited { .. } => {
                dst.extend_from_slice(src);
                src.len()
            }
        };

        trace!("Read body: {}", used);

        Ok(used)
    }

    pub fn is_ended(&self) -> bool {
        match self {
            BodyReader::NoBody => true,
            BodyReader::LengthDelimited { left, .. } => *left == 0,
            BodyReader::Chunked(v) => v.is_ended(),
            BodyReader::CloseDelimited { .. } => false,
        }
    }

    pub fn is_close_delimited(&self) -> bool {
        matches!(self, BodyReader::CloseDelimited { .. })
    }

    /// Content-length when known upfront.
    pub fn expected(&self) -> Option<u64> {
        match self {
            BodyReader::LengthDelimited { expected, .. } => Some(*expected),
            _ => None,
        }
    }
}

impl fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBody => write!(f, "NoBody"),
            Self::LengthDelimited { left, .. } => {
                f.debug_tuple("LengthDelimited").field(left).finish()
            }
            Self::Chunked(_) => write!(f, "Chunked"),
            Self::CloseDelimited { signaled } => f
                .debug_struct("CloseDelimited")
                .field("signaled", signaled)
                .finish(),
        }
    }
}
