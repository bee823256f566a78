//! Reading a response off the wire.

use std::io;

use http::{Method, Version};

use crate::body::BodyReader;
use crate::fill_more::FillMoreBuffer;
use crate::header::Headers;
use crate::Error;

/// Max number of headers to parse from an HTTP response
pub const MAX_RESPONSE_HEADERS: usize = 128;

/// Max size of status line plus headers.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Bounds when reading a response.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Cap for bodies that are neither length delimited, chunked, nor
    /// ended by a server signaled `Connection: close`.
    pub max_unframed_body: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_unframed_body: 16 * 1024 * 1024,
        }
    }
}

/// Status line and headers.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

impl ResponseHead {
    /// 1xx responses other than 101 are followed by the real response.
    fn is_interim(&self) -> bool {
        (100..=199).contains(&self.status) && self.status != 101
    }
}

/// A response as read from the connection. The body is de-chunked
/// but not content decoded.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Try to parse a status line and headers from the start of `input`.
///
/// Returns `None` when more input is needed, otherwise the amount of input
/// used and the parsed head.
pub fn try_parse_head(input: &[u8]) -> Result<Option<(usize, ResponseHead)>, Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut res = httparse::Response::new(&mut headers);

    let input_used = match res.parse(input)? {
        httparse::Status::Complete(v) => v,
        httparse::Status::Partial => return Ok(None),
    };

    let version = match res.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(Error::Protocol("unsupported http version".into())),
    };

    let status = res
        .code
        .ok_or_else(|| Error::Protocol("response missing status".into()))?;

    let reason = res.reason.unwrap_or("").to_string();

    let headers = res
        .headers
        .iter()
        .map(|h| (h.name, String::from_utf8_lossy(h.value).into_owned()))
        .collect();

    Ok(Some((
        input_used,
        ResponseHead {
            version,
            status,
            reason,
            headers,
        },
    )))
}

/// Read one complete response from the connection.
///
/// `method` is the method of the request, since a response to `HEAD` has no body.
pub fn read_response<R: io::Read>(
    reader: R,
    method: &Method,
    limits: &Limits,
) -> Result<RawResponse, Error> {
    let mut buf = FillMoreBuffer::new(reader);

    let head = read_head(&mut buf)?;

    for (name, value) in head.headers.iter() {
        debug!("< {}: {}", name, value);
    }

    let mut reader = BodyReader::for_response(head.version, method, head.status, &head.headers)?;

    trace!("Body mode: {:?}", reader);

    if let BodyReader::CloseDelimited { signaled: false } = reader {
        warn!("Response has no framing and no connection close, reading to end");
    }

    let mut body = Vec::new();

    loop {
        let used = reader.read(buf.buffer(), &mut body)?;
        buf.consume(used);

        if reader.is_ended() {
            break;
        }

        if let BodyReader::CloseDelimited { signaled: false } = reader {
            if body.len() > limits.max_unframed_body {
                return Err(Error::Protocol(format!(
                    "unframed response body larger than {} bytes",
                    limits.max_unframed_body
                )));
            }
        }

        let n = buf.fill_more()?;

        if n == 0 {
            if reader.is_close_delimited() {
                break;
            }

            return Err(Error::TruncatedResponse {
                expected: reader.expected(),
                received: body.len() as u64,
            });
        }
    }

    trace!("Response body: {} bytes", body.len());

    Ok(RawResponse {
        version: head.version,
        status: head.status,
        reason: head.reason,
        headers: head.headers,
        body,
    })
}

fn read_head<R: io::Read>(buf: &mut FillMoreBuffer<R>) -> Result<ResponseHead, Error> {
    loop {
        if let Some((used, head)) = try_parse_head(buf.buffer())? {
            buf.consume(used);

            debug!("< {:?} {} {}", head.version, head.status, head.reason);

            if head.is_interim() {
                trace!("Skip interim response: {}", head.status);
                continue;
            }

            return Ok(head);
        }

        if buf.buffer().len() > MAX_HEAD_SIZE {
            return Err(Error::Protocol(format!(
                "response head larger than {} bytes",
                MAX_HEAD_SIZE
            )));
        }

        if buf.fill_more()? == 0 {
            return Err(Error::TruncatedResponse {
                expected: None,
                received: buf.buffer().len() as u64,
            });
        }
    }
}
