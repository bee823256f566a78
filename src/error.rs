use std::io;

use thiserror::Error;

use crate::url::UrlError;

/// Error type for rawcurl
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("malformed url {url:?}: {reason}")]
    MalformedUrl { url: String, reason: UrlError },

    #[error("connection to {addr} failed: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("tls handshake with {host} failed: {reason}")]
    TlsHandshake { host: String, reason: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("truncated response: got {received} bytes{}", expected_suffix(.expected))]
    TruncatedResponse {
        expected: Option<u64>,
        received: u64,
    },

    #[error("unsupported content-encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("failed to decode body: {0}")]
    Decoding(String),

    #[error("too many redirects (max {0})")]
    TooManyRedirects(usize),

    #[error("bad header: {0}")]
    BadHeader(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("cookie store: {0}")]
    CookieStore(#[source] io::Error),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}

fn expected_suffix(expected: &Option<u64>) -> String {
    match expected {
        Some(n) => format!(" of expected {}", n),
        None => String::new(),
    }
}

impl Error {
    /// Attach the peer address to a raw I/O failure.
    pub(crate) fn with_addr(self, addr: &str) -> Error {
        match self {
            Error::Io(source) => Error::Connection {
                addr: addr.to_string(),
                source,
            },
            e => e,
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(value: httparse::Error) -> Self {
        Error::Protocol(value.to_string())
    }
}

/// A failed top-level call, with the url of the hop that failed.
#[derive(Debug, Error)]
#[error("{url}: {source}")]
pub struct CallError {
    url: String,
    #[source]
    source: Error,
}

impl CallError {
    pub(crate) fn new(url: impl Into<String>, source: Error) -> Self {
        CallError {
            url: url.into(),
            source,
        }
    }

    /// The url of the hop that failed.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn error(&self) -> &Error {
        &self.source
    }

    pub fn into_error(self) -> Error {
        self.source
    }
}
