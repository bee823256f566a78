//! Minimal blocking HTTP/1.1 client over raw sockets.
//!
//! rawcurl writes the request bytes itself and parses the response off the
//! socket: status line, headers, and a body that is content-length delimited,
//! chunked or read until close. Bodies encoded with gzip or deflate are
//! decoded. Redirects are followed with an explicit state machine, and cookies
//! are carried between hops in a [`CookieJar`].
//!
//! Each hop uses a fresh connection with `Connection: close`. There is no
//! connection pooling, proxy support or HTTP/2.
//!
//! # Example
//!
//! ```no_run
//! use rawcurl::{fetch, CallConfig, CookieJar, TcpConnector};
//!
//! let connector = TcpConnector::new()?;
//! let mut jar = CookieJar::new();
//!
//! let response = fetch(&connector, "https://example.test/", &CallConfig::new(), &mut jar)?;
//!
//! println!("{} {}", response.status(), response.reason());
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! For calls sharing a persisted jar, see [`Client`].
//!
//! # Logging
//!
//! Request and response heads are logged at `debug` level prefixed `> ` and `< `,
//! like the verbose output of a command line client. Framing details are at `trace`.

#[macro_use]
extern crate log;

mod util;

mod error;
pub use error::{CallError, Error};

mod url;
pub use self::url::{Scheme, Url, UrlError};

mod header;
pub use header::Headers;

pub mod request;
pub use request::Request;

mod body;
mod chunk;
mod fill_more;

pub mod parser;
pub use parser::{Limits, RawResponse};

pub mod decode;

mod cookie;
pub use cookie::{Cookie, CookieJar, CookieStore, MemoryStore};

mod config;
pub use config::CallConfig;

mod transport;
pub use transport::{Connector, Stream, TcpConnector};

pub mod client;
pub use client::{fetch, Client, Response};

// Re-export the basis for this library.
pub use http;
