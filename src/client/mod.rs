//! Top-level calls
//!
//! A call is one or more hops. Each hop opens a fresh connection, writes the
//! request, reads the whole response and closes again. A redirect response
//! starts another hop to the resolved `Location`.
//!
//! The [`Flow`] object encodes the redirect handling using state variables,
//! for example `Flow<Requesting>` for the stage where a hop is to be performed.
//!
//! The states are:
//!
//! * **Init** - The url and config are checked.
//! * **Requesting** - One hop: cookies from the jar, request out, response in,
//!   body decoded, cookies back into the jar.
//! * **Redirecting** - The hop got a redirect. The next url is resolved and the
//!   method and body rewritten for the status.
//!
//! A hop that fails ends the whole call with a [`CallError`] carrying the url
//! of that hop. Nothing is retried.
//!
//! ```text
//!     ┌──────────────────┐
//!     │       Init       │
//!     └──────────────────┘
//!               │
//!               ▼
//!     ┌──────────────────┐           ┌──────────────────┐
//!     │    Requesting    │◀─────────▶│   Redirecting    │
//!     └──────────────────┘           └──────────────────┘
//!          │         │                         │
//!          ▼         └─────────────┐           │
//!     ┌──────────┐            ┌──────────┐     │
//!     │   Done   │            │  Failed  │◀────┘
//!     └──────────┘            └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use rawcurl::{CallConfig, Client, MemoryStore};
//!
//! let client = Client::new(MemoryStore::new()).unwrap();
//!
//! let config = CallConfig::new().header("Accept-Language", "sv");
//! let response = client.call("https://example.test/my-path", &config).unwrap();
//!
//! println!("{} after {} hops", response.status(), response.chain().len());
//! ```

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use http::Version;

use crate::config::CallConfig;
use crate::cookie::{Cookie, CookieJar, CookieStore};
use crate::header::Headers;
use crate::transport::{Connector, TcpConnector};
use crate::url::Url;
use crate::{CallError, Error};

pub mod flow;
pub use flow::{Flow, RequestingResult};

#[cfg(test)]
mod test;

/// The final response of a call.
#[derive(Debug, Clone)]
pub struct Response {
    version: Version,
    status: u16,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
    chain: Vec<Url>,
}

impl Response {
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The content decoded body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Every url requested, in order. The last one produced this response.
    pub fn chain(&self) -> &[Url] {
        &self.chain
    }

    /// The url that produced this response.
    pub fn url(&self) -> Option<&Url> {
        self.chain.last()
    }
}

/// Run a call to completion, using and updating `jar`.
pub fn fetch<C: Connector>(
    connector: &C,
    url: &str,
    config: &CallConfig,
    jar: &mut CookieJar,
) -> Result<Response, CallError> {
    let mut flow = Flow::new(url, config)?.proceed();

    loop {
        flow = match flow.perform(connector, jar)? {
            RequestingResult::Done(response) => return Ok(response),
            RequestingResult::Redirecting(redirect) => redirect.proceed()?,
        };
    }
}

/// Calls sharing a persisted cookie jar.
///
/// Each call loads the jar from the store, runs and saves the jar back if it
/// changed. Concurrent calls on the same client are serialized so they never
/// see each others half updated jar.
pub struct Client<S, C = TcpConnector> {
    store: S,
    connector: C,
    jar: Mutex<CookieJar>,
}

impl<S: CookieStore> Client<S, TcpConnector> {
    pub fn new(store: S) -> Result<Self, Error> {
        Ok(Client::with_connector(store, TcpConnector::new()?))
    }
}

impl<S: CookieStore, C: Connector> Client<S, C> {
    pub fn with_connector(store: S, connector: C) -> Self {
        Client {
            store,
            connector,
            jar: Mutex::new(CookieJar::new()),
        }
    }

    pub fn call(&self, url: &str, config: &CallConfig) -> Result<Response, CallError> {
        let mut jar = self.jar.lock().unwrap_or_else(PoisonError::into_inner);

        let loaded = self
            .store
            .load()
            .map_err(|e| CallError::new(url, Error::CookieStore(e)))?;

        *jar = CookieJar::from_entries(loaded);
        jar.remove_expired(Utc::now());

        let result = fetch(&self.connector, url, config, &mut jar);

        if !jar.take_dirty() {
            return result;
        }

        trace!("Saving {} cookies", jar.len());

        match (self.store.save(&jar.entries()), result) {
            (Ok(()), result) => result,
            (Err(e), Ok(_)) => Err(CallError::new(url, Error::CookieStore(e))),
            (Err(e), Err(call_err)) => {
                warn!("Failed to save cookies after failed call: {}", e);
                Err(call_err)
            }
        }
    }

    /// Cookies in the jar after the last call.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.jar
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}
