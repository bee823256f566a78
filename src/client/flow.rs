//! A sequence of hops, following redirects.

use std::fmt;
use std::io::Write;
use std::time::Duration;

use chrono::Utc;
use http::Method;

use crate::config::CallConfig;
use crate::cookie::CookieJar;
use crate::decode::decode;
use crate::header::Headers;
use crate::parser::{read_response, Limits, RawResponse};
use crate::request::Request;
use crate::transport::Connector;
use crate::url::Url;
use crate::{CallError, Error};

use super::Response;

#[doc(hidden)]
pub mod state {
    pub(crate) trait Named {
        fn name() -> &'static str;
    }

    macro_rules! flow_state {
        ($n:tt) => {
            #[doc(hidden)]
            pub struct $n(pub(super) ());
            impl Named for $n {
                fn name() -> &'static str {
                    stringify!($n)
                }
            }
        };
    }

    flow_state!(Init);
    flow_state!(Requesting);

    /// Holds the redirect being followed.
    #[doc(hidden)]
    pub struct Redirecting(pub(super) super::RedirectTo);
    impl Named for Redirecting {
        fn name() -> &'static str {
            "Redirecting"
        }
    }
}
use self::state::*;

/// Headers describing a request body. Dropped together with the body.
const BODY_HEADERS: &[&str] = &["content-length", "content-type", "transfer-encoding"];

/// Headers carrying credentials. Not sent to another host or over a
/// downgraded scheme.
const CREDENTIAL_HEADERS: &[&str] = &["authorization", "cookie"];

/// A call in some state of the [redirect state graph][crate::client].
pub struct Flow<State> {
    inner: Inner,
    state: State,
}

// pub(crate) for tests to inspect state
#[derive(Debug)]
pub(crate) struct Inner {
    pub url: Url,
    pub method: Method,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub chain: Vec<Url>,
    pub redirects: usize,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub timeout: Duration,
    pub limits: Limits,
}

#[derive(Debug, Clone)]
pub(crate) struct RedirectTo {
    pub status: u16,
    pub location: String,
}

impl Inner {
    fn error(&self, e: Error) -> CallError {
        CallError::new(self.url.to_string(), e)
    }
}

impl<S> Flow<S> {
    fn wrap(inner: Inner, state: S) -> Flow<S>
    where
        S: Named,
    {
        let wrapped = Flow { inner, state };

        debug!("{:?}", wrapped);

        wrapped
    }

    /// Url of the current hop.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Urls visited so far, starting with the initial one.
    pub fn chain(&self) -> &[Url] {
        &self.inner.chain
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// INIT

impl Flow<Init> {
    /// Start a call. Fails on a malformed url or config.
    pub fn new(url: &str, config: &CallConfig) -> Result<Flow<Init>, CallError> {
        let attach = |e| CallError::new(url, e);

        config.validate().map_err(attach)?;

        let url = Url::parse(url).map_err(attach)?;
        let method = config.parsed_method().map_err(attach)?;

        let inner = Inner {
            chain: vec![url.clone()],
            url,
            method,
            headers: config.caller_headers(),
            body: config.body.clone(),
            redirects: 0,
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
            timeout: config.timeout,
            limits: config.limits(),
        };

        Ok(Flow::wrap(inner, Init(())))
    }

    pub fn proceed(self) -> Flow<Requesting> {
        Flow::wrap(self.inner, Requesting(()))
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// REQUESTING

/// Outcome of one hop.
pub enum RequestingResult {
    /// The final response.
    Done(Response),
    /// The response was a redirect to follow.
    Redirecting(Flow<Redirecting>),
}

impl Flow<Requesting> {
    /// Perform one hop: connect, send the request and read the full response.
    ///
    /// Cookies matching the url are taken from the jar, and the jar is updated
    /// from the response once it is read and decoded. Any failure ends the call
    /// with the url of this hop attached.
    pub fn perform<C: Connector>(
        self,
        connector: &C,
        jar: &mut CookieJar,
    ) -> Result<RequestingResult, CallError> {
        let inner = &self.inner;

        let request = {
            let cookies = jar.matching(&inner.url, Utc::now());
            Request::new(
                inner.method.clone(),
                inner.url.clone(),
                &inner.headers,
                inner.body.clone(),
                &cookies,
            )
            .map_err(|e| inner.error(e))?
        };

        debug!("> {}", request.request_line());
        for (name, value) in request.headers().iter() {
            debug!("> {}: {}", name, value);
        }

        let addr = inner.url.addr();

        let mut stream = connector
            .connect(&inner.url, inner.timeout)
            .map_err(|e| inner.error(e))?;

        request
            .write_to(&mut stream)
            .and_then(|_| stream.flush())
            .map_err(|e| inner.error(Error::Io(e).with_addr(&addr)))?;

        let raw = read_response(&mut stream, &inner.method, &inner.limits)
            .map_err(|e| inner.error(e.with_addr(&addr)))?;

        // Connection: close on every request, nothing to reuse.
        drop(stream);

        self.receive(raw, jar)
    }

    fn receive(
        self,
        raw: RawResponse,
        jar: &mut CookieJar,
    ) -> Result<RequestingResult, CallError> {
        let mut inner = self.inner;

        let encoding = raw.headers.get("content-encoding");
        let body = decode(raw.body, encoding).map_err(|e| inner.error(e))?;

        jar.apply(raw.headers.get_all("set-cookie"), &inner.url);

        let is_redirect = matches!(raw.status, 301 | 302 | 303 | 307 | 308);

        if is_redirect && inner.follow_redirects {
            match raw.headers.get("location") {
                Some(location) => {
                    let to = RedirectTo {
                        status: raw.status,
                        location: location.to_string(),
                    };
                    let flow = Flow::wrap(inner, Redirecting(to));
                    return Ok(RequestingResult::Redirecting(flow));
                }
                None => {
                    warn!("Redirect {} without Location from {}", raw.status, inner.url);
                }
            }
        }

        let response = Response {
            version: raw.version,
            status: raw.status,
            reason: raw.reason,
            headers: raw.headers,
            body,
            chain: std::mem::take(&mut inner.chain),
        };

        Ok(RequestingResult::Done(response))
    }
}

// //////////////////////////////////////////////////////////////////////////////////////////// REDIRECTING

impl Flow<Redirecting> {
    /// The redirect status code.
    pub fn status(&self) -> u16 {
        self.state.0.status
    }

    /// The `Location` header as received.
    pub fn location(&self) -> &str {
        &self.state.0.location
    }

    /// Resolve the next url and rewrite the request for the next hop.
    ///
    /// * 303 becomes GET without body, whatever the method.
    /// * 301/302 turn POST into GET without body.
    /// * 307/308 keep method and body.
    ///
    /// Fails with [`Error::TooManyRedirects`] once the configured number of
    /// redirects has been followed.
    pub fn proceed(self) -> Result<Flow<Requesting>, CallError> {
        let Flow {
            mut inner,
            state: Redirecting(redirect),
        } = self;

        if inner.redirects >= inner.max_redirects {
            return Err(inner.error(Error::TooManyRedirects(inner.max_redirects)));
        }

        let next = inner
            .url
            .join(&redirect.location)
            .map_err(|e| inner.error(e))?;

        let keep_body = match redirect.status {
            303 => {
                inner.method = Method::GET;
                false
            }
            301 | 302 if inner.method == Method::POST => {
                inner.method = Method::GET;
                false
            }
            _ => true,
        };

        if !keep_body {
            inner.body = None;
            for name in BODY_HEADERS {
                inner.headers.remove(name);
            }
        }

        if !can_keep_credentials(&inner.url, &next) {
            for name in CREDENTIAL_HEADERS {
                inner.headers.remove(name);
            }
        }

        debug!("Redirecting to {} ({})", next, redirect.status);

        inner.redirects += 1;
        inner.chain.push(next.clone());
        inner.url = next;

        Ok(Flow::wrap(inner, Requesting(())))
    }
}

/// Same host, and not a downgrade from https to http.
fn can_keep_credentials(prev: &Url, next: &Url) -> bool {
    prev.host() == next.host() && (!prev.scheme().is_secure() || next.scheme().is_secure())
}

// ////////////////////////////////////////////////////////////////////////////////////////////

impl<State: Named> fmt::Debug for Flow<State> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flow<{}>", State::name())
    }
}
