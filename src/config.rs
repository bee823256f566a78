use std::time::Duration;

use http::Method;
use serde::{Deserialize, Serialize};

use crate::header::Headers;
use crate::parser::Limits;
use crate::Error;

/// Options for one top-level call.
///
/// Deserializing rejects unknown keys, so a misspelled option is an error
/// rather than silently falling back to the default.
///
/// ```
/// # use rawcurl::CallConfig;
/// let config = CallConfig::new()
///     .method("POST")
///     .header("Content-Type", "application/json")
///     .body(br#"{"a":1}"#.to_vec())
///     .max_redirects(3);
/// assert_eq!(config.max_redirects, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallConfig {
    /// Request method. Defaults to `GET`.
    pub method: String,
    /// Caller headers, in order, sent after the generated ones.
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub follow_redirects: bool,
    /// Connect, read and write timeout, in whole seconds when serialized.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Cap for response bodies that have no framing at all.
    pub max_unframed_body: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        CallConfig {
            method: "GET".to_string(),
            headers: vec![],
            body: None,
            follow_redirects: true,
            timeout: Duration::from_secs(10),
            max_redirects: 10,
            max_unframed_body: Limits::default().max_unframed_body,
        }
    }
}

impl CallConfig {
    pub fn new() -> Self {
        CallConfig::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn max_unframed_body(mut self, max: usize) -> Self {
        self.max_unframed_body = max;
        self
    }

    /// Check the options that can't be expressed in the types.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.parsed_method()?;

        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be above zero".into()));
        }

        Ok(())
    }

    /// The method as an http token. Case is normalized to upper.
    pub fn parsed_method(&self) -> Result<Method, Error> {
        let upper = self.method.trim().to_ascii_uppercase();
        Method::from_bytes(upper.as_bytes())
            .map_err(|_| Error::InvalidConfig(format!("bad method: {:?}", self.method)))
    }

    pub(crate) fn caller_headers(&self) -> Headers {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect()
    }

    pub(crate) fn limits(&self) -> Limits {
        Limits {
            max_unframed_body: self.max_unframed_body,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
