//! Cookies, the jar that holds them between hops, and the store that
//! persists the jar between calls.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::url::{Scheme, Url};

/// Max-Age values are capped to avoid overflowing the clock.
const MAX_AGE_CAP: i64 = 100 * 365 * 24 * 3600;

/// Expires formats seen in the wild, tried after RFC 2822.
const EXPIRES_FORMATS: &[&str] = &[
    "%a, %d-%b-%Y %H:%M:%S GMT",
    "%A, %d-%b-%y %H:%M:%S GMT",
    "%a, %d %b %Y %H:%M:%S GMT",
    "%a %b %e %H:%M:%S %Y",
];

/// A single cookie as received in `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lowercase, without leading dot.
    pub domain: String,
    pub path: String,
    /// `None` is a session cookie.
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub http_only: bool,
    /// Set when the cookie had no `Domain` attribute. Such cookies are only
    /// sent back to the exact host, not its subdomains.
    #[serde(default)]
    pub host_only: bool,
}

impl Cookie {
    /// Parse a `Set-Cookie` header value received from `url`.
    ///
    /// Returns `None` when the value has no `name=value` pair, or when the
    /// `Domain` attribute does not cover the host that sent it.
    pub fn parse(header: &str, url: &Url, now: DateTime<Utc>) -> Option<Cookie> {
        let mut parts = header.split(';');

        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: url.host().to_string(),
            path: default_path(url.path()).to_string(),
            expires: None,
            secure: false,
            http_only: false,
            host_only: true,
        };

        let mut max_age = None;

        for part in parts {
            let part = part.trim();
            let (attr, val) = match part.split_once('=') {
                Some((a, v)) => (a.trim(), v.trim()),
                None => (part, ""),
            };

            match attr.to_ascii_lowercase().as_str() {
                "domain" => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    if domain.is_empty() {
                        continue;
                    }
                    if !domain_matches(url.host(), &domain) {
                        warn!("Cookie {} rejected: {} not within {}", name, url.host(), domain);
                        return None;
                    }
                    cookie.domain = domain;
                    cookie.host_only = false;
                }
                "path" => {
                    if val.starts_with('/') {
                        cookie.path = val.to_string();
                    }
                }
                "expires" => {
                    if let Some(t) = parse_expires(val) {
                        cookie.expires = Some(t);
                    } else {
                        trace!("Cookie {} unparsed expires: {}", name, val);
                    }
                }
                "max-age" => {
                    if let Ok(secs) = val.parse::<i64>() {
                        max_age = Some(secs);
                    }
                }
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                _ => {}
            }
        }

        // Max-Age has precedence over Expires.
        if let Some(secs) = max_age {
            cookie.expires = if secs <= 0 {
                Some(now)
            } else {
                now.checked_add_signed(Duration::seconds(secs.min(MAX_AGE_CAP)))
            };
        }

        Some(cookie)
    }

    /// `name=value` as sent in the `Cookie` request header.
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|e| e <= now).unwrap_or(false)
    }

    /// Whether this cookie should be sent in a request to `url`.
    pub fn matches(&self, url: &Url, now: DateTime<Utc>) -> bool {
        let host_ok = if self.host_only {
            url.host() == self.domain
        } else {
            domain_matches(url.host(), &self.domain)
        };

        host_ok
            && path_matches(url.path(), &self.path)
            && (!self.secure || url.scheme() == Scheme::Https)
            && !self.is_expired(now)
    }

    fn key(&self) -> (String, String, String) {
        (self.domain.clone(), self.path.clone(), self.name.clone())
    }
}

/// `host` equals `domain` or ends with `.domain`.
fn domain_matches(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    host.len() > domain.len()
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

/// Cookie path is a prefix of the request path ending on a segment boundary.
fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// The directory of the request path, used when `Path` is absent.
fn default_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

fn parse_expires(v: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc2822(v) {
        return Some(t.with_timezone(&Utc));
    }

    EXPIRES_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(v, f).ok())
        .map(|t| Utc.from_utc_datetime(&t))
}

/// All cookies known to one caller, keyed by (domain, path, name).
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    entries: BTreeMap<(String, String, String), Cookie>,
    dirty: bool,
}

impl CookieJar {
    pub fn new() -> Self {
        CookieJar::default()
    }

    /// Jar with previously persisted entries. Starts out unchanged.
    pub fn from_entries(cookies: impl IntoIterator<Item = Cookie>) -> Self {
        let entries = cookies.into_iter().map(|c| (c.key(), c)).collect();
        CookieJar {
            entries,
            dirty: false,
        }
    }

    /// Update from the `Set-Cookie` values of a response received from `url`.
    pub fn apply<'a>(&mut self, values: impl IntoIterator<Item = &'a str>, url: &Url) {
        self.apply_at(values, url, Utc::now())
    }

    /// As [`CookieJar::apply`] with an explicit clock.
    pub fn apply_at<'a>(
        &mut self,
        values: impl IntoIterator<Item = &'a str>,
        url: &Url,
        now: DateTime<Utc>,
    ) {
        for value in values {
            let Some(cookie) = Cookie::parse(value, url, now) else {
                warn!("Ignoring Set-Cookie from {}", url);
                continue;
            };

            let key = cookie.key();

            if cookie.is_expired(now) {
                trace!("Cookie {} cleared for {}", cookie.name, cookie.domain);
                if self.entries.remove(&key).is_some() {
                    self.dirty = true;
                }
                continue;
            }

            trace!("Cookie {} set for {}{}", cookie.name, cookie.domain, cookie.path);

            if self.entries.get(&key) != Some(&cookie) {
                self.entries.insert(key, cookie);
                self.dirty = true;
            }
        }
    }

    /// Cookies to send to `url`. Longer paths sort first.
    pub fn matching(&self, url: &Url, now: DateTime<Utc>) -> Vec<&Cookie> {
        let mut found: Vec<&Cookie> = self
            .entries
            .values()
            .filter(|c| c.matches(url, now))
            .collect();
        found.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        found
    }

    /// The combined `Cookie` header value for `url`, if any cookie matches.
    pub fn cookie_header(&self, url: &Url, now: DateTime<Utc>) -> Option<String> {
        let found = self.matching(url, now);
        if found.is_empty() {
            return None;
        }
        Some(
            found
                .iter()
                .map(|c| c.pair())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn entries(&self) -> Vec<Cookie> {
        self.entries.values().cloned().collect()
    }

    pub fn remove_expired(&mut self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, c| !c.is_expired(now));
        if self.entries.len() != before {
            self.dirty = true;
        }
    }

    /// Whether the jar changed since loading or the last call to this.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persistence of the cookie jar between calls. The storage format is up to
/// the implementation.
pub trait CookieStore {
    fn load(&self) -> io::Result<Vec<Cookie>>;

    fn save(&self, cookies: &[Cookie]) -> io::Result<()>;
}

/// Store that keeps cookies in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    cookies: Mutex<Vec<Cookie>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_cookies(cookies: Vec<Cookie>) -> Self {
        MemoryStore {
            cookies: Mutex::new(cookies),
        }
    }

    /// Snapshot of what was last saved.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CookieStore for MemoryStore {
    fn load(&self) -> io::Result<Vec<Cookie>> {
        Ok(self.cookies())
    }

    fn save(&self, cookies: &[Cookie]) -> io::Result<()> {
        let mut lock = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        *lock = cookies.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn parse(header: &str, u: &str) -> Option<Cookie> {
        Cookie::parse(header, &url(u), now())
    }

    #[test]
    fn parse_attributes() {
        let c = parse(
            "sid=abc; Domain=.Example.com; Path=/app; Secure; HttpOnly",
            "https://www.example.com/app/x",
        )
        .unwrap();
        assert_eq!(c.name, "sid");
        assert_eq!(c.value, "abc");
        assert_eq!(c.domain, "example.com");
        assert_eq!(c.path, "/app");
        assert!(c.secure);
        assert!(c.http_only);
        assert!(!c.host_only);
        assert!(c.expires.is_none());
    }

    #[test]
    fn defaults_from_url() {
        let c = parse("a=1", "http://www.example.com/dir/page").unwrap();
        assert_eq!(c.domain, "www.example.com");
        assert_eq!(c.path, "/dir");
        assert!(c.host_only);

        let c = parse("a=1", "http://www.example.com/page").unwrap();
        assert_eq!(c.path, "/");
    }

    #[test]
    fn no_pair() {
        assert!(parse("novalue", "http://a.test/").is_none());
        assert!(parse("=1", "http://a.test/").is_none());
    }

    #[test]
    fn foreign_domain_rejected() {
        assert!(parse("a=1; Domain=evil.test", "http://www.example.com/").is_none());
        assert!(parse("a=1; Domain=ample.com", "http://example.com/").is_none());
        assert!(parse("a=1; Domain=www.example.com", "http://example.com/").is_none());
    }

    #[test]
    fn domain_suffix_matching() {
        let c = parse("a=1; Domain=example.com", "http://example.com/").unwrap();
        assert!(c.matches(&url("http://www.example.com/"), now()));
        assert!(c.matches(&url("http://example.com/"), now()));

        let c = parse("a=1; Domain=notexample.com", "http://notexample.com/").unwrap();
        assert!(!c.matches(&url("http://example.com/"), now()));
    }

    #[test]
    fn host_only_exact() {
        let c = parse("a=1", "http://example.com/").unwrap();
        assert!(c.matches(&url("http://example.com/"), now()));
        assert!(!c.matches(&url("http://www.example.com/"), now()));
    }

    #[test]
    fn path_prefix_on_boundary() {
        let c = parse("a=1; Path=/app", "http://a.test/").unwrap();
        assert!(c.matches(&url("http://a.test/app"), now()));
        assert!(c.matches(&url("http://a.test/app/x"), now()));
        assert!(!c.matches(&url("http://a.test/apple"), now()));
        assert!(!c.matches(&url("http://a.test/"), now()));
    }

    #[test]
    fn secure_needs_https() {
        let c = parse("a=1; Secure", "https://a.test/").unwrap();
        assert!(c.matches(&url("https://a.test/"), now()));
        assert!(!c.matches(&url("http://a.test/"), now()));
    }

    #[test]
    fn expires_formats() {
        let c = parse("a=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT", "http://a.test/").unwrap();
        assert_eq!(
            c.expires,
            Some(Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap())
        );
        assert!(c.is_expired(now()));

        let c = parse("a=1; expires=Thu, 01-Jan-2099 00:00:00 GMT", "http://a.test/").unwrap();
        assert_eq!(
            c.expires,
            Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn max_age_wins() {
        let c = parse(
            "a=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Max-Age=60",
            "http://a.test/",
        )
        .unwrap();
        assert_eq!(c.expires, Some(now() + Duration::seconds(60)));
        assert!(!c.is_expired(now()));
    }

    #[test]
    fn jar_round_trip() {
        let mut jar = CookieJar::new();
        let u = url("http://www.example.com/");
        jar.apply_at(["session=xyz; Path=/"], &u, now());
        assert_eq!(jar.cookie_header(&u, now()).as_deref(), Some("session=xyz"));
    }

    #[test]
    fn quoted_value_kept_verbatim() {
        let mut jar = CookieJar::new();
        let u = url("http://a.test/");
        jar.apply_at(["q=\"abc\"", "pad=  x y  "], &u, now());
        assert_eq!(
            jar.cookie_header(&u, now()).as_deref(),
            Some("pad=x y; q=\"abc\"")
        );
    }

    #[test]
    fn jar_replaces_and_clears() {
        let mut jar = CookieJar::new();
        let u = url("http://a.test/");
        jar.apply_at(["a=1", "b=2"], &u, now());
        assert_eq!(jar.len(), 2);
        assert!(jar.take_dirty());
        assert!(!jar.take_dirty());

        jar.apply_at(["a=3"], &u, now());
        assert_eq!(jar.len(), 2);
        assert!(jar.take_dirty());

        // Same value again is no change.
        jar.apply_at(["a=3"], &u, now());
        assert!(!jar.take_dirty());

        jar.apply_at(["a=gone; Max-Age=0"], &u, now());
        assert_eq!(jar.len(), 1);
        assert!(jar.take_dirty());

        jar.apply_at(["b=gone; Expires=Wed, 21 Oct 2015 07:28:00 GMT"], &u, now());
        assert!(jar.is_empty());
    }

    #[test]
    fn jar_longer_path_first() {
        let mut jar = CookieJar::new();
        let u = url("http://a.test/x/y");
        jar.apply_at(["root=1; Path=/", "deep=2; Path=/x"], &u, now());
        assert_eq!(
            jar.cookie_header(&u, now()).as_deref(),
            Some("deep=2; root=1")
        );
    }

    #[test]
    fn jar_remove_expired() {
        let u = url("http://a.test/");
        let mut jar = CookieJar::new();
        jar.apply_at(["a=1; Max-Age=10", "b=2"], &u, now());
        jar.take_dirty();

        jar.remove_expired(now() + Duration::seconds(11));
        assert_eq!(jar.len(), 1);
        assert!(jar.take_dirty());
        assert!(jar.cookie_header(&u, now()).is_some());
    }

    #[test]
    fn store_round_trip() {
        let u = url("https://a.test/");
        let mut jar = CookieJar::new();
        jar.apply_at(["a=1; Secure; HttpOnly; Max-Age=100"], &u, now());

        let store = MemoryStore::new();
        store.save(&jar.entries()).unwrap();

        let loaded = CookieJar::from_entries(store.load().unwrap());
        assert_eq!(loaded.entries(), jar.entries());
    }
}
