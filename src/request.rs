//! Serializing a single hop's request.

use std::io::Write;

use http::{HeaderName, HeaderValue, Method};

use crate::cookie::Cookie;
use crate::header::Headers;
use crate::url::Url;
use crate::Error;

/// Sent unless the caller provides their own.
pub const USER_AGENT: &str = concat!("rawcurl/", env!("CARGO_PKG_VERSION"));

/// Headers where only one instance can be sent. A caller provided value
/// replaces the generated one, and also any earlier caller value.
const SINGLETON_HEADERS: &[&str] = &["host", "content-length"];

/// A request for one hop.
///
/// The amended header list is computed once in [`Request::new`]:
///
/// 1. `Host` from the url (port only when non-default)
/// 2. `User-Agent`, `Accept`, `Accept-Encoding`, `Connection: close`
/// 3. `Cookie` combining all matching cookies from the jar
/// 4. `Content-Length` when there is a body (also for an empty body)
/// 5. The caller's headers, last. A caller header replaces any generated
///    header of the same name.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(
        method: Method,
        url: Url,
        caller_headers: &Headers,
        body: Option<Vec<u8>>,
        cookies: &[&Cookie],
    ) -> Result<Request, Error> {
        let mut headers = Headers::new();

        headers.append("Host", url.host_header());
        headers.append("User-Agent", USER_AGENT);
        headers.append("Accept", "*/*");
        headers.append("Accept-Encoding", "gzip, deflate");
        headers.append("Connection", "close");

        if !cookies.is_empty() {
            let value = cookies
                .iter()
                .map(|c| c.pair())
                .collect::<Vec<_>>()
                .join("; ");
            headers.append("Cookie", value);
        }

        if let Some(body) = &body {
            headers.append("Content-Length", body.len().to_string());
        }

        // Generated headers that the caller overrides are dropped.
        for (name, _) in caller_headers.iter() {
            headers.remove(name);
        }

        for (name, value) in caller_headers.iter() {
            verify_header(name, value)?;

            let is_singleton = SINGLETON_HEADERS
                .iter()
                .any(|s| name.eq_ignore_ascii_case(s));

            if is_singleton {
                headers.set(name, value);
            } else {
                headers.append(name, value);
            }
        }

        Ok(Request {
            method,
            url,
            headers,
            body,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// The request line, without the trailing crlf.
    pub fn request_line(&self) -> String {
        format!("{} {} HTTP/1.1", self.method, self.url.request_target())
    }

    /// Write the full request: line, headers, blank line and body.
    pub fn write_to(&self, w: &mut impl Write) -> std::io::Result<()> {
        write!(w, "{}\r\n", self.request_line())?;

        for (name, value) in self.headers.iter() {
            write!(w, "{}: {}\r\n", name, value)?;
        }

        write!(w, "\r\n")?;

        if let Some(body) = &self.body {
            w.write_all(body)?;
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let body_len = self.body.as_ref().map(|b| b.len()).unwrap_or(0);
        let mut out = Vec::with_capacity(256 + body_len);

        // Writing to a Vec never fails.
        let _ = self.write_to(&mut out);

        out
    }
}

/// Serialize a request in one go.
pub fn build(
    method: Method,
    url: &Url,
    headers: &Headers,
    body: Option<&[u8]>,
    cookies: &[&Cookie],
) -> Result<Vec<u8>, Error> {
    let request = Request::new(
        method,
        url.clone(),
        headers,
        body.map(|b| b.to_vec()),
        cookies,
    )?;
    Ok(request.to_bytes())
}

fn verify_header(name: &str, value: &str) -> Result<(), Error> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::BadHeader(format!("invalid name: {:?}", name)))?;
    HeaderValue::from_bytes(value.as_bytes())
        .map_err(|_| Error::BadHeader(format!("invalid value for {}: {:?}", name, value)))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn as_str(b: &[u8]) -> &str {
        std::str::from_utf8(b).unwrap()
    }

    fn count_header(bytes: &[u8], name: &str) -> usize {
        let head = as_str(bytes).split("\r\n\r\n").next().unwrap();
        head.split("\r\n")
            .skip(1)
            .filter(|l| {
                l.split(':')
                    .next()
                    .map(|n| n.eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            })
            .count()
    }

    #[test]
    fn get_request_bytes() {
        let bytes = build(
            Method::GET,
            &url("http://a.test/path?x=1&y"),
            &Headers::new(),
            None,
            &[],
        )
        .unwrap();

        let expected = format!(
            "GET /path?x=1&y HTTP/1.1\r\n\
            Host: a.test\r\n\
            User-Agent: {}\r\n\
            Accept: */*\r\n\
            Accept-Encoding: gzip, deflate\r\n\
            Connection: close\r\n\
            \r\n",
            USER_AGENT
        );

        assert_eq!(as_str(&bytes), expected);
    }

    #[test]
    fn host_with_non_default_port() {
        let bytes = build(
            Method::GET,
            &url("https://a.test:8443/"),
            &Headers::new(),
            None,
            &[],
        )
        .unwrap();
        assert!(as_str(&bytes).contains("\r\nHost: a.test:8443\r\n"));

        let bytes = build(
            Method::GET,
            &url("https://a.test:443/"),
            &Headers::new(),
            None,
            &[],
        )
        .unwrap();
        assert!(as_str(&bytes).contains("\r\nHost: a.test\r\n"));
    }

    #[test]
    fn body_gets_content_length() {
        let body = "ä=ö".as_bytes();
        let bytes = build(
            Method::POST,
            &url("http://a.test/"),
            &Headers::new(),
            Some(body),
            &[],
        )
        .unwrap();

        let s = as_str(&bytes);
        assert!(s.contains("\r\nContent-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nä=ö"));
        assert_eq!(count_header(&bytes, "content-length"), 1);
        assert_eq!(count_header(&bytes, "host"), 1);
    }

    #[test]
    fn empty_body_has_zero_length() {
        let bytes = build(
            Method::POST,
            &url("http://a.test/"),
            &Headers::new(),
            Some(&b""[..]),
            &[],
        )
        .unwrap();
        assert!(as_str(&bytes).contains("\r\nContent-Length: 0\r\n"));
    }

    #[test]
    fn caller_overrides_last_writer_wins() {
        let headers: Headers = [
            ("host", "other.test"),
            ("Host", "final.test"),
            ("Content-Length", "3"),
            ("User-Agent", "mine"),
            ("X-Multi", "1"),
            ("X-Multi", "2"),
        ]
        .into_iter()
        .collect();

        let bytes = build(
            Method::PUT,
            &url("http://a.test/"),
            &headers,
            Some(&b"abc"[..]),
            &[],
        )
        .unwrap();

        let s = as_str(&bytes);
        assert_eq!(count_header(&bytes, "host"), 1);
        assert!(s.contains("\r\nHost: final.test\r\n"));
        assert_eq!(count_header(&bytes, "content-length"), 1);
        assert_eq!(count_header(&bytes, "user-agent"), 1);
        assert!(s.contains("\r\nUser-Agent: mine\r\n"));
        assert_eq!(count_header(&bytes, "x-multi"), 2);
        assert!(!s.contains(USER_AGENT));
    }

    #[test]
    fn cookies_combined() {
        let u = url("http://a.test/");
        let c1 = Cookie::parse("a=1", &u, chrono::Utc::now()).unwrap();
        let c2 = Cookie::parse("b=two", &u, chrono::Utc::now()).unwrap();

        let bytes = build(Method::GET, &u, &Headers::new(), None, &[&c1, &c2]).unwrap();

        assert!(as_str(&bytes).contains("\r\nCookie: a=1; b=two\r\n"));
        assert_eq!(count_header(&bytes, "cookie"), 1);
    }

    #[test]
    fn header_injection_refused() {
        let headers: Headers = [("X-Evil", "a\r\nHost: b")].into_iter().collect();
        let r = build(Method::GET, &url("http://a.test/"), &headers, None, &[]);
        assert!(matches!(r, Err(Error::BadHeader(_))));

        let headers: Headers = [("Bad Name", "x")].into_iter().collect();
        let r = build(Method::GET, &url("http://a.test/"), &headers, None, &[]);
        assert!(matches!(r, Err(Error::BadHeader(_))));
    }
}
