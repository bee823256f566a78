//! Opening connections, plain or TLS wrapped.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};

use crate::url::{Scheme, Url};
use crate::Error;

/// Opens a connection for one hop.
///
/// Failures are never retried here. Tests provide their own connector with
/// canned responses.
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&self, url: &Url, timeout: Duration) -> Result<Self::Stream, Error>;
}

/// A blocking connection. Reads return 0 once the peer closed.
pub enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => match s.read(buf) {
                // Plenty of servers close without a close_notify. Framing
                // decides whether that truncated anything.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    trace!("TLS peer closed without close_notify");
                    Ok(0)
                }
                r => r,
            },
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Plain(_) => write!(f, "Stream::Plain"),
            Stream::Tls(_) => write!(f, "Stream::Tls"),
        }
    }
}

/// Connector over the OS network stack, verifying TLS peers against the
/// Mozilla root set.
#[derive(Clone)]
pub struct TcpConnector {
    tls: Arc<ClientConfig>,
}

impl TcpConnector {
    pub fn new() -> Result<Self, Error> {
        let mut roots = RootCertStore::empty();
        roots.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();

        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::InvalidConfig(format!("tls: {}", e)))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(TcpConnector {
            tls: Arc::new(config),
        })
    }

    /// Use a custom TLS config, for instance with extra root certificates.
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        TcpConnector { tls: config }
    }

    fn open_tcp(&self, url: &Url, timeout: Duration) -> Result<TcpStream, Error> {
        let addr = url.addr();
        let conn_err = |source: io::Error| Error::Connection {
            addr: addr.clone(),
            source,
        };

        let candidates = (url.host(), url.port())
            .to_socket_addrs()
            .map_err(conn_err)?;

        let mut last_err = None;

        for sock_addr in candidates {
            trace!("Connect {} ({})", addr, sock_addr);

            match TcpStream::connect_timeout(&sock_addr, timeout) {
                Ok(tcp) => {
                    tcp.set_read_timeout(Some(timeout)).map_err(conn_err)?;
                    tcp.set_write_timeout(Some(timeout)).map_err(conn_err)?;
                    tcp.set_nodelay(true).map_err(conn_err)?;
                    return Ok(tcp);
                }
                Err(e) => {
                    debug!("Connect {} ({}) failed: {}", addr, sock_addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(conn_err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no address")
        })))
    }

    fn wrap_tls(&self, url: &Url, mut tcp: TcpStream) -> Result<Stream, Error> {
        let host = url.host().to_string();
        let tls_err = |reason: String| Error::TlsHandshake {
            host: host.clone(),
            reason,
        };

        let name = ServerName::try_from(host.clone())
            .map_err(|e| tls_err(format!("invalid server name: {}", e)))?;

        let mut conn = ClientConnection::new(self.tls.clone(), name)
            .map_err(|e| tls_err(e.to_string()))?;

        while conn.is_handshaking() {
            if let Err(e) = conn.complete_io(&mut tcp) {
                // rustls reports certificate and protocol failures as InvalidData.
                return Err(if e.kind() == io::ErrorKind::InvalidData {
                    tls_err(e.to_string())
                } else {
                    Error::Connection {
                        addr: url.addr(),
                        source: e,
                    }
                });
            }
        }

        trace!(
            "TLS established with {}: {:?}",
            host,
            conn.protocol_version()
        );

        Ok(Stream::Tls(Box::new(StreamOwned::new(conn, tcp))))
    }
}

impl Connector for TcpConnector {
    type Stream = Stream;

    fn connect(&self, url: &Url, timeout: Duration) -> Result<Stream, Error> {
        let tcp = self.open_tcp(url, timeout)?;

        match url.scheme() {
            Scheme::Http => Ok(Stream::Plain(tcp)),
            Scheme::Https => self.wrap_tls(url, tcp),
        }
    }
}

impl fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnector").finish()
    }
}
