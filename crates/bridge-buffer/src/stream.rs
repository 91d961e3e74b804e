// SPDX-License-Identifier: MIT OR Apache-2.0
//! Socket streams and connect targets shared by the server and the client.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, Interest, ReadBuf, Ready};
use tokio::net::{TcpStream, UnixStream};

// ---------------------------------------------------------------------------
// BridgeStream
// ---------------------------------------------------------------------------

/// A connected local socket: either Unix-domain or loopback TCP.
#[derive(Debug)]
pub enum BridgeStream {
    /// Unix-domain stream socket.
    Unix(UnixStream),
    /// TCP stream socket.
    Tcp(TcpStream),
}

impl BridgeStream {
    /// Open a stream to `endpoint`.
    pub async fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Unix(path) => Ok(Self::Unix(UnixStream::connect(path).await?)),
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true)?;
                Ok(Self::Tcp(stream))
            }
        }
    }

    /// Wait until the socket is ready for any of `interest`.
    pub async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        match self {
            Self::Unix(s) => s.ready(interest).await,
            Self::Tcp(s) => s.ready(interest).await,
        }
    }

    /// Non-blocking read; `WouldBlock` when nothing is available.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Unix(s) => s.try_read(buf),
            Self::Tcp(s) => s.try_read(buf),
        }
    }

    /// Non-blocking write; `WouldBlock` when the socket cannot take bytes.
    pub fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Unix(s) => s.try_write(buf),
            Self::Tcp(s) => s.try_write(buf),
        }
    }

    /// Human-readable peer label for log fields.
    pub fn peer_label(&self) -> String {
        match self {
            Self::Unix(s) => match s.peer_addr() {
                Ok(addr) => match addr.as_pathname() {
                    Some(path) => format!("unix:{}", path.display()),
                    None => "unix:(unnamed)".to_string(),
                },
                Err(_) => "unix:(unknown)".to_string(),
            },
            Self::Tcp(s) => match s.peer_addr() {
                Ok(addr) => format!("tcp:{addr}"),
                Err(_) => "tcp:(unknown)".to_string(),
            },
        }
    }
}

impl From<UnixStream> for BridgeStream {
    fn from(stream: UnixStream) -> Self {
        Self::Unix(stream)
    }
}

impl From<TcpStream> for BridgeStream {
    fn from(stream: TcpStream) -> Self {
        Self::Tcp(stream)
    }
}

impl AsyncRead for BridgeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for BridgeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Errors produced while parsing or resolving an [`Endpoint`].
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The endpoint string was empty.
    #[error("endpoint is empty")]
    Empty,

    /// A `tcp:` endpoint did not resolve to a socket address.
    #[error("invalid tcp endpoint '{input}'")]
    InvalidTcp {
        /// The offending text.
        input: String,
    },

    /// The port file could not be read.
    #[error("failed to read port file {path}: {source}")]
    PortFileRead {
        /// Port file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The port file did not contain a decimal port.
    #[error("port file {path} does not contain a port number: '{content}'")]
    PortFileContent {
        /// Port file path.
        path: PathBuf,
        /// Trimmed content.
        content: String,
    },
}

/// Where a client connects, or where a listener binds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Unix-domain socket path.
    Unix(PathBuf),
    /// TCP socket address.
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Resolve a loopback TCP endpoint from a port file published by a server
    /// bound to port 0.
    pub fn from_port_file(path: &Path) -> Result<Self, EndpointError> {
        let raw = std::fs::read_to_string(path).map_err(|source| EndpointError::PortFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let content = raw.trim();
        let port: u16 = content
            .parse()
            .map_err(|_| EndpointError::PortFileContent {
                path: path.to_path_buf(),
                content: content.to_string(),
            })?;
        Ok(Self::Tcp(SocketAddr::from((Ipv4Addr::LOCALHOST, port))))
    }

    fn parse_tcp(input: &str) -> Result<Self, EndpointError> {
        let invalid = || EndpointError::InvalidTcp {
            input: input.to_string(),
        };
        if let Ok(addr) = input.parse::<SocketAddr>() {
            return Ok(Self::Tcp(addr));
        }
        input
            .to_socket_addrs()
            .map_err(|_| invalid())?
            .next()
            .map(Self::Tcp)
            .ok_or_else(invalid)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    /// Accepts `unix:/path`, `tcp:host:port`, a bare path or a bare `host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EndpointError::Empty);
        }
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(EndpointError::Empty);
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp:") {
            return Self::parse_tcp(addr);
        }
        if s.starts_with('/') || s.starts_with('.') {
            return Ok(Self::Unix(PathBuf::from(s)));
        }
        Self::parse_tcp(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}
