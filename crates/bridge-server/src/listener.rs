// SPDX-License-Identifier: MIT OR Apache-2.0
//! Listening sockets and the accept loop.

use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bridge_buffer::{BridgeStream, Endpoint};
use futures::future::select_all;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::io_loop::LoopEvent;
use crate::{ServerConfig, ServerError};

/// A bound listening socket.
#[derive(Debug)]
pub(crate) enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    async fn accept(&self) -> io::Result<BridgeStream> {
        match self {
            Self::Unix(l) => Ok(BridgeStream::Unix(l.accept().await?.0)),
            Self::Tcp(l) => {
                let (stream, _) = l.accept().await?;
                stream.set_nodelay(true)?;
                Ok(BridgeStream::Tcp(stream))
            }
        }
    }
}

/// Listeners plus the files to remove when the server stops.
#[derive(Debug)]
pub(crate) struct Bound {
    pub listeners: Vec<Listener>,
    pub endpoints: Vec<Endpoint>,
    pub cleanup: Vec<PathBuf>,
}

fn remove_stale_socket(path: &Path) -> Result<(), ServerError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!(target: "bridge.server", path = %path.display(), "removing stale socket");
            std::fs::remove_file(path).map_err(|source| ServerError::Bind {
                endpoint: Endpoint::Unix(path.to_path_buf()),
                source,
            })
        }
        Ok(_) => Err(ServerError::NotASocket(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ServerError::Bind {
            endpoint: Endpoint::Unix(path.to_path_buf()),
            source,
        }),
    }
}

fn bind_unix(path: &Path) -> Result<UnixListener, ServerError> {
    let bind_err = |source| ServerError::Bind {
        endpoint: Endpoint::Unix(path.to_path_buf()),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(bind_err)?;
    }
    remove_stale_socket(path)?;
    let listener = UnixListener::bind(path).map_err(bind_err)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|source| {
        ServerError::Permissions {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(listener)
}

fn write_port_file(path: &Path, port: u16) -> Result<(), ServerError> {
    let err = |source| ServerError::PortFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(err)?;
    }
    std::fs::write(path, format!("{port}\n")).map_err(err)
}

/// Bind every configured listener.
pub(crate) async fn bind(config: &ServerConfig) -> Result<Bound, ServerError> {
    let mut bound = Bound {
        listeners: Vec::new(),
        endpoints: Vec::new(),
        cleanup: Vec::new(),
    };

    if let Some(path) = &config.unix_socket {
        let listener = bind_unix(path)?;
        info!(target: "bridge.server", path = %path.display(), "listening on unix socket");
        bound.listeners.push(Listener::Unix(listener));
        bound.endpoints.push(Endpoint::Unix(path.clone()));
        bound.cleanup.push(path.clone());
    }

    if let Some(addr) = config.tcp_bind {
        let bind_err = |source| ServerError::Bind {
            endpoint: Endpoint::Tcp(addr),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local = listener.local_addr().map_err(bind_err)?;
        info!(target: "bridge.server", addr = %local, "listening on tcp");
        if let Some(port_file) = &config.port_file {
            write_port_file(port_file, local.port())?;
            bound.cleanup.push(port_file.clone());
        }
        bound.listeners.push(Listener::Tcp(listener));
        bound.endpoints.push(Endpoint::Tcp(local));
    }

    if bound.listeners.is_empty() {
        return Err(ServerError::NoListeners);
    }
    Ok(bound)
}

/// Accept connections and hand them to the I/O loop until shutdown.
pub(crate) async fn run(
    listeners: Vec<Listener>,
    events: mpsc::UnboundedSender<LoopEvent>,
    mut shutdown: watch::Receiver<bool>,
    poll_interval: Duration,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let accepts = select_all(listeners.iter().map(|l| Box::pin(l.accept())));
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            (accepted, _, _) = accepts => match accepted {
                Ok(stream) => {
                    if events.send(LoopEvent::Accepted(stream)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(target: "bridge.server", error = %e, "accept failed");
                    tokio::time::sleep(poll_interval).await;
                }
            },
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
    debug!(target: "bridge.server", "listener loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unix_socket_is_private_and_replaces_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bridge.sock");
        let config = ServerConfig::default().with_unix_socket(&path);

        let first = bind(&config).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        drop(first);

        // The file is still there; rebinding removes it.
        assert!(path.exists());
        bind(&config).await.unwrap();
    }

    #[tokio::test]
    async fn regular_file_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("precious.txt");
        std::fs::write(&path, "keep me").unwrap();
        let config = ServerConfig::default().with_unix_socket(&path);
        assert!(matches!(bind(&config).await, Err(ServerError::NotASocket(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn tcp_port_zero_publishes_port_file() {
        let dir = tempfile::tempdir().unwrap();
        let port_file = dir.path().join("port");
        let config = ServerConfig::default()
            .with_tcp("127.0.0.1:0".parse().unwrap())
            .with_port_file(&port_file);
        let bound = bind(&config).await.unwrap();
        let Endpoint::Tcp(addr) = bound.endpoints[0].clone() else {
            panic!("expected tcp endpoint");
        };
        assert_ne!(addr.port(), 0);
        assert_eq!(
            std::fs::read_to_string(&port_file).unwrap(),
            format!("{}\n", addr.port())
        );
        assert_eq!(Endpoint::from_port_file(&port_file).unwrap(), Endpoint::Tcp(addr));
    }

    #[tokio::test]
    async fn nothing_configured_is_an_error() {
        assert!(matches!(
            bind(&ServerConfig::default()).await,
            Err(ServerError::NoListeners)
        ));
    }
}
