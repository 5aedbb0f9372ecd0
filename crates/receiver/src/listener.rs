//! Listener bootstrap for network and local endpoints

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use contracts::{Endpoint, TransportKind};
use socket2::{Domain, SockAddr, Socket, Type};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UnixListener, UnixStream};
use tracing::{debug, info, instrument, warn};

use crate::error::{ReceiverError, Result};

/// A bound, listening socket
///
/// Dropping a local listener removes its socket file.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

/// An accepted connection
#[derive(Debug)]
pub enum Accepted {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Listener {
    /// Create, bind and listen
    ///
    /// # Errors
    /// [`ReceiverError::Bind`] / [`ReceiverError::Listen`], fatal at startup
    #[instrument(name = "listener_bind", skip_all, fields(endpoint = %endpoint, backlog = backlog))]
    pub async fn bind(endpoint: &Endpoint, backlog: u32) -> Result<Self> {
        let listener = match endpoint.transport {
            TransportKind::Network => Self::bind_tcp(endpoint, backlog)?,
            TransportKind::Local => Self::bind_unix(endpoint, backlog)?,
        };
        info!(local = %listener.local_endpoint(), "listening");
        Ok(listener)
    }

    fn bind_tcp(endpoint: &Endpoint, backlog: u32) -> Result<Self> {
        let addr = endpoint.socket_addr().map_err(|e| {
            ReceiverError::bind(endpoint, io::Error::new(io::ErrorKind::InvalidInput, e))
        })?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|e| ReceiverError::bind(endpoint, e))?;

        if let Err(e) = socket.set_reuseaddr(true) {
            warn!(error = %e, "failed to enable SO_REUSEADDR");
        }
        socket
            .bind(addr)
            .map_err(|e| ReceiverError::bind(endpoint, e))?;
        let listener = socket
            .listen(backlog)
            .map_err(|e| ReceiverError::listen(endpoint, e))?;
        Ok(Listener::Tcp(listener))
    }

    fn bind_unix(endpoint: &Endpoint, backlog: u32) -> Result<Self> {
        let path = endpoint.path();
        remove_stale_socket(&path).map_err(|e| ReceiverError::bind(endpoint, e))?;

        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)
            .map_err(|e| ReceiverError::bind(endpoint, e))?;
        let addr = SockAddr::unix(&path).map_err(|e| ReceiverError::bind(endpoint, e))?;
        socket
            .bind(&addr)
            .map_err(|e| ReceiverError::bind(endpoint, e))?;
        socket
            .listen(i32::try_from(backlog).unwrap_or(i32::MAX))
            .map_err(|e| ReceiverError::listen(endpoint, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ReceiverError::listen(endpoint, e))?;

        let std_listener = std::os::unix::net::UnixListener::from(OwnedFd::from(socket));
        let listener =
            UnixListener::from_std(std_listener).map_err(|e| ReceiverError::listen(endpoint, e))?;
        Ok(Listener::Unix { listener, path })
    }

    /// Accept one connection, returning it with a printable peer address
    pub async fn accept(&self) -> io::Result<(Accepted, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((Accepted::Tcp(stream), peer.to_string()))
            }
            Listener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Accepted::Unix(stream), format!("unix:{}", path.display())))
            }
        }
    }

    /// The endpoint actually bound (resolves port 0)
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            Listener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => Endpoint::network(addr.to_string()),
                Err(_) => Endpoint::network("unknown"),
            },
            Listener::Unix { path, .. } => Endpoint::local(path.display().to_string()),
        }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            Listener::Tcp(_) => TransportKind::Network,
            Listener::Unix { .. } => TransportKind::Local,
        }
    }
}

/// Unlink a leftover socket at `path`
///
/// Anything else at the path is left in place and reported as
/// `AlreadyExists`.
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !metadata.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        ));
    }
    debug!(path = %path.display(), "removing stale socket file");
    std::fs::remove_file(path)
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            match std::fs::remove_file(&*path) {
                Ok(()) => debug!(path = %path.display(), "socket file removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove socket file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_bind_resolves_port() {
        let listener = Listener::bind(&Endpoint::network("127.0.0.1:0"), 16)
            .await
            .unwrap();
        let local = listener.local_endpoint();
        assert_ne!(local.socket_addr().unwrap().port(), 0);
        assert_eq!(listener.transport(), TransportKind::Network);

        let client = tokio::spawn(async move { TcpStream::connect(local.socket_addr().unwrap()).await });
        let (accepted, peer) = listener.accept().await.unwrap();
        assert!(matches!(accepted, Accepted::Tcp(_)));
        assert!(peer.starts_with("127.0.0.1:"));
        client.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_tcp_bind_invalid_address() {
        let err = Listener::bind(&Endpoint::network("not-an-address"), 16)
            .await
            .unwrap_err();
        assert!(matches!(err, ReceiverError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_unix_stale_socket_replaced_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recv.sock");
        // leftover socket file from a previous run
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let endpoint = Endpoint::local(path.display().to_string());
        let listener = Listener::bind(&endpoint, 8).await.unwrap();
        assert!(path.exists());
        assert_eq!(listener.transport(), TransportKind::Local);

        let client_path = path.clone();
        let client = tokio::spawn(async move { UnixStream::connect(client_path).await });
        let (accepted, _) = listener.accept().await.unwrap();
        assert!(matches!(accepted, Accepted::Unix(_)));
        client.await.unwrap().unwrap();

        drop(listener);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unix_bind_keeps_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("important.dat");
        std::fs::write(&path, b"user data").unwrap();

        let err = Listener::bind(&Endpoint::local(path.display().to_string()), 8)
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            ReceiverError::Bind { source, .. } if source.kind() == io::ErrorKind::AlreadyExists
        ));
        assert_eq!(std::fs::read(&path).unwrap(), b"user data");
    }
}
