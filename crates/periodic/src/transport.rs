//! Dialing the server
//!
//! [`connect`] turns an [`Endpoint`] into a [`Stream`] so that the
//! multiplexer never has to care which socket family it is talking over.

use crate::config::Endpoint;
use crate::{PeriodicError, Result};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

#[cfg(unix)]
use tokio::net::UnixStream;

/// A connected socket
#[derive(Debug)]
pub enum Stream {
    /// TCP connection
    Tcp(TcpStream),
    /// Unix domain socket connection
    #[cfg(unix)]
    Unix(UnixStream),
}

/// Open a connection to `endpoint`
pub async fn connect(endpoint: &Endpoint) -> Result<Stream> {
    debug!(%endpoint, "Dialing");
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str())
                .await
                .map_err(|e| PeriodicError::Transport(format!("Failed to connect to {}: {}", endpoint, e)))?;
            stream.set_nodelay(true)?;
            Ok(Stream::Tcp(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = UnixStream::connect(path)
                .await
                .map_err(|e| PeriodicError::Transport(format!("Failed to connect to {}: {}", endpoint, e)))?;
            Ok(Stream::Unix(stream))
        }
        #[cfg(not(unix))]
        Endpoint::Unix(_) => Err(PeriodicError::InvalidEndpoint(format!(
            "unix sockets are not supported on this platform: {}",
            endpoint
        ))),
    }
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            Self::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use periodic_proto::RecordCodec;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connect_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut codec = RecordCodec::new();
            codec.read_record(&mut socket).await.unwrap().unwrap()
        });

        let endpoint = Endpoint::parse(&format!("tcp://{}", addr)).unwrap();
        let mut stream = connect(&endpoint).await.unwrap();
        RecordCodec::new().write_record(&mut stream, b"hi").await.unwrap();
        stream.shutdown().await.unwrap();

        assert_eq!(&server.await.unwrap()[..], b"hi");
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = Endpoint::parse(&format!("tcp://{}", addr)).unwrap();
        let result = connect(&endpoint).await;
        assert!(matches!(result, Err(PeriodicError::Transport(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("periodic.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            RecordCodec::new().read_record(&mut socket).await.unwrap().unwrap()
        });

        let endpoint = Endpoint::parse(&format!("unix://{}", path.display())).unwrap();
        let mut stream = connect(&endpoint).await.unwrap();
        RecordCodec::new().write_record(&mut stream, b"\x01").await.unwrap();

        assert_eq!(&server.await.unwrap()[..], b"\x01");
    }
}
