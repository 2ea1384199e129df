//! Async TCP transport for tether endpoints.
//!
//! Thin wrappers over tokio's TCP primitives. Setup walks the staged
//! create/bind/listen/accept and create/connect sequences explicitly, so
//! every stage maps onto its own [`SetupError`] variant.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use super::error::SetupError;

/// How a peer connection came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Accepted on the service side of a listener.
    Raw,
    /// Created by connecting out to a remote service.
    Stream,
}

/// Listening half of a service endpoint.
///
/// Accepts exactly as many peers as the caller asks for; the endpoint layer
/// drops it after its single accept.
#[derive(Debug)]
pub struct TetherListener {
    listener: TcpListener,
}

impl TetherListener {
    /// Create a listener on `port` across all interfaces.
    ///
    /// Port 0 asks the OS for an ephemeral port, recoverable through
    /// [`TetherListener::local_addr`]. Must be called from within a tokio
    /// runtime.
    pub fn create(port: u16, backlog: u32) -> Result<Self, SetupError> {
        let socket = TcpSocket::new_v4().map_err(SetupError::SocketCreate)?;
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        socket
            .bind(addr)
            .map_err(|source| SetupError::Bind { port, source })?;
        let listener = socket
            .listen(backlog)
            .map_err(|source| SetupError::Listen { port, source })?;
        Ok(Self { listener })
    }

    /// Address the listener is bound to, with any OS-assigned port resolved.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for one inbound connection.
    pub async fn accept(&self) -> Result<TetherStream, SetupError> {
        let (stream, peer) = self.listener.accept().await.map_err(SetupError::Accept)?;
        Ok(TetherStream {
            stream,
            peer,
            kind: SocketKind::Raw,
        })
    }
}

/// One live peer connection.
#[derive(Debug)]
pub struct TetherStream {
    stream: TcpStream,
    peer: SocketAddr,
    kind: SocketKind,
}

impl TetherStream {
    /// Connect out to the service at `ip:port`.
    ///
    /// An unparseable `ip` fails at the stream-creation stage, before any
    /// socket exists.
    pub async fn connect(ip: &str, port: u16) -> Result<Self, SetupError> {
        let ip: IpAddr = ip.parse().map_err(|_| {
            SetupError::StreamCreate(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid peer address: {ip}"),
            ))
        })?;
        let addr = SocketAddr::new(ip, port);
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(SetupError::StreamCreate)?;
        let stream = socket
            .connect(addr)
            .await
            .map_err(|source| SetupError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            stream,
            peer: addr,
            kind: SocketKind::Stream,
        })
    }

    /// Read available bytes into `buf`.
    ///
    /// `Ok(0)` means the peer closed its sending side (never passed an
    /// empty `buf`, which would be indistinguishable).
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    /// Write all of `data` to the peer.
    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await
    }

    /// Shut the sending side down.
    ///
    /// Errors are swallowed; shutting down an already dead connection must
    /// stay callable any number of times.
    pub async fn close(&mut self) {
        let _ = self.stream.shutdown().await;
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of this side of the connection.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// How this connection came to exist.
    pub fn kind(&self) -> SocketKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_ephemeral_port() {
        let listener = TetherListener::create(0, 8).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.port() != 0);
    }

    #[tokio::test]
    async fn test_accept_assigns_kinds() {
        let listener = TetherListener::create(0, 8).unwrap();
        let port = listener.local_addr().unwrap().port();

        // The listen backlog lets the connect complete before accept runs.
        let client = TetherStream::connect("127.0.0.1", port).await.unwrap();
        let server = listener.accept().await.unwrap();

        assert_eq!(client.kind(), SocketKind::Stream);
        assert_eq!(server.kind(), SocketKind::Raw);
        assert_eq!(client.peer_addr().port(), port);
    }

    #[tokio::test]
    async fn test_read_write_roundtrip() {
        let listener = TetherListener::create(0, 8).unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = TetherStream::connect("127.0.0.1", port).await.unwrap();
        let mut server = listener.accept().await.unwrap();

        server.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 16];
        let mut got = 0;
        while got < 4 {
            let n = client.read(&mut buf[got..]).await.unwrap();
            assert!(n > 0);
            got += n;
        }
        assert_eq!(&buf[..4], b"ping");
    }

    #[tokio::test]
    async fn test_close_signals_eof_to_peer() {
        let listener = TetherListener::create(0, 8).unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = TetherStream::connect("127.0.0.1", port).await.unwrap();
        let mut server = listener.accept().await.unwrap();

        server.close().await;
        server.close().await;

        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_connect_to_closed_port() {
        // Bind then drop a listener so the port is known to be closed.
        let listener = TetherListener::create(0, 8).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TetherStream::connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(SetupError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_address() {
        let result = TetherStream::connect("not-an-ip", 80).await;
        assert!(matches!(result, Err(SetupError::StreamCreate(_))));
    }
}
