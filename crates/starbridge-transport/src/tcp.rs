//! TCP message transport
//!
//! Frames whole messages over a TCP stream as `[u32 LE length][bytes]`.
//! The very first message a connecting peer sends is the pre-shared filter
//! key; the listening side checks it before the connection is handed to
//! anyone, and silently drops peers that present the wrong key.

use crate::transport::{MessageSink, MessageSource, TransportError, TransportResult};
use crate::MAX_MESSAGE_SIZE;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

async fn write_message(writer: &mut OwnedWriteHalf, data: &[u8]) -> TransportResult<()> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(TransportError::MessageTooLarge(data.len()));
    }
    writer.write_all(&(data.len() as u32).to_le_bytes()).await?;
    writer.write_all(data).await?;
    Ok(())
}

async fn read_message(reader: &mut OwnedReadHalf) -> TransportResult<Option<Bytes>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(TransportError::MessageTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(Bytes::from(buf)))
}

/// A connected TCP message transport to one peer.
pub struct TcpTransport {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    peer_addr: SocketAddr,
}

impl TcpTransport {
    /// Connect to a listening peer and present the filter key.
    ///
    /// A wrong key is not answered; the listener just drops the
    /// connection, which surfaces here as the next read returning EOF.
    pub async fn connect(host: &str, port: u16, filter_key: &str) -> TransportResult<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let (reader, mut writer) = stream.into_split();

        write_message(&mut writer, filter_key.as_bytes()).await?;
        debug!("connected to {}", peer_addr);

        Ok(Self {
            reader,
            writer,
            peer_addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Split into independently owned sink and source halves.
    pub fn into_split(self) -> (TcpSink, TcpSource) {
        (TcpSink(self.writer), TcpSource(self.reader))
    }
}

/// Sending half of a [`TcpTransport`].
pub struct TcpSink(OwnedWriteHalf);

#[async_trait]
impl MessageSink for TcpSink {
    async fn send(&mut self, data: Bytes) -> TransportResult<()> {
        write_message(&mut self.0, &data).await
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.0.shutdown().await?;
        Ok(())
    }
}

/// Receiving half of a [`TcpTransport`].
pub struct TcpSource(OwnedReadHalf);

#[async_trait]
impl MessageSource for TcpSource {
    async fn recv(&mut self) -> TransportResult<Option<Bytes>> {
        read_message(&mut self.0).await
    }
}

/// Listens for a peer connection, filtering on the pre-shared key.
pub struct TcpServer {
    listener: TcpListener,
    filter_key: String,
}

impl TcpServer {
    pub async fn bind(port: u16, filter_key: &str) -> TransportResult<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        debug!("listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            filter_key: filter_key.to_string(),
        })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next peer that presents the correct filter key.
    ///
    /// Peers with a wrong or missing key are dropped and logged, and the
    /// server keeps listening.
    pub async fn accept(&self) -> TransportResult<TcpTransport> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            stream.set_nodelay(true)?;
            let (mut reader, writer) = stream.into_split();

            match read_message(&mut reader).await {
                Ok(Some(key)) if key == self.filter_key.as_bytes() => {
                    debug!("accepted peer {}", addr);
                    return Ok(TcpTransport {
                        reader,
                        writer,
                        peer_addr: addr,
                    });
                }
                Ok(Some(_)) => {
                    warn!("peer {} presented a wrong filter key, dropping", addr);
                }
                Ok(None) => {
                    warn!("peer {} disconnected before sending a filter key", addr);
                }
                Err(e) => {
                    warn!("error reading filter key from {}: {}", addr, e);
                }
            }
        }
    }
}
