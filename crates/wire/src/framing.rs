use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::{Error, Result};

/// A length-delimited frame stream over a single TCP connection. Every
/// socket kind in this crate (request/reply, publish/subscribe) is built on
/// top of this: one `Framed<TcpStream, LengthDelimitedCodec>` per
/// connection, with JSON used for any frame that carries structured data.
pub struct FrameStream {
    inner: Framed<TcpStream, LengthDelimitedCodec>,
}

impl FrameStream {
    pub fn new(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        Self {
            inner: Framed::new(stream, LengthDelimitedCodec::new()),
        }
    }

    pub async fn connect(addr: std::net::SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream))
    }

    pub async fn send_bytes(&mut self, frame: Bytes) -> Result<()> {
        self.inner.send(frame).await.map_err(Error::Io)
    }

    pub async fn recv_bytes(&mut self) -> Result<BytesMut> {
        match self.inner.next().await {
            Some(frame) => frame.map_err(Error::Io),
            None => Err(Error::ConnectionClosed),
        }
    }

    pub async fn send_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.send_bytes(Bytes::from(payload)).await
    }

    pub async fn recv_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.recv_bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Sends a two-frame multipart message: `[topic, payload]`, the wire
    /// shape every published event and every new-publisher notification
    /// uses (frame 0 is the pattern a subscriber filters on).
    pub async fn send_multipart(&mut self, topic: &[u8], payload: &[u8]) -> Result<()> {
        self.send_bytes(Bytes::copy_from_slice(topic)).await?;
        self.send_bytes(Bytes::copy_from_slice(payload)).await
    }

    pub async fn recv_multipart(&mut self) -> Result<(BytesMut, BytesMut)> {
        let topic = self.recv_bytes().await?;
        let payload = self.recv_bytes().await?;
        Ok((topic, payload))
    }
}
