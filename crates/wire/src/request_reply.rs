use std::net::SocketAddr;

use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpListener;
use telemetry::warn;

use crate::{framing::FrameStream, Error, Result};

/// The wire shape every registration handler in this system replies with
/// on failure: `{"error": "<reason>"}`.
#[derive(Debug, serde::Serialize)]
struct ErrorReply<'a> {
    error: &'a str,
}

/// A single request/reply round trip: connect, send one JSON request,
/// read back one JSON response, then drop the connection. Mirrors a
/// REQ socket's one-shot-per-call usage in this system: publishers and
/// subscribers never keep a registration socket open past the reply.
pub async fn call<Req, Resp>(addr: SocketAddr, request: &Req) -> Result<Resp>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut stream = FrameStream::connect(addr).await?;
    stream.send_json(request).await?;
    stream.recv_json().await
}

/// A registration endpoint (the broker's pub-reg or sub-reg socket).
/// Binds to an address in `[start_port, start_port + max_attempts)`,
/// retrying on `AddrInUse` exactly as the design's port-allocation rule
/// requires, and hands back both the listener and the port it actually
/// bound.
pub struct ReplyServer {
    listener: TcpListener,
    port: u16,
}

impl ReplyServer {
    pub async fn bind(host: std::net::IpAddr, start_port: u16, max_attempts: u16) -> Result<Self> {
        let mut port = start_port;
        for attempt in 0..max_attempts {
            match TcpListener::bind((host, port)).await {
                Ok(listener) => return Ok(Self { listener, port }),
                Err(err) if err.kind() == std::io::ErrorKind::AddrInUse && attempt + 1 < max_attempts => {
                    warn!(port, "port in use, retrying with next port");
                    port = port.wrapping_add(1);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(crate::Error::NoPortAvailable(start_port, port))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accepts the next incoming connection and reads its one request
    /// frame. The returned [`PendingRequest`] must be replied to exactly
    /// once; dropping it without replying leaves the caller's peer
    /// hanging (the original design always acknowledges, even on error).
    ///
    /// A request frame that fails to deserialize is never silently
    /// dropped: the peer gets a `{"error": "<reason>"}` reply before this
    /// returns `Err`, matching every other registration failure mode.
    pub async fn accept_one<Req: DeserializeOwned>(&self) -> Result<PendingRequest<Req>> {
        let (stream, _peer) = self.listener.accept().await?;
        let mut stream = FrameStream::new(stream);
        let bytes = stream.recv_bytes().await?;

        match serde_json::from_slice::<Req>(&bytes) {
            Ok(body) => Ok(PendingRequest { stream, body }),
            Err(err) => {
                let reply = ErrorReply {
                    error: &err.to_string(),
                };
                if let Err(send_err) = stream.send_json(&reply).await {
                    warn!(%send_err, "failed to send malformed-request error reply");
                }
                Err(Error::Json(err))
            }
        }
    }
}

pub struct PendingRequest<Req> {
    stream: FrameStream,
    body: Req,
}

impl<Req> PendingRequest<Req> {
    pub fn body(&self) -> &Req {
        &self.body
    }

    pub fn into_body(self) -> Req {
        self.body
    }

    pub async fn reply<Resp: Serialize>(mut self, response: &Resp) -> Result<()> {
        self.stream.send_json(response).await
    }
}
