use std::net::IpAddr;

use bytes::Bytes;
use telemetry::{debug, warn};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};

use crate::{framing::FrameStream, Error, Result};

const QUEUE_CAPACITY: usize = 64;

/// The broker's half of a decentralized new-publisher notification
/// channel. Unlike [`crate::PublishEndpoint`] this is not a fan-out: the
/// design gives every subscriber exactly one notify endpoint, and the
/// original bound a `REQ` socket per subscriber and blocked on
/// `recv_string()` for its acknowledgement after every push. `notify`
/// reproduces that send-then-await-ack round trip over a plain framed
/// TCP connection; pushes made before the subscriber has connected queue
/// behind the accept handshake instead of failing.
pub struct NotifyEndpoint {
    port: u16,
    tx: mpsc::Sender<(Bytes, oneshot::Sender<String>)>,
}

impl NotifyEndpoint {
    pub async fn bind(host: IpAddr, start_port: u16, max_attempts: u16) -> Result<Self> {
        let mut port = start_port;
        let mut listener = None;
        for attempt in 0..max_attempts {
            match TcpListener::bind((host, port)).await {
                Ok(bound) => {
                    listener = Some(bound);
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::AddrInUse && attempt + 1 < max_attempts => {
                    port = port.wrapping_add(1);
                }
                Err(err) => return Err(err.into()),
            }
        }
        let listener = match listener {
            Some(listener) => listener,
            None => return Err(crate::Error::NoPortAvailable(start_port, port)),
        };

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        spawn_notify_loop(listener, rx);

        Ok(Self { port, tx })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sends `payload` to the subscriber and waits for its acknowledgement
    /// string. Returns [`Error::ConnectionClosed`] if the subscriber's
    /// connection drops before replying.
    pub async fn notify(&self, payload: Bytes) -> Result<String> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((payload, ack_tx))
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        ack_rx.await.map_err(|_| Error::ConnectionClosed)
    }
}

fn spawn_notify_loop(listener: TcpListener, mut rx: mpsc::Receiver<(Bytes, oneshot::Sender<String>)>) {
    tokio::spawn(async move {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(%err, "notify endpoint accept failed");
                return;
            }
        };
        debug!(%peer, "subscriber connected to notify endpoint");
        let mut frame = FrameStream::new(stream);

        while let Some((payload, ack_tx)) = rx.recv().await {
            if frame.send_bytes(payload).await.is_err() {
                return;
            }
            match frame.recv_bytes().await {
                Ok(bytes) => {
                    let ack = String::from_utf8_lossy(&bytes).into_owned();
                    let _ = ack_tx.send(ack);
                }
                Err(_) => return,
            }
        }
    });
}

/// The subscriber's half of the same channel: connects once to the
/// broker-assigned notify port, then alternates reading a notification
/// and writing back its acknowledgement string.
pub struct NotifyClient {
    stream: FrameStream,
}

impl NotifyClient {
    pub async fn connect(addr: std::net::SocketAddr) -> Result<Self> {
        Ok(Self {
            stream: FrameStream::connect(addr).await?,
        })
    }

    pub async fn recv(&mut self) -> Result<Bytes> {
        Ok(self.stream.recv_bytes().await?.freeze())
    }

    pub async fn ack(&mut self, message: &str) -> Result<()> {
        self.stream
            .send_bytes(Bytes::copy_from_slice(message.as_bytes()))
            .await
    }
}
