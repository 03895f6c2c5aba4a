use bytes::Bytes;
use tokio::{net::TcpListener, sync::broadcast};
use telemetry::debug;

use crate::{framing::FrameStream, Result};

/// A publish-pattern endpoint: binds one port, accepts any number of
/// subscriber connections, and fans every published multipart message out
/// to all of them. Used both by publishers (their own bind endpoint) and,
/// in centralized mode, by brokers (one endpoint per topic they relay).
#[derive(Clone)]
pub struct PublishEndpoint {
    port: u16,
    tx: broadcast::Sender<(Bytes, Bytes)>,
}

const BROADCAST_CAPACITY: usize = 1024;

impl PublishEndpoint {
    pub async fn bind(host: std::net::IpAddr, start_port: u16, max_attempts: u16) -> Result<Self> {
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

        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        spawn_accept_loop(listener, tx.clone());

        Ok(Self { port, tx })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Fans `(topic, payload)` out to every subscriber currently connected.
    /// A publish with zero subscribers is not an error (nobody is
    /// listening yet, or everyone has disconnected).
    pub fn publish(&self, topic: Bytes, payload: Bytes) {
        let _ = self.tx.send((topic, payload));
    }
}

fn spawn_accept_loop(listener: TcpListener, tx: broadcast::Sender<(Bytes, Bytes)>) {
    tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    debug!(%err, "publish endpoint accept loop ending");
                    return;
                }
            };

            let mut rx = tx.subscribe();
            tokio::spawn(async move {
                let mut frame = FrameStream::new(stream);
                debug!(%peer, "subscriber connected to publish endpoint");
                while let Ok((topic, payload)) = rx.recv().await {
                    if frame.send_multipart(&topic, &payload).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
}

/// A subscribe-pattern connection to a single remote publish endpoint.
/// Topic filtering is performed by the caller against the topic frame,
/// not by this socket, so the same endpoint works for both a subscriber's
/// per-topic interest filter and the broker's per-topic relay routing.
pub struct SubscribeEndpoint {
    stream: FrameStream,
}

impl SubscribeEndpoint {
    pub async fn connect(addr: std::net::SocketAddr) -> Result<Self> {
        Ok(Self {
            stream: FrameStream::connect(addr).await?,
        })
    }

    pub async fn recv(&mut self) -> Result<(Bytes, Bytes)> {
        let (topic, payload) = self.stream.recv_multipart().await?;
        Ok((topic.freeze(), payload.freeze()))
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_multipart_messages() {
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let endpoint = PublishEndpoint::bind(loopback, 0, 1).await.unwrap();
        let addr = std::net::SocketAddr::new(loopback, endpoint.port());

        let mut subscriber = SubscribeEndpoint::connect(addr).await.unwrap();
        // Give the accept loop a moment to register the broadcast subscription.
        tokio::time::sleep(Duration::from_millis(20)).await;

        endpoint.publish(Bytes::from_static(b"topic-a"), Bytes::from_static(b"payload"));

        let (topic, payload) = subscriber.recv().await.unwrap();
        assert_eq!(&topic[..], b"topic-a");
        assert_eq!(&payload[..], b"payload");
    }
}
