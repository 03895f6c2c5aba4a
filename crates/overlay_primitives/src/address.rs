use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Best-effort local address resolution. On a real network this would walk
/// the host's interfaces to pick a non-loopback one; absent that
/// information (containers, CI, unit tests) it falls back to
/// `127.0.0.1`.
pub fn local_ip_address() -> IpAddr {
    local_non_loopback_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn local_non_loopback_ip() -> Option<IpAddr> {
    // std has no interface enumeration; a real deployment would plug a
    // crate such as `if-addrs` in here. We keep the overlay's own crates
    // dependency-light and rely on the bind address supplied via config in
    // anything but a loopback-only test/demo run.
    None
}

/// An endpoint triple as written into `/primaries/zone_<N>`:
/// `"host,pub_reg_port,sub_reg_port"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryEndpoint {
    pub host: IpAddr,
    pub pub_reg_port: u16,
    pub sub_reg_port: u16,
}

impl PrimaryEndpoint {
    pub fn pub_reg_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.pub_reg_port)
    }

    pub fn sub_reg_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.sub_reg_port)
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("{},{},{}", self.host, self.pub_reg_port, self.sub_reg_port).into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PrimaryEndpointParseError> {
        let text = std::str::from_utf8(bytes).map_err(|_| PrimaryEndpointParseError)?;
        let mut parts = text.splitn(3, ',');
        let host = parts
            .next()
            .ok_or(PrimaryEndpointParseError)?
            .parse::<IpAddr>()
            .map_err(|_| PrimaryEndpointParseError)?;
        let pub_reg_port = parts
            .next()
            .ok_or(PrimaryEndpointParseError)?
            .parse::<u16>()
            .map_err(|_| PrimaryEndpointParseError)?;
        let sub_reg_port = parts
            .next()
            .ok_or(PrimaryEndpointParseError)?
            .parse::<u16>()
            .map_err(|_| PrimaryEndpointParseError)?;
        Ok(Self {
            host,
            pub_reg_port,
            sub_reg_port,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed primary endpoint znode value")]
pub struct PrimaryEndpointParseError;
