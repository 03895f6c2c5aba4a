//! Layered configuration for every overlay role, modeled on this
//! workspace's own `NodeConfig`: a `derive_builder`-built struct per role,
//! deserializable with the `config` crate (defaults → optional file →
//! `OVERLAY_*`-prefixed environment overrides) and also constructible
//! directly from parsed CLI flags.

use std::{net::IpAddr, net::Ipv4Addr, path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment as ConfigEnvironment, File};
use derive_builder::Builder;
use primitives::{HistorySize, Topic, ZoneId};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// How a role's process finds the coordination service. The coordination
/// service's own protocol is outside this crate's scope (see
/// `overlay_coordination`); this struct is only the bit of configuration
/// every role needs to point at it.
#[derive(Builder, Debug, Clone, Deserialize)]
#[builder(default)]
pub struct CoordinationConfig {
    pub zookeeper_hosts: Vec<String>,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            zookeeper_hosts: vec!["127.0.0.1:2181".to_string()],
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

/// Configuration for a per-zone broker.
#[derive(Builder, Debug, Clone, Deserialize)]
#[builder(default)]
pub struct BrokerConfig {
    /// The zone this broker contends for. Required: a broker never picks
    /// its own zone.
    pub zone: ZoneId,

    pub host: IpAddr,

    pub pub_reg_port: u16,

    pub sub_reg_port: u16,

    /// Centralized (broker-forwards) vs. decentralized (broker only
    /// matchmakes) dissemination.
    pub centralized: bool,

    /// Run the event loop forever rather than for `max_event_count` turns.
    pub indefinite: bool,

    pub max_event_count: usize,

    /// Test-only escape hatch: force the broker to give up leadership and
    /// exit after this many seconds, regardless of `indefinite`.
    pub autokill_secs: Option<u64>,

    pub coordination: CoordinationConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            zone: ZoneId::FIRST,
            host: default_host(),
            pub_reg_port: 5555,
            sub_reg_port: 5556,
            centralized: false,
            indefinite: true,
            max_event_count: 15,
            autokill_secs: None,
            coordination: CoordinationConfig::default(),
        }
    }
}

impl BrokerConfig {
    pub fn from_file(config_path: &str) -> Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            .add_source(ConfigEnvironment::with_prefix("OVERLAY_BROKER"))
            .build()?;

        Ok(s.try_deserialize().unwrap_or_default())
    }
}

/// Configuration for a publisher client.
#[derive(Builder, Debug, Clone, Deserialize)]
#[builder(default)]
pub struct PublisherConfig {
    pub topics: Vec<Topic>,

    /// Size of the sliding history buffer this publisher offers; a
    /// subscriber only matches if its `requested` is `<=` this value.
    pub offered: HistorySize,

    pub bind_port: u16,

    #[serde(with = "duration_secs")]
    pub sleep_period: Duration,

    pub indefinite: bool,

    pub max_event_count: usize,

    pub coordination: CoordinationConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topics: vec![Topic::from("A")],
            offered: 1,
            bind_port: 0,
            sleep_period: Duration::from_secs(1),
            indefinite: false,
            max_event_count: 15,
            coordination: CoordinationConfig::default(),
        }
    }
}

impl PublisherConfig {
    pub fn from_file(config_path: &str) -> Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            .add_source(ConfigEnvironment::with_prefix("OVERLAY_PUBLISHER"))
            .build()?;

        Ok(s.try_deserialize().unwrap_or_default())
    }
}

/// Configuration for a subscriber client.
#[derive(Builder, Debug, Clone, Deserialize)]
#[builder(default)]
pub struct SubscriberConfig {
    pub topics: Vec<Topic>,

    /// How many recent events this subscriber wants recovered per
    /// delivered message; only matches publishers with `offered >=` this.
    pub requested: HistorySize,

    pub indefinite: bool,

    pub max_event_count: usize,

    /// Finite-mode only: where to write the received-event CSV log.
    pub filename: Option<PathBuf>,

    pub coordination: CoordinationConfig,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            topics: vec![Topic::from("A")],
            requested: 1,
            indefinite: false,
            max_event_count: 15,
            filename: None,
            coordination: CoordinationConfig::default(),
        }
    }
}

impl SubscriberConfig {
    pub fn from_file(config_path: &str) -> Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            .add_source(ConfigEnvironment::with_prefix("OVERLAY_SUBSCRIBER"))
            .build()?;

        Ok(s.try_deserialize().unwrap_or_default())
    }
}

/// Configuration for the backup-pool autoscaler.
#[derive(Builder, Debug, Clone, Deserialize)]
#[builder(default)]
pub struct BackupPoolConfig {
    /// Spin up a new zone once `current_load` exceeds this.
    pub load_threshold: f64,

    pub centralized: bool,

    pub coordination: CoordinationConfig,
}

impl Default for BackupPoolConfig {
    fn default() -> Self {
        Self {
            load_threshold: 3.0,
            centralized: false,
            coordination: CoordinationConfig::default(),
        }
    }
}

impl BackupPoolConfig {
    pub fn from_file(config_path: &str) -> Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            .add_source(ConfigEnvironment::with_prefix("OVERLAY_BACKUP_POOL"))
            .build()?;

        Ok(s.try_deserialize().unwrap_or_default())
    }
}

/// Configuration for the administrative load balancer.
#[derive(Builder, Debug, Clone, Deserialize)]
#[builder(default)]
pub struct LoadBalancerConfig {
    pub load_threshold: f64,

    /// Dissemination mode to configure standby brokers with; must match
    /// the mode the zone's existing brokers were started with.
    pub centralized: bool,

    pub coordination: CoordinationConfig,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            load_threshold: 3.0,
            centralized: false,
            coordination: CoordinationConfig::default(),
        }
    }
}

impl LoadBalancerConfig {
    pub fn from_file(config_path: &str) -> Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name(config_path))
            .add_source(ConfigEnvironment::with_prefix("OVERLAY_LOAD_BALANCER"))
            .build()?;

        Ok(s.try_deserialize().unwrap_or_default())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_config_defaults_are_sane() {
        let config = BrokerConfig::default();

        assert_eq!(config.zone, ZoneId::FIRST);
        assert_eq!(config.pub_reg_port, 5555);
        assert_eq!(config.sub_reg_port, 5556);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = BrokerConfigBuilder::default()
            .zone(ZoneId(2))
            .centralized(true)
            .build()
            .unwrap();

        assert_eq!(config.zone, ZoneId(2));
        assert!(config.centralized);
    }
}
