use std::{net::IpAddr, path::PathBuf};

use clap::{Parser, Subcommand};
use primitives::{Topic, ZoneId};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Pub/sub overlay broker, clients and autoscaling actors")]
pub struct Args {
    /// Path to a layered config file (defaults + this file + OVERLAY_* env vars).
    #[clap(short, long, value_parser, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub role: Role,
}

#[derive(Subcommand, Debug)]
pub enum Role {
    /// Contends for a zone's leadership and serves client registrations.
    Broker(BrokerOpts),
    /// Publishes topic-tagged events carrying a sliding history buffer.
    Publisher(PublisherOpts),
    /// Registers topic interest and records delivered events.
    Subscriber(SubscriberOpts),
    /// Watches aggregate load and spins up new zones past threshold.
    BackupPool(BackupPoolOpts),
    /// Maintains standby brokers and promotes/demotes them by load.
    LoadBalancer(LoadBalancerOpts),
}

#[derive(Parser, Debug)]
pub struct CoordinationOpts {
    /// Coordination service hosts, e.g. `zk1:2181,zk2:2181`.
    #[clap(long, value_delimiter = ',', default_value = "127.0.0.1:2181")]
    pub zookeeper_hosts: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct BrokerOpts {
    /// The zone this broker contends for leadership of.
    #[clap(short, long, value_parser)]
    pub zone: u32,

    #[clap(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[clap(long, default_value_t = 5555)]
    pub pub_reg_port: u16,

    #[clap(long, default_value_t = 5556)]
    pub sub_reg_port: u16,

    /// Forward every message through the broker instead of gossiping
    /// publisher addresses to subscribers directly.
    #[clap(long, action)]
    pub centralized: bool,

    #[clap(long, action)]
    pub indefinite: bool,

    #[clap(long, default_value_t = 15)]
    pub max_event_count: usize,

    /// Test-only: step down and exit after this many seconds regardless
    /// of `indefinite`.
    #[clap(long)]
    pub autokill_secs: Option<u64>,

    #[clap(flatten)]
    pub coordination: CoordinationOpts,
}

#[derive(Parser, Debug)]
pub struct PublisherOpts {
    #[clap(short, long, value_delimiter = ',', default_value = "A")]
    pub topics: Vec<String>,

    /// Size of the sliding history buffer offered with every message.
    #[clap(long, default_value_t = 1)]
    pub offered: usize,

    #[clap(long, default_value_t = 0)]
    pub bind_port: u16,

    #[clap(long, default_value_t = 1)]
    pub sleep_period_secs: u64,

    #[clap(long, action)]
    pub indefinite: bool,

    #[clap(long, default_value_t = 15)]
    pub max_event_count: usize,

    #[clap(flatten)]
    pub coordination: CoordinationOpts,
}

#[derive(Parser, Debug)]
pub struct SubscriberOpts {
    #[clap(short, long, value_delimiter = ',', default_value = "A")]
    pub topics: Vec<String>,

    /// How many recent events to recover per delivered message; only
    /// matches publishers whose `offered` is at least this.
    #[clap(long, default_value_t = 1)]
    pub requested: usize,

    #[clap(long, action)]
    pub indefinite: bool,

    #[clap(long, default_value_t = 15)]
    pub max_event_count: usize,

    /// Finite-mode only: where to write the received-event CSV log.
    #[clap(long, value_parser)]
    pub filename: Option<PathBuf>,

    #[clap(flatten)]
    pub coordination: CoordinationOpts,
}

#[derive(Parser, Debug)]
pub struct BackupPoolOpts {
    /// Spin up a new zone once `current_load` exceeds this.
    #[clap(long, default_value_t = 3.0)]
    pub load_threshold: f64,

    #[clap(long, action)]
    pub centralized: bool,

    #[clap(flatten)]
    pub coordination: CoordinationOpts,
}

#[derive(Parser, Debug)]
pub struct LoadBalancerOpts {
    #[clap(long, default_value_t = 3.0)]
    pub load_threshold: f64,

    #[clap(long, action)]
    pub centralized: bool,

    #[clap(flatten)]
    pub coordination: CoordinationOpts,
}

pub fn parse_topics(raw: &[String]) -> Vec<Topic> {
    raw.iter().map(|t| Topic::from(t.as_str())).collect()
}

pub fn parse_zone(raw: u32) -> ZoneId {
    ZoneId(raw)
}
