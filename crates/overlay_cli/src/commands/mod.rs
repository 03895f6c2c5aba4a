mod backup_pool_cmd;
mod broker_cmd;
mod load_balancer_cmd;
mod publisher_cmd;
mod subscriber_cmd;

use std::sync::Arc;

use coordination::InMemoryCoordinationClient;

use crate::{
    cli::{Args, Role},
    result::Result,
};

/// Dispatches to the role selected on the command line. Every role shares
/// the same process-local [`InMemoryCoordinationClient`] tree, so a single
/// overlay binary invocation can only usefully drive scenarios where every
/// role lives in this process — exactly the shape the scenario integration
/// tests in each role crate already exercise. A real deployment wires
/// `--zookeeper-hosts` into a network-backed `CoordinationClient`
/// implementation instead.
pub async fn exec(args: Args) -> Result<()> {
    let coordination = Arc::new(InMemoryCoordinationClient::new());

    match args.role {
        Role::Broker(opts) => broker_cmd::run(opts, coordination).await,
        Role::Publisher(opts) => publisher_cmd::run(opts, coordination).await,
        Role::Subscriber(opts) => subscriber_cmd::run(opts, coordination).await,
        Role::BackupPool(opts) => backup_pool_cmd::run(opts, coordination).await,
        Role::LoadBalancer(opts) => load_balancer_cmd::run(opts, coordination).await,
    }
}
