#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("broker error: {0}")]
    Broker(#[from] broker::Error),

    #[error("publisher error: {0}")]
    Publisher(#[from] publisher::Error),

    #[error("subscriber error: {0}")]
    Subscriber(#[from] subscriber::Error),

    #[error("backup pool error: {0}")]
    BackupPool(#[from] backup_pool::Error),

    #[error("load balancer error: {0}")]
    LoadBalancer(#[from] load_balancer::Error),

    #[error("configuration error: {0}")]
    Config(#[from] overlay_config::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CliError>;
