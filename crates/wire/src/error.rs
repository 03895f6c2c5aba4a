#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("peer closed the connection before a complete frame was read")]
    ConnectionClosed,

    #[error("bind failed on every port in {0}..={1}")]
    NoPortAvailable(u16, u16),
}

pub type Result<T> = std::result::Result<T, Error>;
