#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("coordination error: {0}")]
    Coordination(#[from] coordination::Error),

    #[error("wire error: {0}")]
    Wire(#[from] wire::Error),

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed primary endpoint: {0}")]
    Endpoint(#[from] primitives::PrimaryEndpointParseError),

    #[error("no zones available under /primaries")]
    NoZonesAvailable,
}

pub type Result<T> = std::result::Result<T, Error>;
