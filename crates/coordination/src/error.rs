#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("no such node: {0}")]
    NoNode(String),

    #[error("node has children, refusing to delete: {0}")]
    NotEmpty(String),

    #[error("session lost")]
    SessionLost,

    #[error("serde_json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
