#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("coordination error: {0}")]
    Coordination(#[from] coordination::Error),

    #[error("wire error: {0}")]
    Wire(#[from] wire::Error),

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unable to bind any registration port after exhausting the configured range")]
    NoPortAvailable,

    #[error("coordinator session lost while holding leadership")]
    SessionLost,
}

pub type Result<T> = std::result::Result<T, Error>;
