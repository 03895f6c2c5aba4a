#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("coordination error: {0}")]
    Coordination(#[from] coordination::Error),

    #[error("coordinator session lost")]
    SessionLost,
}

pub type Result<T> = std::result::Result<T, Error>;
