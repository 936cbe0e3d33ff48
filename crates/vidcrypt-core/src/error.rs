use thiserror::Error;

pub type VidcryptResult<T> = Result<T, VidcryptError>;

#[derive(Debug, Error)]
pub enum VidcryptError {
    #[error("config error: {0}")]
    Config(String),

    #[error("video {0} not found")]
    NotFound(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
