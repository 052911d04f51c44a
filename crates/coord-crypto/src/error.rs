use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid hash: {0}")]
    InvalidHash(String),
}
