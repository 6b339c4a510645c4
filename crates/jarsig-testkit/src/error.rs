use std::io;

use thiserror::Error;

/// Errors while generating fixtures
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    #[error("SPKI error: {0}")]
    Spki(#[from] spki::Error),

    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("unknown distinguished name attribute {0}")]
    UnknownAttribute(String),

    #[error("{0} not found in archive")]
    NotFound(String),
}

pub type FixtureResult<T> = Result<T, FixtureError>;
