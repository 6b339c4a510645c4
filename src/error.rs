//! Error types for signer collection

use jarsig_verify::JarError;
use thiserror::Error;

/// Two content entries were covered by different sets of signers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Mismatch between signers [{}] for file {first_entry} and signers [{}] for file {other_entry}",
    .first_signers.join(", "),
    .other_signers.join(", ")
)]
pub struct SignerMismatchError {
    /// The entry whose signers became the candidate set
    pub first_entry: String,
    /// Display names of the candidate set, in collection order
    pub first_signers: Vec<String>,
    /// The first entry that disagreed
    pub other_entry: String,
    pub other_signers: Vec<String>,
}

/// Errors from collecting an archive's signers
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Archive(#[from] JarError),

    #[error(transparent)]
    SignerMismatch(#[from] SignerMismatchError),

    #[error("failed to encode signer key: {0}")]
    Encoding(#[from] der::Error),
}

impl CollectError {
    /// Whether the archive failed integrity or signature verification
    pub fn is_security_failure(&self) -> bool {
        match self {
            CollectError::Archive(err) => err.is_security_failure(),
            CollectError::SignerMismatch(_) | CollectError::Encoding(_) => false,
        }
    }
}

/// Result type for collection
pub type CollectResult<T> = Result<T, CollectError>;
