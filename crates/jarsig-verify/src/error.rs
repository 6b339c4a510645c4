//! Error types for signed archive reading.

use std::io;

use thiserror::Error;

/// Cryptographic or structural failure of the archive's signature data.
///
/// Any of these invalidates the whole archive: callers must not trust any
/// entry once one has been reported.
#[derive(Debug, Error)]
pub enum SecurityFailure {
    #[error("{algorithm} digest error for {entry}")]
    EntryDigestMismatch { entry: String, algorithm: String },

    #[error("invalid {algorithm} signature file digest for {entry} in {signature_file}")]
    SectionDigestMismatch {
        signature_file: String,
        entry: String,
        algorithm: String,
    },

    #[error("invalid signature file digest for manifest main attributes in {signature_file}")]
    MainAttributesDigestMismatch { signature_file: String },

    #[error("no manifest section for signature file entry {entry} in {signature_file}")]
    MissingManifestSection {
        signature_file: String,
        entry: String,
    },

    #[error("malformed {file}: {reason}")]
    Malformed { file: String, reason: String },

    #[error("invalid signature block {block}: {reason}")]
    InvalidSignatureBlock { block: String, reason: String },

    #[error("signature in {block} does not verify over {signature_file}")]
    BadSignature {
        block: String,
        signature_file: String,
    },

    #[error("unsupported {kind} {oid} in {block}")]
    UnsupportedAlgorithm {
        block: String,
        kind: &'static str,
        oid: String,
    },

    #[error("signer certificate not found in {block}")]
    SignerCertificateMissing { block: String },
}

/// Errors from opening or reading a signed archive
#[derive(Debug, Error)]
pub enum JarError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("corrupt data in entry {entry}: {source}")]
    Corrupt {
        entry: String,
        #[source]
        source: io::Error,
    },

    #[error("entry {entry} exceeds size limit of {limit} bytes")]
    EntryTooLarge { entry: String, limit: u64 },

    #[error("security failure: {0}")]
    Security(#[from] SecurityFailure),
}

impl JarError {
    /// Whether the archive itself failed integrity or signature checks.
    ///
    /// Plain I/O failures opening the file and configured size limits are
    /// not security failures.
    pub fn is_security_failure(&self) -> bool {
        matches!(
            self,
            JarError::Zip(_) | JarError::Corrupt { .. } | JarError::Security(_)
        )
    }
}

/// Result type for archive operations
pub type JarResult<T> = Result<T, JarError>;
