//! Signed JAR verification
//!
//! Reads ZIP-based Java archives and verifies their signatures the way the
//! JDK's signed-jar reader does: the manifest lists per-entry digests, each
//! signature file (`META-INF/*.SF`) digests the manifest, and each signature
//! block (`META-INF/*.RSA`, `*.DSA`, `*.EC`) is a PKCS#7 signature over its
//! signature file.

pub mod block;
pub mod chain;
pub mod digest;
pub mod error;
pub mod jar;
pub mod manifest;
pub mod signature_file;

pub use chain::{display_name, CertificateChain};
pub use digest::DigestAlgorithm;
pub use error::{JarError, JarResult, SecurityFailure};
pub use jar::{EntryInfo, ReadLimits, SignedJar, VerifiedEntry};
pub use manifest::{Manifest, Section};
pub use signature_file::SignatureFile;

/// Reserved directory for the manifest and signature data
pub const METADATA_DIR: &str = "META-INF/";

/// Location of the manifest
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

/// Whether `name` lives under [`METADATA_DIR`], compared case-insensitively
pub fn is_metadata_entry(name: &str) -> bool {
    name.get(..METADATA_DIR.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(METADATA_DIR))
}
