//! Signature file (`META-INF/*.SF`) verification against the manifest
//!
//! A signature file is trusted once its block verifies. What it signs is
//! then decided here:
//! 1. a matching `<ALG>-Digest-Manifest` covers every named section
//! 2. otherwise the main attributes digest (if present) must match, and each
//!    named section must match the digest of the manifest section it names

use log::{debug, warn};

use crate::digest::{matches_base64, DigestAlgorithm};
use crate::error::SecurityFailure;
use crate::manifest::{Manifest, Section};

const DIGEST_MANIFEST: &str = "-Digest-Manifest";
const DIGEST_MAIN_ATTRIBUTES: &str = "-Digest-Manifest-Main-Attributes";
const DIGEST: &str = "-Digest";

/// A parsed signature file
#[derive(Debug, Clone)]
pub struct SignatureFile {
    name: String,
    manifest: Manifest,
}

/// Outcome of checking every known digest attribute with one suffix
enum DigestCheck {
    /// No attribute with a known algorithm
    Absent,
    Match,
    Mismatch(DigestAlgorithm),
}

impl SignatureFile {
    pub fn parse(name: &str, bytes: Vec<u8>) -> Result<Self, SecurityFailure> {
        Ok(Self {
            name: name.to_string(),
            manifest: Manifest::parse(name, bytes)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw bytes, which the signature block signs
    pub fn bytes(&self) -> &[u8] {
        self.manifest.bytes()
    }

    /// Names of the entries this signature file covers in `manifest`
    pub fn signed_entries(&self, manifest: &Manifest) -> Result<Vec<String>, SecurityFailure> {
        let main = self.manifest.main();

        let whole_manifest = check_digests(main, DIGEST_MANIFEST, manifest.bytes());
        let manifest_signed = matches!(whole_manifest, DigestCheck::Match);

        if manifest_signed {
            debug!("{}: whole manifest digest matches", self.name);
        } else if let DigestCheck::Mismatch(_) =
            check_digests(main, DIGEST_MAIN_ATTRIBUTES, manifest.main_bytes())
        {
            return Err(SecurityFailure::MainAttributesDigestMismatch {
                signature_file: self.name.clone(),
            });
        }

        let mut entries = Vec::with_capacity(self.manifest.sections().len());
        for section in self.manifest.sections() {
            let Some(entry) = section.name() else {
                continue;
            };

            if manifest_signed {
                entries.push(entry.to_string());
                continue;
            }

            let section_bytes = manifest.section_bytes(entry).ok_or_else(|| {
                SecurityFailure::MissingManifestSection {
                    signature_file: self.name.clone(),
                    entry: entry.to_string(),
                }
            })?;

            match check_digests(section, DIGEST, section_bytes) {
                DigestCheck::Match => entries.push(entry.to_string()),
                DigestCheck::Mismatch(algorithm) => {
                    return Err(SecurityFailure::SectionDigestMismatch {
                        signature_file: self.name.clone(),
                        entry: entry.to_string(),
                        algorithm: algorithm.name().to_string(),
                    });
                }
                DigestCheck::Absent => {
                    warn!(
                        "{}: no supported digest for {}, treating it as unsigned",
                        self.name, entry
                    );
                }
            }
        }

        Ok(entries)
    }
}

/// Check every `<ALG><suffix>` attribute of `section` against `data`.
///
/// All recognised algorithms must match for the check to pass.
fn check_digests(section: &Section, suffix: &str, data: &[u8]) -> DigestCheck {
    let mut result = DigestCheck::Absent;
    for (key, value) in section.attributes() {
        let Some(algorithm) = DigestAlgorithm::from_attribute(key, suffix) else {
            continue;
        };
        if !matches_base64(value, &algorithm.digest(data)) {
            return DigestCheck::Mismatch(algorithm);
        }
        result = DigestCheck::Match;
    }
    result
}
