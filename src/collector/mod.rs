//! Archive-level signer collection
//!
//! Every content entry of an archive (anything that is neither a directory
//! nor under `META-INF/`) is read through the verifying reader, and the set
//! of signers covering it is compared against the first entry's set. The
//! archive's signers are that common set; any disagreement fails the whole
//! archive.

mod signer_set;

pub use signer_set::SignerSet;

use std::io::{Read, Seek};
use std::path::Path;

use log::debug;
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

use jarsig_verify::{ReadLimits, SignedJar};

use crate::config::CollectorConfig;
use crate::error::{CollectResult, SignerMismatchError};
use crate::identity::SignerIdentity;

/// Collects the signers common to every content entry of an archive
#[derive(Debug, Clone)]
pub struct JarSignatureCollector {
    limits: ReadLimits,
}

impl Default for JarSignatureCollector {
    /// Collector with the default configuration's limits
    fn default() -> Self {
        Self::new(&CollectorConfig::default())
    }
}

impl JarSignatureCollector {
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            limits: config.read_limits(),
        }
    }

    /// Signers of the archive at `path`, in order of first appearance.
    ///
    /// Empty when the archive has no content entries or none are signed.
    pub fn collect_signers(&self, path: &Path) -> CollectResult<Vec<SignerIdentity>> {
        debug!("collecting signers of {}", path.display());
        let jar = SignedJar::open(path)?.with_limits(self.limits);
        Ok(self.collect(jar)?.into_vec())
    }

    /// Signers of an archive held in memory or any other seekable source
    pub fn collect_from_reader<R: Read + Seek>(
        &self,
        reader: R,
    ) -> CollectResult<Vec<SignerIdentity>> {
        let jar = SignedJar::new(reader)?.with_limits(self.limits);
        Ok(self.collect(jar)?.into_vec())
    }

    /// Leaf public keys (SubjectPublicKeyInfo DER), ordered by key fingerprint
    pub fn collect_signing_keys(&self, path: &Path) -> CollectResult<Vec<Vec<u8>>> {
        let mut keys = self
            .collect_signers(path)?
            .iter()
            .map(SignerIdentity::public_key_der)
            .collect::<der::Result<Vec<_>>>()?;
        keys.sort_by_cached_key(|key| <[u8; 32]>::from(Sha256::digest(key)));
        Ok(keys)
    }

    /// Signers ordered by display name
    pub fn collect_signing_parties(&self, path: &Path) -> CollectResult<Vec<SignerIdentity>> {
        let mut signers = self.collect_signers(path)?;
        signers.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        Ok(signers)
    }

    /// Leaf certificates in collection order
    pub fn collect_certificates(&self, path: &Path) -> CollectResult<Vec<Certificate>> {
        Ok(self
            .collect_signers(path)?
            .iter()
            .map(|signer| signer.leaf().clone())
            .collect())
    }

    fn collect<R: Read + Seek>(&self, mut jar: SignedJar<R>) -> CollectResult<SignerSet> {
        let content: Vec<usize> = jar
            .entries()
            .iter()
            .filter(|entry| entry.is_content())
            .map(|entry| entry.index())
            .collect();

        // Signature blocks are never parsed when there is nothing to sign
        if content.is_empty() {
            debug!("no content entries");
            return Ok(SignerSet::new());
        }

        let mut candidate: Option<(String, SignerSet)> = None;
        for index in content {
            let entry = jar.read_entry(index)?;
            let signers: SignerSet = entry.signers.into_iter().collect();
            debug!("{}: {} signer(s)", entry.name, signers.len());

            if let Some((first_entry, first)) = &candidate {
                if *first != signers {
                    return Err(SignerMismatchError {
                        first_entry: first_entry.clone(),
                        first_signers: first.display_names(),
                        other_entry: entry.name,
                        other_signers: signers.display_names(),
                    }
                    .into());
                }
            } else {
                candidate = Some((entry.name, signers));
            }
        }

        Ok(candidate.map(|(_, signers)| signers).unwrap_or_default())
    }
}

/// [`JarSignatureCollector::collect_signers`] with the default configuration
pub fn collect_signers(path: &Path) -> CollectResult<Vec<SignerIdentity>> {
    JarSignatureCollector::new(&CollectorConfig::default()).collect_signers(path)
}
