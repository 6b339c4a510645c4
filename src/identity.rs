//! Signer identities reported by the collector

use std::fmt;

use der::Encode;
use jarsig_verify::CertificateChain;
use x509_cert::Certificate;

/// A verified signer: its certificate chain plus the leaf subject name.
///
/// Identities compare by chain, so two signers with the same subject but
/// different keys are distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerIdentity {
    chain: CertificateChain,
    display_name: String,
}

impl SignerIdentity {
    pub fn new(chain: CertificateChain) -> Self {
        let display_name = chain.display_name();
        Self {
            chain,
            display_name,
        }
    }

    /// Leaf subject, e.g. `O=Alice Corp, L=Madrid, C=ES`
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn chain(&self) -> &CertificateChain {
        &self.chain
    }

    pub fn leaf(&self) -> &Certificate {
        self.chain.leaf()
    }

    /// DER-encoded SubjectPublicKeyInfo of the leaf certificate
    pub fn public_key_der(&self) -> der::Result<Vec<u8>> {
        self.leaf()
            .tbs_certificate
            .subject_public_key_info
            .to_der()
    }

    /// Chain fingerprint, the identity's membership key
    pub fn fingerprint(&self) -> &[u8; 32] {
        self.chain.fingerprint()
    }
}

impl fmt::Display for SignerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}
