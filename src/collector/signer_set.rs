//! Insertion-ordered signer set

use std::collections::HashSet;

use jarsig_verify::CertificateChain;

use crate::identity::SignerIdentity;

/// Signers in order of first appearance, without duplicates.
///
/// Equality ignores order: `[A, B] == [B, A]`.
#[derive(Debug, Clone, Default)]
pub struct SignerSet {
    signers: Vec<SignerIdentity>,
    index: HashSet<[u8; 32]>,
}

impl SignerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `signer` unless it is already present; returns whether it was added.
    pub fn insert(&mut self, signer: SignerIdentity) -> bool {
        if !self.index.insert(*signer.fingerprint()) {
            return false;
        }
        self.signers.push(signer);
        true
    }

    pub fn contains(&self, signer: &SignerIdentity) -> bool {
        self.index.contains(signer.fingerprint())
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SignerIdentity> {
        self.signers.iter()
    }

    /// Display names in set order
    pub fn display_names(&self) -> Vec<String> {
        self.signers
            .iter()
            .map(|signer| signer.display_name().to_string())
            .collect()
    }

    pub fn into_vec(self) -> Vec<SignerIdentity> {
        self.signers
    }
}

impl PartialEq for SignerSet {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for SignerSet {}

impl FromIterator<CertificateChain> for SignerSet {
    fn from_iter<I: IntoIterator<Item = CertificateChain>>(chains: I) -> Self {
        let mut set = Self::new();
        for chain in chains {
            set.insert(SignerIdentity::new(chain));
        }
        set
    }
}

impl<'a> IntoIterator for &'a SignerSet {
    type Item = &'a SignerIdentity;
    type IntoIter = std::slice::Iter<'a, SignerIdentity>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
