//! Digest algorithms used by manifests, signature files and signature blocks.

use base64::Engine;
use const_oid::ObjectIdentifier;
use sha1::Sha1;
use sha2::digest::DynDigest;
use sha2::{Digest, Sha256, Sha384, Sha512};

const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const OID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
const OID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

/// A digest algorithm recognised in JAR signature metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Canonical name, as written in `<name>-Digest` attributes.
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Parse the algorithm part of a digest attribute name; `SHA1` and
    /// `SHA-1` are both accepted, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA1" | "SHA-1" => Some(DigestAlgorithm::Sha1),
            "SHA-256" | "SHA256" => Some(DigestAlgorithm::Sha256),
            "SHA-384" | "SHA384" => Some(DigestAlgorithm::Sha384),
            "SHA-512" | "SHA512" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    pub const ALL: [DigestAlgorithm; 4] = [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ];

    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.oid() == *oid)
    }

    pub fn oid(self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => OID_SHA1,
            DigestAlgorithm::Sha256 => OID_SHA256,
            DigestAlgorithm::Sha384 => OID_SHA384,
            DigestAlgorithm::Sha512 => OID_SHA512,
        }
    }

    /// Split an attribute name of the form `<ALG><suffix>` and return the
    /// algorithm, e.g. `SHA-256-Digest-Manifest` with suffix
    /// `-Digest-Manifest`.
    pub fn from_attribute(attribute: &str, suffix: &str) -> Option<Self> {
        let attribute_len = attribute.len();
        if attribute_len <= suffix.len() {
            return None;
        }
        let split = attribute_len - suffix.len();
        if !attribute.is_char_boundary(split) || !attribute[split..].eq_ignore_ascii_case(suffix)
        {
            return None;
        }
        Self::from_name(&attribute[..split])
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// Incremental hasher for streaming entry payloads
    pub fn hasher(self) -> Box<dyn DynDigest> {
        match self {
            DigestAlgorithm::Sha1 => Box::new(Sha1::new()),
            DigestAlgorithm::Sha256 => Box::new(Sha256::new()),
            DigestAlgorithm::Sha384 => Box::new(Sha384::new()),
            DigestAlgorithm::Sha512 => Box::new(Sha512::new()),
        }
    }
}

/// Compare a base64 digest attribute value against computed bytes.
///
/// Undecodable values never match.
pub fn matches_base64(expected: &str, actual: &[u8]) -> bool {
    match base64::engine::general_purpose::STANDARD.decode(expected.trim()) {
        Ok(decoded) => decoded == actual,
        Err(_) => false,
    }
}
