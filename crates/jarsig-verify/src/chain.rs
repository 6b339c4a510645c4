//! Signer certificate chains and their display names

use std::fmt;

use const_oid::ObjectIdentifier;
use der::{Encode, Tag, Tagged};
use sha2::{Digest, Sha256};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::Name;
use x509_cert::Certificate;

/// Short names for the attribute types found in signer subjects
const SHORT_NAMES: &[(&str, &str)] = &[
    ("2.5.4.3", "CN"),
    ("2.5.4.5", "SERIALNUMBER"),
    ("2.5.4.6", "C"),
    ("2.5.4.7", "L"),
    ("2.5.4.8", "ST"),
    ("2.5.4.9", "STREET"),
    ("2.5.4.10", "O"),
    ("2.5.4.11", "OU"),
    ("0.9.2342.19200300.100.1.25", "DC"),
    ("1.2.840.113549.1.9.1", "EMAILADDRESS"),
];

/// Certificate chain of one signer, leaf first.
///
/// Two chains are equal only when every certificate encodes identically.
#[derive(Clone)]
pub struct CertificateChain {
    certificates: Vec<Certificate>,
    fingerprint: [u8; 32],
}

impl CertificateChain {
    /// Build a chain from leaf-first certificates; `None` when empty.
    pub fn new(certificates: Vec<Certificate>) -> der::Result<Option<Self>> {
        if certificates.is_empty() {
            return Ok(None);
        }
        let mut hasher = Sha256::new();
        for certificate in &certificates {
            hasher.update(certificate.to_der()?);
        }
        Ok(Some(Self {
            certificates,
            fingerprint: hasher.finalize().into(),
        }))
    }

    /// The signer's own certificate
    pub fn leaf(&self) -> &Certificate {
        &self.certificates[0]
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// SHA-256 over the concatenated DER encodings of the chain
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    /// Leaf subject, most specific attribute first
    pub fn display_name(&self) -> String {
        display_name(&self.leaf().tbs_certificate.subject)
    }
}

impl PartialEq for CertificateChain {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.certificates == other.certificates
    }
}

impl Eq for CertificateChain {}

impl fmt::Debug for CertificateChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateChain")
            .field("subject", &self.display_name())
            .field("length", &self.certificates.len())
            .finish()
    }
}

/// Render a distinguished name like `O=Alice Corp, L=Madrid, C=ES`.
///
/// RDNs are encoded least specific first, so they are printed in reverse.
pub fn display_name(name: &Name) -> String {
    name.0
        .iter()
        .rev()
        .map(|rdn| {
            rdn.0
                .iter()
                .map(display_attribute)
                .collect::<Vec<_>>()
                .join(" + ")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_attribute(attribute: &AttributeTypeAndValue) -> String {
    let key = short_name(&attribute.oid);
    let value = &attribute.value;
    let text = match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            std::str::from_utf8(value.value()).ok().map(str::to_string)
        }
        _ => None,
    };
    match text {
        Some(text) => format!("{key}={text}"),
        None => match value.to_der() {
            Ok(encoded) => format!("{key}=#{}", hex_upper(&encoded)),
            Err(_) => format!("{key}=#"),
        },
    }
}

fn short_name(oid: &ObjectIdentifier) -> String {
    let dotted = oid.to_string();
    SHORT_NAMES
        .iter()
        .find(|(known, _)| *known == dotted)
        .map(|(_, short)| short.to_string())
        .unwrap_or(dotted)
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
