//! Signing keys with self-signed certificates

use std::time::Duration;

use const_oid::ObjectIdentifier;
use der::asn1::{BitString, SetOfVec, Utf8StringRef};
use der::{Any, Decode, Encode};
use p256::ecdsa::signature::Signer;
use rand::RngCore;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};
use spki::{AlgorithmIdentifierOwned, EncodePublicKey, SubjectPublicKeyInfoOwned};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;
use x509_cert::Certificate;

use crate::error::{FixtureError, FixtureResult};

const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const OID_ECDSA_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

const RSA_KEY_BITS: usize = 2048;
const VALIDITY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Key algorithm, mirroring `keytool -keyalg`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    /// NIST P-256
    Ec,
}

enum SigningKey {
    Rsa(Box<RsaPrivateKey>),
    Ec(p256::ecdsa::SigningKey),
}

/// A keystore alias: signing key plus self-signed certificate
pub struct TestSigner {
    alias: String,
    key: SigningKey,
    certificate: Certificate,
}

impl TestSigner {
    /// Generate a key and a self-signed certificate for `dn`.
    ///
    /// `dn` lists attributes most specific first, e.g.
    /// `[("O", "Alice Corp"), ("L", "Madrid"), ("C", "ES")]`.
    pub fn generate(
        alias: &str,
        dn: &[(&str, &str)],
        algorithm: KeyAlgorithm,
    ) -> FixtureResult<Self> {
        let mut rng = rand::thread_rng();
        let (key, public_key_der) = match algorithm {
            KeyAlgorithm::Rsa => {
                let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)?;
                let der = private.to_public_key().to_public_key_der()?;
                (SigningKey::Rsa(Box::new(private)), der)
            }
            KeyAlgorithm::Ec => {
                let private = p256::ecdsa::SigningKey::random(&mut rng);
                let der = private.verifying_key().to_public_key_der()?;
                (SigningKey::Ec(private), der)
            }
        };

        let mut serial = [0u8; 8];
        rng.fill_bytes(&mut serial);
        serial[0] = (serial[0] & 0x7f) | 0x01;

        let subject = distinguished_name(dn)?;
        let signature_algorithm = key.signature_algorithm();
        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(&serial)?,
            signature: signature_algorithm.clone(),
            issuer: subject.clone(),
            validity: Validity::from_now(VALIDITY)?,
            subject,
            subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(
                public_key_der.as_bytes(),
            )?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: None,
        };
        let signature = key.sign(&tbs_certificate.to_der()?)?;

        Ok(Self {
            alias: alias.to_string(),
            key,
            certificate: Certificate {
                tbs_certificate,
                signature_algorithm,
                signature: BitString::from_bytes(&signature)?,
            },
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Signature block extension used by jarsigner for this key type
    pub fn block_extension(&self) -> &'static str {
        match self.key {
            SigningKey::Rsa(_) => "RSA",
            SigningKey::Ec(_) => "EC",
        }
    }

    /// SHA-256 based signature algorithm identifier for this key
    pub fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        self.key.signature_algorithm()
    }

    /// Sign `data` with SHA-256; ECDSA signatures are DER encoded.
    pub fn sign(&self, data: &[u8]) -> FixtureResult<Vec<u8>> {
        self.key.sign(data)
    }
}

impl SigningKey {
    fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        match self {
            SigningKey::Rsa(_) => AlgorithmIdentifierOwned {
                oid: OID_SHA256_WITH_RSA,
                parameters: Some(Any::null()),
            },
            SigningKey::Ec(_) => AlgorithmIdentifierOwned {
                oid: OID_ECDSA_WITH_SHA256,
                parameters: None,
            },
        }
    }

    fn sign(&self, data: &[u8]) -> FixtureResult<Vec<u8>> {
        match self {
            SigningKey::Rsa(key) => {
                let hashed = Sha256::digest(data);
                Ok(key.sign(Pkcs1v15Sign::new::<Sha256>(), &hashed)?)
            }
            SigningKey::Ec(key) => {
                let signature: p256::ecdsa::Signature = key.sign(data);
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

/// Build a name from most-specific-first attributes.
///
/// DER stores RDNs least specific first, so the list is encoded reversed.
fn distinguished_name(dn: &[(&str, &str)]) -> FixtureResult<Name> {
    let mut rdns = Vec::with_capacity(dn.len());
    for (key, value) in dn.iter().rev() {
        let oid = match key.to_ascii_uppercase().as_str() {
            "CN" => "2.5.4.3",
            "C" => "2.5.4.6",
            "L" => "2.5.4.7",
            "ST" => "2.5.4.8",
            "O" => "2.5.4.10",
            "OU" => "2.5.4.11",
            _ => return Err(FixtureError::UnknownAttribute(key.to_string())),
        };
        let attribute = AttributeTypeAndValue {
            oid: ObjectIdentifier::new_unwrap(oid),
            value: Any::encode_from(&Utf8StringRef::new(value)?)?,
        };
        rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![
            attribute,
        ])?));
    }
    Ok(RdnSequence(rdns))
}
