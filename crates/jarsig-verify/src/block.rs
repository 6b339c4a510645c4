//! PKCS#7 signature blocks (`META-INF/*.RSA`, `*.DSA`, `*.EC`)
//!
//! A block is a CMS signed-data structure with detached content: the bytes
//! of the matching signature file. Every signer info must verify; each one
//! yields the signer's certificate chain built from the embedded
//! certificates.

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use const_oid::ObjectIdentifier;
use der::asn1::OctetString;
use der::{Decode, Encode};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use signature::hazmat::PrehashVerifier;
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::Certificate;

use crate::chain::CertificateChain;
use crate::digest::DigestAlgorithm;
use crate::error::SecurityFailure;

const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const OID_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");
const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// File extensions of signature blocks
pub const BLOCK_EXTENSIONS: [&str; 3] = ["RSA", "DSA", "EC"];

/// Verify the block `name` over `content` and return one chain per signer.
pub fn verify_block(
    name: &str,
    block: &[u8],
    signature_file: &str,
    content: &[u8],
) -> Result<Vec<CertificateChain>, SecurityFailure> {
    let invalid = |reason: String| SecurityFailure::InvalidSignatureBlock {
        block: name.to_string(),
        reason,
    };

    let content_info =
        ContentInfo::from_der(block).map_err(|e| invalid(format!("not a CMS structure: {e}")))?;
    if content_info.content_type != OID_SIGNED_DATA {
        return Err(invalid(format!(
            "content type {} is not signed-data",
            content_info.content_type
        )));
    }
    let signed_data: SignedData = content_info
        .content
        .decode_as()
        .map_err(|e| invalid(format!("malformed signed-data: {e}")))?;

    let certificates: Vec<&Certificate> = signed_data
        .certificates
        .iter()
        .flat_map(|set| set.0.iter())
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(certificate) => Some(certificate),
            _ => None,
        })
        .collect();

    let mut chains = Vec::new();
    for signer_info in signed_data.signer_infos.0.iter() {
        let leaf = find_signer_certificate(&signer_info.sid, &certificates).ok_or_else(|| {
            SecurityFailure::SignerCertificateMissing {
                block: name.to_string(),
            }
        })?;

        verify_signer_info(name, signature_file, signer_info, leaf, content)?;

        let chain = CertificateChain::new(build_chain(leaf, &certificates))
            .map_err(|e| invalid(format!("cannot encode certificate: {e}")))?
            .ok_or_else(|| invalid("empty certificate chain".to_string()))?;
        if !chains.contains(&chain) {
            chains.push(chain);
        }
    }

    if chains.is_empty() {
        return Err(invalid("no signer infos".to_string()));
    }
    Ok(chains)
}

fn verify_signer_info(
    block: &str,
    signature_file: &str,
    signer_info: &SignerInfo,
    leaf: &Certificate,
    content: &[u8],
) -> Result<(), SecurityFailure> {
    let digest_algorithm =
        DigestAlgorithm::from_oid(&signer_info.digest_alg.oid).ok_or_else(|| {
            SecurityFailure::UnsupportedAlgorithm {
                block: block.to_string(),
                kind: "digest algorithm",
                oid: signer_info.digest_alg.oid.to_string(),
            }
        })?;

    let bad_signature = || SecurityFailure::BadSignature {
        block: block.to_string(),
        signature_file: signature_file.to_string(),
    };

    // With signed attributes the signature covers their DER SET OF encoding
    let signed_bytes = match &signer_info.signed_attrs {
        Some(attributes) => {
            let message_digest = attributes
                .iter()
                .find(|attribute| attribute.oid == OID_MESSAGE_DIGEST)
                .and_then(|attribute| attribute.values.iter().next())
                .and_then(|value| value.decode_as::<OctetString>().ok())
                .ok_or_else(|| SecurityFailure::InvalidSignatureBlock {
                    block: block.to_string(),
                    reason: "signed attributes lack a message digest".to_string(),
                })?;
            if message_digest.as_bytes() != digest_algorithm.digest(content).as_slice() {
                return Err(bad_signature());
            }
            attributes
                .to_der()
                .map_err(|e| SecurityFailure::InvalidSignatureBlock {
                    block: block.to_string(),
                    reason: format!("cannot encode signed attributes: {e}"),
                })?
        }
        None => content.to_vec(),
    };

    let hashed = digest_algorithm.digest(&signed_bytes);
    let signature = signer_info.signature.as_bytes();
    let spki = &leaf.tbs_certificate.subject_public_key_info;
    let spki_der = spki
        .to_der()
        .map_err(|e| SecurityFailure::InvalidSignatureBlock {
            block: block.to_string(),
            reason: format!("cannot encode signer key: {e}"),
        })?;

    let key_algorithm = spki.algorithm.oid;
    let verified = if key_algorithm == OID_RSA_ENCRYPTION {
        verify_rsa(&spki_der, digest_algorithm, &hashed, signature)
    } else if key_algorithm == OID_EC_PUBLIC_KEY {
        let curve = spki
            .algorithm
            .parameters
            .as_ref()
            .and_then(|params| params.decode_as::<ObjectIdentifier>().ok());
        match curve {
            Some(oid) if oid == OID_SECP256R1 => verify_p256(&spki_der, &hashed, signature),
            Some(oid) if oid == OID_SECP384R1 => verify_p384(&spki_der, &hashed, signature),
            other => {
                return Err(SecurityFailure::UnsupportedAlgorithm {
                    block: block.to_string(),
                    kind: "elliptic curve",
                    oid: other.map(|oid| oid.to_string()).unwrap_or_default(),
                })
            }
        }
    } else {
        return Err(SecurityFailure::UnsupportedAlgorithm {
            block: block.to_string(),
            kind: "key algorithm",
            oid: key_algorithm.to_string(),
        });
    };

    if verified {
        Ok(())
    } else {
        Err(bad_signature())
    }
}

fn verify_rsa(
    spki_der: &[u8],
    digest_algorithm: DigestAlgorithm,
    hashed: &[u8],
    signature: &[u8],
) -> bool {
    let Ok(key) = RsaPublicKey::from_public_key_der(spki_der) else {
        return false;
    };
    let scheme = match digest_algorithm {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    };
    key.verify(scheme, hashed, signature).is_ok()
}

fn verify_p256(spki_der: &[u8], hashed: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) else {
        return false;
    };
    let Ok(signature) = p256::ecdsa::Signature::from_der(signature) else {
        return false;
    };
    key.verify_prehash(hashed, &signature).is_ok()
}

fn verify_p384(spki_der: &[u8], hashed: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = p384::ecdsa::VerifyingKey::from_public_key_der(spki_der) else {
        return false;
    };
    let Ok(signature) = p384::ecdsa::Signature::from_der(signature) else {
        return false;
    };
    key.verify_prehash(hashed, &signature).is_ok()
}

fn find_signer_certificate<'a>(
    sid: &SignerIdentifier,
    certificates: &[&'a Certificate],
) -> Option<&'a Certificate> {
    certificates.iter().copied().find(|certificate| {
        let tbs = &certificate.tbs_certificate;
        match sid {
            SignerIdentifier::IssuerAndSerialNumber(issuer_serial) => {
                tbs.issuer == issuer_serial.issuer && tbs.serial_number == issuer_serial.serial_number
            }
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                subject_key_identifier(certificate).as_ref() == Some(ski)
            }
        }
    })
}

fn subject_key_identifier(certificate: &Certificate) -> Option<SubjectKeyIdentifier> {
    certificate
        .tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|extension| extension.extn_id == OID_SUBJECT_KEY_IDENTIFIER)
        .and_then(|extension| SubjectKeyIdentifier::from_der(extension.extn_value.as_bytes()).ok())
}

/// Walk issuer links from the leaf through the embedded certificates.
fn build_chain(leaf: &Certificate, certificates: &[&Certificate]) -> Vec<Certificate> {
    let mut chain = vec![leaf.clone()];
    loop {
        let current = &chain[chain.len() - 1].tbs_certificate;
        if current.issuer == current.subject {
            break;
        }
        let issuer = certificates.iter().find(|candidate| {
            candidate.tbs_certificate.subject == current.issuer
                && !chain.iter().any(|seen| seen == **candidate)
        });
        match issuer {
            Some(issuer) => chain.push((*issuer).clone()),
            None => break,
        }
    }
    chain
}
