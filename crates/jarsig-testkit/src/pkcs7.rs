//! Detached PKCS#7 signed-data, as jarsigner writes into `*.RSA` / `*.EC`

use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo,
    SignerInfos,
};
use const_oid::ObjectIdentifier;
use der::asn1::{OctetString, SetOfVec};
use der::{Any, Encode};
use sha2::{Digest, Sha256};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;

use crate::error::FixtureResult;
use crate::keys::TestSigner;

const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const OID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
const OID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// Sign `content` without signed attributes (jarsigner's default)
pub fn sign_detached(signer: &TestSigner, content: &[u8]) -> FixtureResult<Vec<u8>> {
    let signature = signer.sign(content)?;
    encode_signed_data(signer, None, signature)
}

/// Sign `content` through content-type and message-digest signed attributes
pub fn sign_detached_with_signed_attributes(
    signer: &TestSigner,
    content: &[u8],
) -> FixtureResult<Vec<u8>> {
    let content_type = Attribute {
        oid: OID_CONTENT_TYPE,
        values: SetOfVec::try_from(vec![Any::encode_from(&OID_DATA)?])?,
    };
    let message_digest = Attribute {
        oid: OID_MESSAGE_DIGEST,
        values: SetOfVec::try_from(vec![Any::encode_from(&OctetString::new(
            Sha256::digest(content).to_vec(),
        )?)?])?,
    };
    let attributes = SetOfVec::try_from(vec![content_type, message_digest])?;
    let signature = signer.sign(&attributes.to_der()?)?;
    encode_signed_data(signer, Some(attributes), signature)
}

fn encode_signed_data(
    signer: &TestSigner,
    signed_attrs: Option<SetOfVec<Attribute>>,
    signature: Vec<u8>,
) -> FixtureResult<Vec<u8>> {
    let certificate = signer.certificate();
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: OID_SHA256,
        parameters: None,
    };

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: certificate.tbs_certificate.issuer.clone(),
            serial_number: certificate.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: digest_algorithm.clone(),
        signed_attrs,
        signature_algorithm: signer.signature_algorithm(),
        signature: OctetString::new(signature)?,
        unsigned_attrs: None,
    };

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![digest_algorithm])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: OID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(vec![
            CertificateChoices::Certificate(certificate.clone()),
        ])?)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };

    let content_info = ContentInfo {
        content_type: OID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    Ok(content_info.to_der()?)
}
