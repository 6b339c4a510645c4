//! Signer collection tests
//!
//! Archives are built with the test kit the way `jar` and `jarsigner` would
//! build them, then collected end to end.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use der::{Decode, Encode};
use jarsig::{
    collect_signers, CollectError, CollectorConfig, JarError, JarSignatureCollector,
    SecurityFailure,
};
use jarsig_testkit::{
    corrupt_payload, create_jar, sign_jar, update_jar, FixtureEntry, KeyAlgorithm, TestSigner,
};
use sha2::{Digest, Sha256};
use spki::SubjectPublicKeyInfoRef;
use tempfile::TempDir;

const ALICE_NAME: &str = "O=Alice Corp, L=Madrid, C=ES";
const BOB_NAME: &str = "O=Bob Plc, L=Rome, C=IT";
const CHARLIE_NAME: &str = "O=Charlie Ltd, L=Athens, C=GR";

fn alice() -> &'static TestSigner {
    static SIGNER: OnceLock<TestSigner> = OnceLock::new();
    SIGNER.get_or_init(|| {
        TestSigner::generate(
            "alice",
            &[("O", "Alice Corp"), ("L", "Madrid"), ("C", "ES")],
            KeyAlgorithm::Rsa,
        )
        .unwrap()
    })
}

fn bob() -> &'static TestSigner {
    static SIGNER: OnceLock<TestSigner> = OnceLock::new();
    SIGNER.get_or_init(|| {
        TestSigner::generate(
            "bob",
            &[("O", "Bob Plc"), ("L", "Rome"), ("C", "IT")],
            KeyAlgorithm::Rsa,
        )
        .unwrap()
    })
}

fn charlie() -> &'static TestSigner {
    static SIGNER: OnceLock<TestSigner> = OnceLock::new();
    SIGNER.get_or_init(|| {
        TestSigner::generate(
            "Charlie",
            &[("O", "Charlie Ltd"), ("L", "Athens"), ("C", "GR")],
            KeyAlgorithm::Ec,
        )
        .unwrap()
    })
}

fn signable(n: u32) -> FixtureEntry {
    FixtureEntry::file(&format!("_signable{n}"), format!("signable{n}\n").as_bytes())
}

fn jar_path(dir: &TempDir) -> PathBuf {
    dir.path().join("attachment.jar")
}

fn names(jar: &Path) -> Vec<String> {
    collect_signers(jar)
        .unwrap()
        .iter()
        .map(|signer| signer.display_name().to_string())
        .collect()
}

fn leaf_key(signer: &TestSigner) -> Vec<u8> {
    signer
        .certificate()
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .unwrap()
}

// =============================================================================
// Empty and Unsigned Archives
// =============================================================================

#[test]
fn test_empty_jar_has_no_signers() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[FixtureEntry::dir("META-INF")]).unwrap();
    assert!(collect_signers(&jar).unwrap().is_empty());

    // There has to be a content entry for a signature to cover
    sign_jar(&jar, alice()).unwrap();
    assert!(collect_signers(&jar).unwrap().is_empty());
}

#[test]
fn test_unsigned_jar_has_no_signers() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1)]).unwrap();
    assert!(collect_signers(&jar).unwrap().is_empty());

    update_jar(&jar, &[signable(2)]).unwrap();
    assert!(collect_signers(&jar).unwrap().is_empty());
}

#[test]
fn test_metadata_entries_are_not_content() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(
        &jar,
        &[FixtureEntry::file("META-INF/services/com.example.Plugin", b"impl\n")],
    )
    .unwrap();
    sign_jar(&jar, alice()).unwrap();

    assert!(collect_signers(&jar).unwrap().is_empty());
}

// =============================================================================
// Consistent Signers
// =============================================================================

#[test]
fn test_one_signer() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1), signable(2)]).unwrap();
    sign_jar(&jar, alice()).unwrap();

    let signers = collect_signers(&jar).unwrap();
    assert_eq!(signers.len(), 1);
    assert_eq!(signers[0].display_name(), ALICE_NAME);
    assert_eq!(signers[0].leaf(), alice().certificate());
    assert_eq!(signers[0].public_key_der().unwrap(), leaf_key(alice()));

    // Unsigned directory is irrelevant
    update_jar(&jar, &[FixtureEntry::dir("my-dir")]).unwrap();
    assert_eq!(names(&jar), vec![ALICE_NAME]);
}

#[test]
fn test_two_signers() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1), signable(2)]).unwrap();
    sign_jar(&jar, alice()).unwrap();
    sign_jar(&jar, bob()).unwrap();

    let mut signers = names(&jar);
    signers.sort();
    assert_eq!(signers, vec![ALICE_NAME, BOB_NAME]);
}

#[test]
fn test_signers_in_signature_order() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1)]).unwrap();
    sign_jar(&jar, bob()).unwrap();
    sign_jar(&jar, alice()).unwrap();

    assert_eq!(names(&jar), vec![BOB_NAME, ALICE_NAME]);
}

#[test]
fn test_one_signer_with_ec_key() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1), signable(2)]).unwrap();
    sign_jar(&jar, charlie()).unwrap();
    assert_eq!(names(&jar), vec![CHARLIE_NAME]);

    update_jar(&jar, &[FixtureEntry::dir("my-dir")]).unwrap();
    assert_eq!(names(&jar), vec![CHARLIE_NAME]);
}

#[test]
fn test_resigning_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1), signable(2)]).unwrap();
    sign_jar(&jar, alice()).unwrap();
    sign_jar(&jar, alice()).unwrap();

    assert_eq!(names(&jar), vec![ALICE_NAME]);
}

// =============================================================================
// Signer Mismatch
// =============================================================================

#[test]
fn test_all_files_must_be_signed_by_the_same_signers() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1)]).unwrap();
    sign_jar(&jar, alice()).unwrap();
    assert_eq!(names(&jar), vec![ALICE_NAME]);

    update_jar(&jar, &[signable(2)]).unwrap();
    sign_jar(&jar, bob()).unwrap();

    let err = collect_signers(&jar).unwrap_err();
    let CollectError::SignerMismatch(mismatch) = &err else {
        panic!("expected a signer mismatch, got {err:?}");
    };
    assert_eq!(mismatch.first_entry, "_signable1");
    assert_eq!(mismatch.other_entry, "_signable2");
    assert_eq!(
        err.to_string(),
        "Mismatch between signers [O=Alice Corp, L=Madrid, C=ES, O=Bob Plc, L=Rome, C=IT] \
         for file _signable1 and signers [O=Bob Plc, L=Rome, C=IT] for file _signable2"
    );
    assert!(!err.is_security_failure());
}

#[test]
fn test_unsigned_entry_added_after_signing() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1)]).unwrap();
    sign_jar(&jar, alice()).unwrap();
    update_jar(&jar, &[signable(3)]).unwrap();

    let err = collect_signers(&jar).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Mismatch between signers [O=Alice Corp, L=Madrid, C=ES] for file _signable1 \
         and signers [] for file _signable3"
    );
}

// =============================================================================
// Security Failures
// =============================================================================

#[test]
fn test_bad_signature_is_caught_even_if_the_party_would_not_qualify() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[FixtureEntry::file("volatile", b"volatile\n")]).unwrap();
    sign_jar(&jar, alice()).unwrap();
    assert_eq!(names(&jar), vec![ALICE_NAME]);

    // Alice's signature on volatile is now bad, even though Bob signs it all
    update_jar(
        &jar,
        &[FixtureEntry::file("volatile", b"garbage\n"), signable(1)],
    )
    .unwrap();
    sign_jar(&jar, bob()).unwrap();

    let err = collect_signers(&jar).unwrap_err();
    assert!(err.is_security_failure());
    assert!(matches!(
        err,
        CollectError::Archive(JarError::Security(
            SecurityFailure::SectionDigestMismatch { ref entry, .. }
        )) if entry == "volatile"
    ));
}

#[test]
fn test_tampered_entry_fails_digest_check() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1), signable(2)]).unwrap();
    sign_jar(&jar, charlie()).unwrap();
    update_jar(&jar, &[FixtureEntry::file("_signable2", b"tampered\n")]).unwrap();

    let err = collect_signers(&jar).unwrap_err();
    assert!(err.is_security_failure());
    assert_eq!(
        err.to_string(),
        "security failure: SHA-256 digest error for _signable2"
    );
}

#[test]
fn test_corrupted_payload_is_a_format_failure() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(
        &jar,
        &[FixtureEntry::file("payload.bin", b"payload bytes to corrupt")],
    )
    .unwrap();
    corrupt_payload(&jar, b"bytes to corrupt").unwrap();

    let err = collect_signers(&jar).unwrap_err();
    assert!(err.is_security_failure());
    assert!(matches!(
        err,
        CollectError::Archive(JarError::Corrupt { ref entry, .. }) if entry == "payload.bin"
    ));
}

#[test]
fn test_not_an_archive() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    std::fs::write(&jar, b"PK but not really").unwrap();

    let err = collect_signers(&jar).unwrap_err();
    assert!(err.is_security_failure());
}

// =============================================================================
// Projections
// =============================================================================

#[test]
fn test_signing_keys_sorted_by_fingerprint() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1), signable(2)]).unwrap();
    sign_jar(&jar, alice()).unwrap();
    sign_jar(&jar, charlie()).unwrap();

    let keys = JarSignatureCollector::default()
        .collect_signing_keys(&jar)
        .unwrap();

    let mut expected = vec![leaf_key(alice()), leaf_key(charlie())];
    expected.sort_by_key(|key| <[u8; 32]>::from(Sha256::digest(key)));
    assert_eq!(keys, expected);
    for key in &keys {
        assert!(SubjectPublicKeyInfoRef::from_der(key).is_ok());
    }
}

#[test]
fn test_signing_parties_sorted_by_name() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1)]).unwrap();
    sign_jar(&jar, charlie()).unwrap();
    sign_jar(&jar, bob()).unwrap();
    sign_jar(&jar, alice()).unwrap();

    let parties: Vec<String> = JarSignatureCollector::default()
        .collect_signing_parties(&jar)
        .unwrap()
        .iter()
        .map(|party| party.display_name().to_string())
        .collect();
    assert_eq!(parties, vec![ALICE_NAME, BOB_NAME, CHARLIE_NAME]);
}

#[test]
fn test_certificates_in_collection_order() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1)]).unwrap();
    sign_jar(&jar, bob()).unwrap();
    sign_jar(&jar, alice()).unwrap();

    let certificates = JarSignatureCollector::default()
        .collect_certificates(&jar)
        .unwrap();
    assert_eq!(
        certificates,
        vec![bob().certificate().clone(), alice().certificate().clone()]
    );
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_metadata_limit_covers_signature_data() {
    let dir = TempDir::new().unwrap();
    let jar = jar_path(&dir);
    create_jar(&jar, &[signable(1)]).unwrap();
    sign_jar(&jar, alice()).unwrap();

    let config = CollectorConfig::from_toml_str(
        "[limits]\nmax_entry_bytes = 1024\nmax_metadata_bytes = 64",
    )
    .unwrap();
    let err = JarSignatureCollector::new(&config)
        .collect_signers(&jar)
        .unwrap_err();
    assert!(matches!(
        err,
        CollectError::Archive(JarError::EntryTooLarge { limit: 64, .. })
    ));
}
