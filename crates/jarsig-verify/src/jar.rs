//! Signed archive reader
//!
//! Opening a [`SignedJar`] only reads the central directory. The signature
//! files and blocks under `META-INF/` are verified on the first call to
//! [`SignedJar::read_entry`], so archives whose entries are never read never
//! pay for signature processing. Any invalid signature file or block fails
//! that read and every later one.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use log::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::block::{verify_block, BLOCK_EXTENSIONS};
use crate::chain::CertificateChain;
use crate::digest::{matches_base64, DigestAlgorithm};
use crate::error::{JarError, JarResult, SecurityFailure};
use crate::manifest::Manifest;
use crate::signature_file::SignatureFile;
use crate::{is_metadata_entry, MANIFEST_NAME, METADATA_DIR};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Size limits applied while reading entries (0 = unlimited)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadLimits {
    /// Largest content entry payload
    pub max_entry_bytes: u64,
    /// Largest manifest, signature file or signature block
    pub max_metadata_bytes: u64,
}

/// Central directory information for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    index: usize,
    name: String,
    is_dir: bool,
}

impl EntryInfo {
    /// Position in the central directory
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Whether the entry lives under `META-INF/`
    pub fn is_metadata(&self) -> bool {
        is_metadata_entry(&self.name)
    }

    /// Payload-bearing entry that signatures must cover
    pub fn is_content(&self) -> bool {
        !self.is_dir && !self.is_metadata()
    }
}

/// An entry that has been read fully and checked against its digests
#[derive(Debug, Clone)]
pub struct VerifiedEntry {
    pub name: String,
    pub size: u64,
    /// Chains whose signatures cover this entry, in signature block order
    pub signers: Vec<CertificateChain>,
}

/// Verified signature state of the whole archive
#[derive(Debug, Default)]
struct Signatures {
    manifest: Option<Manifest>,
    signers: Vec<CertificateChain>,
    entry_signers: HashMap<String, Vec<usize>>,
}

/// A JAR opened for verified reading
pub struct SignedJar<R> {
    archive: ZipArchive<R>,
    entries: Vec<EntryInfo>,
    limits: ReadLimits,
    signatures: Option<Signatures>,
}

impl SignedJar<File> {
    /// Open the archive at `path`
    pub fn open(path: &Path) -> JarResult<Self> {
        let file = File::open(path)?;
        Self::new(file)
    }
}

impl<R: Read + Seek> SignedJar<R> {
    /// Read the central directory of `reader`
    pub fn new(reader: R) -> JarResult<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            entries.push(EntryInfo {
                index,
                name: file.name().to_string(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self {
            archive,
            entries,
            limits: ReadLimits::default(),
            signatures: None,
        })
    }

    /// Set size limits for subsequent reads
    pub fn with_limits(mut self, limits: ReadLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Entries in central directory order
    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    /// Read entry `index` fully, verify its digests and return its signers.
    pub fn read_entry(&mut self, index: usize) -> JarResult<VerifiedEntry> {
        if index >= self.entries.len() {
            return Err(JarError::Zip(ZipError::FileNotFound));
        }
        let signatures = match self.signatures.take() {
            Some(signatures) => signatures,
            None => self.load_signatures()?,
        };
        let result = read_verified(
            &mut self.archive,
            &self.entries[index],
            &signatures,
            self.limits.max_entry_bytes,
        );
        self.signatures = Some(signatures);
        result
    }

    /// Verify every signature file and block in the archive.
    fn load_signatures(&mut self) -> JarResult<Signatures> {
        // The manifest only matters once a block has its signature file
        let blocks = self.signed_blocks();
        if blocks.is_empty() {
            debug!("no signature blocks, archive is unsigned");
            return Ok(Signatures::default());
        }
        let Some(manifest_index) = self.find_entry(MANIFEST_NAME) else {
            debug!("no manifest, archive is unsigned");
            return Ok(Signatures::default());
        };
        let manifest_bytes = self.read_metadata(manifest_index)?;
        let manifest = Manifest::parse(&self.entries[manifest_index].name, manifest_bytes)?;

        let mut signatures = Signatures::default();
        for (block_index, sf_index) in blocks {
            let block_name = self.entries[block_index].name.clone();
            let sf_bytes = self.read_metadata(sf_index)?;
            let signature_file = SignatureFile::parse(&self.entries[sf_index].name, sf_bytes)?;
            let block_bytes = self.read_metadata(block_index)?;

            let chains = verify_block(
                &block_name,
                &block_bytes,
                signature_file.name(),
                signature_file.bytes(),
            )?;
            let signed_entries = signature_file.signed_entries(&manifest)?;
            debug!(
                "{}: {} chain(s) over {} entries",
                signature_file.name(),
                chains.len(),
                signed_entries.len()
            );

            for chain in chains {
                let signer = match signatures.signers.iter().position(|known| *known == chain) {
                    Some(position) => position,
                    None => {
                        signatures.signers.push(chain);
                        signatures.signers.len() - 1
                    }
                };
                for entry in &signed_entries {
                    let indices = signatures.entry_signers.entry(entry.clone()).or_default();
                    if !indices.contains(&signer) {
                        indices.push(signer);
                    }
                }
            }
        }

        signatures.manifest = Some(manifest);
        Ok(signatures)
    }

    /// Signature blocks paired with their `.SF` entry, in container order
    fn signed_blocks(&self) -> Vec<(usize, usize)> {
        self.entries
            .iter()
            .filter(|entry| is_signature_block(&entry.name))
            .filter_map(|entry| {
                let (stem, _) = entry.name.rsplit_once('.')?;
                match self.find_entry(&format!("{stem}.SF")) {
                    Some(sf_index) => Some((entry.index, sf_index)),
                    None => {
                        warn!("{}: no matching signature file, ignoring block", entry.name);
                        None
                    }
                }
            })
            .collect()
    }

    /// Case-insensitive lookup of an entry by name
    fn find_entry(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.index)
    }

    fn read_metadata(&mut self, index: usize) -> JarResult<Vec<u8>> {
        let limit = self.limits.max_metadata_bytes;
        let name = &self.entries[index].name;
        let mut file = self.archive.by_index(index)?;
        let mut bytes = Vec::new();
        let read = if limit > 0 {
            file.by_ref().take(limit + 1).read_to_end(&mut bytes)
        } else {
            file.read_to_end(&mut bytes)
        };
        read.map_err(|source| JarError::Corrupt {
            entry: name.clone(),
            source,
        })?;
        if limit > 0 && bytes.len() as u64 > limit {
            return Err(JarError::EntryTooLarge {
                entry: name.clone(),
                limit,
            });
        }
        Ok(bytes)
    }
}

/// Stream one entry through the digests its manifest section expects.
fn read_verified<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    entry: &EntryInfo,
    signatures: &Signatures,
    limit: u64,
) -> JarResult<VerifiedEntry> {
    let name = entry.name.clone();
    let signer_indices = signatures
        .entry_signers
        .get(&name)
        .map(Vec::as_slice)
        .unwrap_or_default();

    // Only signed entries are held to their manifest digests
    let expected: Vec<(DigestAlgorithm, &str)> = match &signatures.manifest {
        Some(manifest) if !signer_indices.is_empty() => manifest
            .section(&name)
            .map(|section| {
                section
                    .attributes()
                    .filter_map(|(key, value)| {
                        DigestAlgorithm::from_attribute(key, "-Digest")
                            .map(|algorithm| (algorithm, value))
                    })
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    let mut hashers: Vec<_> = expected
        .iter()
        .map(|(algorithm, _)| algorithm.hasher())
        .collect();

    let mut file = archive.by_index(entry.index)?;
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut size: u64 = 0;
    loop {
        let read = file.read(&mut buffer).map_err(|source| JarError::Corrupt {
            entry: name.clone(),
            source,
        })?;
        if read == 0 {
            break;
        }
        size += read as u64;
        if limit > 0 && size > limit {
            return Err(JarError::EntryTooLarge { entry: name, limit });
        }
        for hasher in hashers.iter_mut() {
            hasher.update(&buffer[..read]);
        }
    }
    drop(file);

    for ((algorithm, value), hasher) in expected.iter().zip(hashers) {
        if !matches_base64(value, &hasher.finalize()) {
            return Err(SecurityFailure::EntryDigestMismatch {
                entry: name,
                algorithm: algorithm.name().to_string(),
            }
            .into());
        }
    }

    let signers = if !signer_indices.is_empty() && expected.is_empty() {
        warn!("{name}: signed but no supported manifest digest, treating it as unsigned");
        Vec::new()
    } else {
        signer_indices
            .iter()
            .map(|&signer| signatures.signers[signer].clone())
            .collect()
    };

    debug!("{name}: {size} bytes, {} signer(s)", signers.len());
    Ok(VerifiedEntry {
        name,
        size,
        signers,
    })
}

/// `META-INF/<alias>.RSA|.DSA|.EC`, directly under the metadata directory
fn is_signature_block(name: &str) -> bool {
    if !is_metadata_entry(name) {
        return false;
    }
    let file_name = &name[METADATA_DIR.len()..];
    if file_name.contains('/') {
        return false;
    }
    match file_name.rsplit_once('.') {
        Some((stem, extension)) => {
            !stem.is_empty()
                && BLOCK_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(extension))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jarsig_testkit::{create_jar, sign_jar, update_jar, FixtureEntry, KeyAlgorithm, TestSigner};
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn signer() -> TestSigner {
        TestSigner::generate("charlie", &[("O", "Charlie Ltd"), ("C", "GB")], KeyAlgorithm::Ec)
            .unwrap()
    }

    /// Archive written entry by entry, bypassing the fixture manifest writer
    fn raw_jar(entries: &[(&str, &[u8])]) -> SignedJar<Cursor<Vec<u8>>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        SignedJar::new(writer.finish().unwrap()).unwrap()
    }

    fn read_named<R: Read + Seek>(jar: &mut SignedJar<R>, name: &str) -> JarResult<VerifiedEntry> {
        let index = jar
            .entries()
            .iter()
            .find(|entry| entry.name() == name)
            .unwrap()
            .index();
        jar.read_entry(index)
    }

    #[test]
    fn test_is_signature_block() {
        assert!(is_signature_block("META-INF/ALICE.RSA"));
        assert!(is_signature_block("meta-inf/alice.ec"));
        assert!(is_signature_block("META-INF/BOB.DSA"));
        assert!(!is_signature_block("META-INF/ALICE.SF"));
        assert!(!is_signature_block("META-INF/nested/ALICE.RSA"));
        assert!(!is_signature_block("META-INF/.RSA"));
        assert!(!is_signature_block("lib/ALICE.RSA"));
    }

    #[test]
    fn test_entries_in_container_order() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("order.jar");
        create_jar(
            &jar,
            &[
                FixtureEntry::file("b.txt", b"b"),
                FixtureEntry::dir("lib/"),
                FixtureEntry::file("a.txt", b"a"),
            ],
        )
        .unwrap();

        let signed = SignedJar::open(&jar).unwrap();
        let names: Vec<&str> = signed.entries().iter().map(EntryInfo::name).collect();
        assert_eq!(names, vec!["META-INF/MANIFEST.MF", "b.txt", "lib/", "a.txt"]);

        let content: Vec<&str> = signed
            .entries()
            .iter()
            .filter(|entry| entry.is_content())
            .map(EntryInfo::name)
            .collect();
        assert_eq!(content, vec!["b.txt", "a.txt"]);
    }

    #[test]
    fn test_read_signed_entry() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("signed.jar");
        create_jar(&jar, &[FixtureEntry::file("a.txt", b"hello")]).unwrap();
        let charlie = signer();
        sign_jar(&jar, &charlie).unwrap();

        let mut signed = SignedJar::open(&jar).unwrap();
        let index = signed
            .entries()
            .iter()
            .find(|entry| entry.name() == "a.txt")
            .unwrap()
            .index();
        let entry = signed.read_entry(index).unwrap();
        assert_eq!(entry.size, 5);
        assert_eq!(entry.signers.len(), 1);
        assert_eq!(entry.signers[0].leaf(), charlie.certificate());
    }

    #[test]
    fn test_stale_signed_entry_fails_digest_check() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("stale.jar");
        create_jar(&jar, &[FixtureEntry::file("a.txt", b"hello")]).unwrap();
        sign_jar(&jar, &signer()).unwrap();
        update_jar(&jar, &[FixtureEntry::file("a.txt", b"tampered")]).unwrap();

        let mut signed = SignedJar::open(&jar).unwrap();
        let index = signed
            .entries()
            .iter()
            .find(|entry| entry.name() == "a.txt")
            .unwrap()
            .index();
        let err = signed.read_entry(index).unwrap_err();
        assert!(err.is_security_failure());
        assert_eq!(
            err.to_string(),
            "security failure: SHA-256 digest error for a.txt"
        );
    }

    #[test]
    fn test_entry_size_limit() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("big.jar");
        create_jar(&jar, &[FixtureEntry::file("big.bin", &[7u8; 4096])]).unwrap();

        let mut signed = SignedJar::open(&jar).unwrap().with_limits(ReadLimits {
            max_entry_bytes: 1024,
            max_metadata_bytes: 0,
        });
        let err = signed.read_entry(1).unwrap_err();
        assert!(matches!(err, JarError::EntryTooLarge { limit: 1024, .. }));
        assert!(!err.is_security_failure());
    }

    #[test]
    fn test_not_a_zip() {
        let err = SignedJar::new(std::io::Cursor::new(b"definitely not a zip".to_vec()))
            .err()
            .unwrap();
        assert!(matches!(err, JarError::Zip(_)));
        assert!(err.is_security_failure());
    }

    #[test]
    fn test_read_entry_out_of_range() {
        let mut jar = raw_jar(&[("a.txt", &b"a"[..])]);
        let err = jar.read_entry(99).unwrap_err();
        assert!(matches!(err, JarError::Zip(ZipError::FileNotFound)));
    }

    #[test]
    fn test_unsigned_manifest_with_split_character() {
        let mut manifest = b"Manifest-Version: 1.0\r\nImplementation-Vendor: ".to_vec();
        manifest.extend_from_slice(&[b'a'; 49]);
        manifest.extend_from_slice(b"\xC3\r\n \xA9tail\r\n\r\n");
        let mut jar = raw_jar(&[("META-INF/MANIFEST.MF", &manifest[..]), ("a.txt", &b"a"[..])]);

        let entry = read_named(&mut jar, "a.txt").unwrap();
        assert!(entry.signers.is_empty());
    }

    #[test]
    fn test_unsigned_manifest_with_duplicate_sections() {
        let manifest = b"Manifest-Version: 1.0\r\n\r\n\
            Name: a.txt\r\nX-Note: one\r\n\r\n\
            Name: a.txt\r\nX-Note: two\r\n\r\n";
        let mut jar = raw_jar(&[("META-INF/MANIFEST.MF", &manifest[..]), ("a.txt", &b"a"[..])]);

        let entry = read_named(&mut jar, "a.txt").unwrap();
        assert!(entry.signers.is_empty());
    }

    #[test]
    fn test_unsigned_manifest_is_not_parsed() {
        let mut jar = raw_jar(&[
            ("META-INF/MANIFEST.MF", &b" leading continuation\r\nnot a header\r\n"[..]),
            ("META-INF/ORPHAN.RSA", &b"no signature file"[..]),
            ("a.txt", &b"a"[..]),
        ]);

        let entry = read_named(&mut jar, "a.txt").unwrap();
        assert!(entry.signers.is_empty());
    }

    #[test]
    fn test_signed_name_split_inside_character() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("wide.jar");
        // Long enough that the Name header wraps between the bytes of a character
        let name = format!("a{}", "\u{fc}".repeat(40));
        create_jar(&jar, &[FixtureEntry::file(&name, b"umlauts")]).unwrap();
        let charlie = signer();
        sign_jar(&jar, &charlie).unwrap();

        let mut signed = SignedJar::open(&jar).unwrap();
        let entry = read_named(&mut signed, &name).unwrap();
        assert_eq!(entry.signers.len(), 1);
        assert_eq!(entry.signers[0].leaf(), charlie.certificate());
    }
}
