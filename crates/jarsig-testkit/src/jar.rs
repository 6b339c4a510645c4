//! `jar`/`jarsigner` lookalikes operating on archives on disk

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use base64::Engine;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{FixtureError, FixtureResult};
use crate::keys::TestSigner;
use crate::manifest::{section_bytes, ManifestModel};
use crate::pkcs7::sign_detached;

const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

/// An entry to add to a fixture archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureEntry {
    name: String,
    /// `None` for directories
    contents: Option<Vec<u8>>,
}

impl FixtureEntry {
    pub fn file(name: &str, contents: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            contents: Some(contents.to_vec()),
        }
    }

    /// A directory marker; a trailing `/` is added when missing
    pub fn dir(name: &str) -> Self {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        Self {
            name,
            contents: None,
        }
    }
}

/// Create `jar` with a fresh manifest followed by `entries`.
pub fn create_jar(jar: &Path, entries: &[FixtureEntry]) -> FixtureResult<()> {
    let mut all = vec![FixtureEntry::file(
        MANIFEST_NAME,
        &ManifestModel::new().to_bytes(),
    )];
    all.extend(entries.iter().cloned());
    write_entries(jar, &all)
}

/// Replace or append `entries`, keeping the manifest untouched.
pub fn update_jar(jar: &Path, entries: &[FixtureEntry]) -> FixtureResult<()> {
    let mut all = read_entries(jar)?;
    for entry in entries {
        match all.iter_mut().find(|existing| existing.name == entry.name) {
            Some(existing) => *existing = entry.clone(),
            None => all.push(entry.clone()),
        }
    }
    write_entries(jar, &all)
}

/// Sign every entry of `jar` as `signer`, keeping other signatures.
///
/// Manifest digests are refreshed for entries whose contents changed, which
/// invalidates the affected sections of earlier signature files.
pub fn sign_jar(jar: &Path, signer: &TestSigner) -> FixtureResult<()> {
    let entries = read_entries(jar)?;
    let alias = signer.alias().to_ascii_uppercase();
    let sf_name = format!("META-INF/{alias}.SF");
    let block_name = format!("META-INF/{alias}.{}", signer.block_extension());

    let mut manifest = entries
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(MANIFEST_NAME))
        .and_then(|entry| entry.contents.as_deref())
        .map(ManifestModel::parse)
        .unwrap_or_else(ManifestModel::new);

    for entry in &entries {
        let Some(contents) = &entry.contents else {
            continue;
        };
        if is_signature_related(&entry.name) {
            continue;
        }
        manifest.set(&entry.name, "SHA-256-Digest", base64_sha256(contents));
    }

    let manifest_bytes = manifest.to_bytes();
    let mut signature_file = section_bytes(
        None,
        &vec![
            ("Signature-Version".to_string(), "1.0".to_string()),
            (
                "SHA-256-Digest-Manifest-Main-Attributes".to_string(),
                base64_sha256(&manifest.main_bytes()),
            ),
            (
                "SHA-256-Digest-Manifest".to_string(),
                base64_sha256(&manifest_bytes),
            ),
            ("Created-By".to_string(), "jarsig-testkit".to_string()),
        ],
    );
    for (name, section) in manifest.encoded_sections() {
        signature_file.extend_from_slice(&section_bytes(
            Some(&name),
            &vec![("SHA-256-Digest".to_string(), base64_sha256(&section))],
        ));
    }
    let block = sign_detached(signer, &signature_file)?;

    // Manifest first, then signature files, then everything else
    let mut signed = vec![FixtureEntry::file(MANIFEST_NAME, &manifest_bytes)];
    let is_own = |name: &str| {
        name.eq_ignore_ascii_case(&sf_name)
            || name
                .rsplit_once('.')
                .is_some_and(|(stem, _)| stem.eq_ignore_ascii_case(&format!("META-INF/{alias}")))
    };
    signed.extend(
        entries
            .iter()
            .filter(|entry| is_signature_file(&entry.name) && !is_own(&entry.name))
            .cloned(),
    );
    signed.push(FixtureEntry::file(&sf_name, &signature_file));
    signed.push(FixtureEntry::file(&block_name, &block));
    signed.extend(
        entries
            .iter()
            .filter(|entry| {
                !entry.name.eq_ignore_ascii_case(MANIFEST_NAME) && !is_signature_file(&entry.name)
            })
            .cloned(),
    );
    write_entries(jar, &signed)
}

/// Overwrite the first occurrence of `needle` in the raw archive bytes.
///
/// Entries are stored, so this corrupts payload data behind the CRC.
pub fn corrupt_payload(jar: &Path, needle: &[u8]) -> FixtureResult<()> {
    let mut bytes = fs::read(jar)?;
    let position = bytes
        .windows(needle.len())
        .position(|window| window == needle)
        .ok_or_else(|| FixtureError::NotFound(String::from_utf8_lossy(needle).into_owned()))?;
    for byte in &mut bytes[position..position + needle.len()] {
        *byte = byte.wrapping_add(1);
    }
    fs::write(jar, bytes)?;
    Ok(())
}

fn base64_sha256(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(data))
}

/// Signature files and blocks, excluding the manifest
fn is_signature_file(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    let Some(file_name) = upper.strip_prefix("META-INF/") else {
        return false;
    };
    !file_name.contains('/')
        && (file_name.starts_with("SIG-")
            || [".SF", ".RSA", ".DSA", ".EC"]
                .iter()
                .any(|extension| file_name.ends_with(extension)))
}

/// Entries jarsigner never lists in the manifest
fn is_signature_related(name: &str) -> bool {
    name.eq_ignore_ascii_case(MANIFEST_NAME) || is_signature_file(name)
}

fn read_entries(jar: &Path) -> FixtureResult<Vec<FixtureEntry>> {
    let mut archive = ZipArchive::new(File::open(jar)?)?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let contents = if file.is_dir() {
            None
        } else {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            Some(contents)
        };
        entries.push(FixtureEntry {
            name: file.name().to_string(),
            contents,
        });
    }
    Ok(entries)
}

fn write_entries(jar: &Path, entries: &[FixtureEntry]) -> FixtureResult<()> {
    let mut writer = ZipWriter::new(File::create(jar)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for entry in entries {
        match &entry.contents {
            Some(contents) => {
                writer.start_file(entry.name.as_str(), options)?;
                writer.write_all(contents)?;
            }
            None => writer.add_directory(entry.name.as_str(), options)?,
        }
    }
    writer.finish()?;
    Ok(())
}
