//! JAR manifest format parsing
//!
//! Used for both `META-INF/MANIFEST.MF` and signature files (`*.SF`), which
//! share the same syntax:
//! - sections are separated by an empty line, the first is the main section
//! - each header is `Name: value`
//! - a line starting with a single space continues the previous value, and
//!   may split a multi-byte character
//! - a repeated section name replaces the earlier section
//! - lines end with CRLF, LF or CR
//!
//! Signature files digest the raw bytes of manifest sections, so every
//! section remembers its byte range including the empty line ending it.

use std::collections::HashMap;
use std::ops::Range;

use crate::error::SecurityFailure;

/// One parsed section with its attributes in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    attributes: Vec<(String, String)>,
    range: Range<usize>,
}

impl Section {
    /// Attribute lookup, case-insensitive on the name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Value of the `Name` attribute, absent for the main section
    pub fn name(&self) -> Option<&str> {
        self.get("Name")
    }

    /// Byte range of this section within the parsed file
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }
}

/// A parsed manifest-format file that keeps its raw bytes
#[derive(Debug, Clone)]
pub struct Manifest {
    bytes: Vec<u8>,
    main: Section,
    sections: Vec<Section>,
    by_name: HashMap<String, usize>,
}

impl Manifest {
    /// Parse manifest-format bytes; `file` names the source in errors.
    pub fn parse(file: &str, bytes: Vec<u8>) -> Result<Self, SecurityFailure> {
        let malformed = |reason: String| SecurityFailure::Malformed {
            file: file.to_string(),
            reason,
        };

        let mut raw_sections = Vec::new();
        let mut current: Vec<(String, String)> = Vec::new();
        // Header bytes with continuations appended, decoded once complete
        let mut pending: Option<(usize, Vec<u8>)> = None;
        let mut section_start = 0;
        let mut pos = 0;
        let mut line_number = 0;

        while pos < bytes.len() {
            let (line, next) = next_line(&bytes, pos);
            line_number += 1;

            if line.is_empty() {
                push_header(&mut current, pending.take()).map_err(malformed)?;
                // Empty line closes the section, or is padding between sections
                if !current.is_empty() {
                    raw_sections.push((std::mem::take(&mut current), section_start..next));
                }
                section_start = next;
            } else if line[0] == b' ' {
                let (_, header) = pending.as_mut().ok_or_else(|| {
                    malformed(format!("line {line_number}: continuation without header"))
                })?;
                header.extend_from_slice(&line[1..]);
            } else {
                push_header(&mut current, pending.take()).map_err(malformed)?;
                pending = Some((line_number, line.to_vec()));
            }

            pos = next;
        }

        push_header(&mut current, pending).map_err(malformed)?;
        if !current.is_empty() {
            raw_sections.push((current, section_start..bytes.len()));
        }

        let mut sections = Vec::new();
        let mut main = Section {
            attributes: Vec::new(),
            range: 0..0,
        };
        for (index, (attributes, range)) in raw_sections.into_iter().enumerate() {
            let section = Section { attributes, range };
            if index == 0 && section.name().is_none() {
                main = section;
            } else {
                sections.push(section);
            }
        }

        let mut by_name = HashMap::new();
        for (index, section) in sections.iter().enumerate() {
            let name = section
                .name()
                .ok_or_else(|| malformed("section without Name attribute".to_string()))?;
            // A repeated name replaces the earlier section
            by_name.insert(name.to_string(), index);
        }

        Ok(Self {
            bytes,
            main,
            sections,
            by_name,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn main(&self) -> &Section {
        &self.main
    }

    /// Raw bytes of the main section
    pub fn main_bytes(&self) -> &[u8] {
        &self.bytes[self.main.range()]
    }

    /// Named sections in file order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.by_name.get(name).map(|&index| &self.sections[index])
    }

    /// Raw bytes of the named section
    pub fn section_bytes(&self, name: &str) -> Option<&[u8]> {
        self.section(name).map(|section| &self.bytes[section.range()])
    }
}

/// Return the line starting at `pos` (without terminator) and the offset
/// just past its terminator.
fn next_line(bytes: &[u8], pos: usize) -> (&[u8], usize) {
    let mut end = pos;
    while end < bytes.len() {
        match bytes[end] {
            b'\r' => {
                let next = if bytes.get(end + 1) == Some(&b'\n') {
                    end + 2
                } else {
                    end + 1
                };
                return (&bytes[pos..end], next);
            }
            b'\n' => return (&bytes[pos..end], end + 1),
            _ => end += 1,
        }
    }
    (&bytes[pos..end], end)
}

/// Decode one logical header and append it to `attributes`.
///
/// Continuations may split a multi-byte character, so decoding waits until
/// the whole header has been collected.
fn push_header(
    attributes: &mut Vec<(String, String)>,
    header: Option<(usize, Vec<u8>)>,
) -> Result<(), String> {
    let Some((line_number, bytes)) = header else {
        return Ok(());
    };
    let text =
        String::from_utf8(bytes).map_err(|_| format!("line {line_number}: invalid UTF-8"))?;
    let (key, value) = text
        .split_once(": ")
        .ok_or_else(|| format!("line {line_number}: invalid header"))?;
    attributes.push((key.to_string(), value.to_string()));
    Ok(())
}
