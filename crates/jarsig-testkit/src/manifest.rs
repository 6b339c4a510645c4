//! Minimal manifest model for writing fixtures
//!
//! Lines are wrapped at 72 bytes with single-space continuations, the way
//! JDK 8 through 12 write them. The wrap point ignores character boundaries,
//! so a multi-byte character can be split across two lines.

const MAX_LINE_BYTES: usize = 72;

pub(crate) type Attributes = Vec<(String, String)>;

#[derive(Debug, Clone, Default)]
pub(crate) struct ManifestModel {
    pub main: Attributes,
    /// Named sections in file order; the name is not repeated in the attributes
    pub sections: Vec<(String, Attributes)>,
}

impl ManifestModel {
    pub fn new() -> Self {
        Self {
            main: vec![
                ("Manifest-Version".to_string(), "1.0".to_string()),
                ("Created-By".to_string(), "jarsig-testkit".to_string()),
            ],
            sections: Vec::new(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Self {
        let mut model = Self::default();
        let mut first = true;
        let mut attributes: Attributes = Vec::new();
        let mut pending: Vec<u8> = Vec::new();

        for line in bytes.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if let Some(continuation) = line.strip_prefix(b" ") {
                pending.extend_from_slice(continuation);
                continue;
            }
            push_header(&mut attributes, &mut pending);
            if line.is_empty() {
                push_section(&mut model, &mut first, std::mem::take(&mut attributes));
            } else {
                pending.extend_from_slice(line);
            }
        }
        push_header(&mut attributes, &mut pending);
        push_section(&mut model, &mut first, attributes);
        model
    }

    /// Set attribute `key` of section `name`, adding the section if needed.
    pub fn set(&mut self, name: &str, key: &str, value: String) {
        let index = match self.sections.iter().position(|(known, _)| known == name) {
            Some(index) => index,
            None => {
                self.sections.push((name.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        };
        let attributes = &mut self.sections[index].1;
        match attributes
            .iter_mut()
            .find(|(known, _)| known.eq_ignore_ascii_case(key))
        {
            Some((_, existing)) => *existing = value,
            None => attributes.push((key.to_string(), value)),
        }
    }

    pub fn main_bytes(&self) -> Vec<u8> {
        section_bytes(None, &self.main)
    }

    /// Each named section with its encoded bytes
    pub fn encoded_sections(&self) -> Vec<(String, Vec<u8>)> {
        self.sections
            .iter()
            .map(|(name, attributes)| (name.clone(), section_bytes(Some(name), attributes)))
            .collect()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.main_bytes();
        for (_, section) in self.encoded_sections() {
            bytes.extend_from_slice(&section);
        }
        bytes
    }
}

/// Encode one section, including the empty line that ends it
pub(crate) fn section_bytes(name: Option<&str>, attributes: &Attributes) -> Vec<u8> {
    let mut bytes = Vec::new();
    if let Some(name) = name {
        write_header(&mut bytes, "Name", name);
    }
    for (key, value) in attributes {
        write_header(&mut bytes, key, value);
    }
    bytes.extend_from_slice(b"\r\n");
    bytes
}

fn write_header(out: &mut Vec<u8>, key: &str, value: &str) {
    let line = format!("{key}: {value}");
    let mut rest = line.as_bytes();
    let mut limit = MAX_LINE_BYTES;
    loop {
        let (chunk, tail) = rest.split_at(rest.len().min(limit));
        out.extend_from_slice(chunk);
        rest = tail;
        if rest.is_empty() {
            break;
        }
        out.extend_from_slice(b"\r\n ");
        // Continuation lines spend one byte on the leading space
        limit = MAX_LINE_BYTES - 1;
    }
    out.extend_from_slice(b"\r\n");
}

/// Decode a joined header, dropping it when it is not `key: value`
fn push_header(attributes: &mut Attributes, pending: &mut Vec<u8>) {
    if pending.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(&pending[..]).into_owned();
    pending.clear();
    if let Some((key, value)) = text.split_once(": ") {
        attributes.push((key.to_string(), value.to_string()));
    }
}

fn push_section(model: &mut ManifestModel, first: &mut bool, mut attributes: Attributes) {
    if attributes.is_empty() {
        return;
    }
    if *first {
        model.main = attributes;
        *first = false;
    } else if attributes[0].0.eq_ignore_ascii_case("Name") {
        let name = attributes.remove(0).1;
        model.sections.push((name, attributes));
    }
}
