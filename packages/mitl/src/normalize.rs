//! Content normalization applied to file bytes before hashing.
//!
//! Normalization makes the project digest stable across platforms: the same
//! logical content hashes identically whether it was saved on Windows with a
//! BOM and CRLF endings or on Linux as plain LF text.

use color_eyre::{Result, eyre::bail};

/// Byte-order marks, longest prefix first so that UTF-32 LE wins over the
/// UTF-16 LE prefix it shares.
const BOMS: &[&[u8]] = &[
    &[0xEF, 0xBB, 0xBF],       // UTF-8
    &[0x00, 0x00, 0xFE, 0xFF], // UTF-32 BE
    &[0xFF, 0xFE, 0x00, 0x00], // UTF-32 LE
    &[0xFE, 0xFF],             // UTF-16 BE
    &[0xFF, 0xFE],             // UTF-16 LE
];

/// Stateless content transformer with three togglable stages, applied in a
/// fixed order: BOM strip, encoding validation, line-ending unification.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Normalizer {
    /// Remove a leading byte-order mark.
    pub strip_bom: bool,

    /// Require the post-BOM bytes to be valid UTF-8.
    pub validate_utf8: bool,

    /// Replace CRLF and bare CR with LF.
    pub unify_line_endings: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            strip_bom: true,
            validate_utf8: true,
            unify_line_endings: true,
        }
    }
}

impl Normalizer {
    /// Normalize the provided content.
    ///
    /// A validation failure is an error; the caller records it against the
    /// file and continues, it never aborts a whole traversal.
    pub fn normalize(&self, content: &[u8]) -> Result<Vec<u8>> {
        let mut bytes = content;

        if self.strip_bom {
            if let Some(bom) = BOMS.iter().find(|bom| bytes.starts_with(bom)) {
                bytes = &bytes[bom.len()..];
            }
        }

        if self.validate_utf8 && std::str::from_utf8(bytes).is_err() {
            bail!("content is not valid UTF-8");
        }

        if self.unify_line_endings {
            Ok(unify_line_endings(bytes))
        } else {
            Ok(bytes.to_vec())
        }
    }
}

/// Replace CRLF with LF, then remaining CR with LF.
///
/// Done in a single scan: a CR followed by LF consumes both. Replacing bare
/// CR first would turn CRLF into two newlines.
fn unify_line_endings(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r' {
            out.push(b'\n');
            if bytes.get(i + 1) == Some(&b'\n') {
                i += 1;
            }
        } else {
            out.push(bytes[i]);
        }
        i += 1;
    }
    out
}
