use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

pub const SPACE_KEY_PREFIX: &str = "DOCS";
pub const FALLBACK_KEY_PREFIX: &str = "AUTO";
pub const MAX_CLEANED_CHARS: usize = 8;
const FALLBACK_HASH_CHARS: usize = 5;

/// Identifier of a space in the content store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SpaceKey(String);

impl SpaceKey {
    /// Wrap an existing key verbatim (e.g. the configured source space).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl AsRef<str> for SpaceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the space key for an organizational unit name.
///
/// The name is transliterated to ASCII, uppercased and stripped to `[A-Z0-9]`;
/// the first eight remaining characters follow the `DOCS` prefix. Names that
/// clean to nothing get `AUTO` plus a short SHA-256 prefix of the original
/// name, so the result is identical across runs and machines.
pub fn derive_space_key(name: &str) -> SpaceKey {
    let cleaned = clean_unit_name(name);
    if cleaned.is_empty() {
        return SpaceKey(format!("{FALLBACK_KEY_PREFIX}{}", fallback_hash(name)));
    }
    let truncated: String = cleaned.chars().take(MAX_CLEANED_CHARS).collect();
    SpaceKey(format!("{SPACE_KEY_PREFIX}{truncated}"))
}

fn clean_unit_name(name: &str) -> String {
    deunicode::deunicode(name)
        .to_ascii_uppercase()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

fn fallback_hash(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let mut output = String::with_capacity(FALLBACK_HASH_CHARS + 1);
    for byte in digest.iter().take(FALLBACK_HASH_CHARS.div_ceil(2)) {
        output.push_str(&format!("{byte:02X}"));
    }
    output.truncate(FALLBACK_HASH_CHARS);
    output
}
