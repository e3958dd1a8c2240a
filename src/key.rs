//! Storage keys
//!
//! A key is a short composite of integer components. The store only relies on
//! equality and hashing; the file name rendering exists for the single-file
//! backend.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest file name produced by [`Key::file_name`]
pub const MAX_FILE_NAME_LEN: usize = 128;

/// Separator between the truncated prefix and the hash suffix
const HASH_MARKER: char = '~';

/// Opaque composite key
///
/// Primary components identify the owning unit, secondary components the
/// object inside it. Ordering is lexicographic, primary first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    primary: Vec<u32>,
    secondary: Vec<u32>,
}

impl Key {
    /// Create a key from its primary and secondary components
    pub fn new(primary: impl Into<Vec<u32>>, secondary: impl Into<Vec<u32>>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// Create a key with primary components only
    pub fn primary(components: impl Into<Vec<u32>>) -> Self {
        Self::new(components, Vec::new())
    }

    pub fn primary_components(&self) -> &[u32] {
        &self.primary
    }

    pub fn secondary_components(&self) -> &[u32] {
        &self.secondary
    }

    /// Deterministic file name for this key
    ///
    /// The component rendering is percent-encoded; names longer than
    /// [`MAX_FILE_NAME_LEN`] keep a prefix and end with `~` and the CRC32 of
    /// the full encoding, so distinct long keys stay distinct.
    pub fn file_name(&self) -> String {
        let encoded = urlencoding::encode(&self.to_string()).into_owned();
        if encoded.len() <= MAX_FILE_NAME_LEN {
            return encoded;
        }

        let hash = crc32fast::hash(encoded.as_bytes());
        let suffix = format!("{}{:08x}", HASH_MARKER, hash);
        // Encoded output is ASCII, any byte index is a char boundary
        let prefix = &encoded[..MAX_FILE_NAME_LEN - suffix.len()];
        format!("{}{}", prefix, suffix)
    }

    /// Parse the `1.2/3` notation used by the CLI
    ///
    /// Components before the slash are primary, after it secondary.
    pub fn parse(text: &str) -> Option<Self> {
        fn components(part: &str) -> Option<Vec<u32>> {
            if part.is_empty() {
                return Some(Vec::new());
            }
            part.split('.').map(|c| c.trim().parse().ok()).collect()
        }

        let (primary, secondary) = match text.split_once('/') {
            Some((p, s)) => (p, s),
            None => (text, ""),
        };
        let primary = components(primary)?;
        if primary.is_empty() {
            return None;
        }
        Some(Self::new(primary, components(secondary)?))
    }
}

impl fmt::Display for Key {
    /// Renders `p0,p1;s0,s1`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_components(f, &self.primary)?;
        f.write_str(";")?;
        write_components(f, &self.secondary)
    }
}

fn write_components(f: &mut fmt::Formatter<'_>, components: &[u32]) -> fmt::Result {
    for (i, c) in components.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}
