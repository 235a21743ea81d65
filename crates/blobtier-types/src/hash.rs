use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content-addressed identifier for a stored blob.
///
/// A `ContentHash` is computed by the caller (hex digest, multihash, etc.)
/// and treated as an opaque key. It is restricted to ASCII alphanumerics and
/// `-`, `_`, `.` so it can be used verbatim as a database key and as a URL
/// path segment.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Maximum accepted key length in bytes.
    pub const MAX_LEN: usize = 255;

    /// Validate and wrap a content hash string.
    pub fn new(hash: impl Into<String>) -> Result<Self, TypeError> {
        let hash = hash.into();
        if hash.is_empty() {
            return Err(TypeError::EmptyHash);
        }
        if hash.len() > Self::MAX_LEN {
            return Err(TypeError::HashTooLong {
                max: Self::MAX_LEN,
                actual: hash.len(),
            });
        }
        if let Some((position, ch)) = hash
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(TypeError::InvalidHashChar { ch, position });
        }
        Ok(Self(hash))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short representation (first 8 characters) for log lines.
    pub fn short(&self) -> &str {
        // All characters are ASCII, so any byte index is a char boundary.
        &self.0[..self.0.len().min(8)]
    }

    /// Key of this blob's block record number `block_number`.
    pub fn block_key(&self, block_number: u64) -> BlockKey {
        BlockKey {
            hash: self.clone(),
            block_number,
        }
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ContentHash {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

/// Key of one fixed-size block record: `"{hash}-{block_number}"`.
///
/// The block number is always the suffix after the last `-`, so keys stay
/// unambiguous even though hashes may themselves contain `-`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    pub hash: ContentHash,
    pub block_number: u64,
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash, self.block_number)
    }
}

impl FromStr for BlockKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, number) = s
            .rsplit_once('-')
            .ok_or_else(|| TypeError::InvalidBlockKey(s.to_string()))?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidBlockKey(s.to_string()));
        }
        let block_number = number
            .parse()
            .map_err(|_| TypeError::InvalidBlockKey(s.to_string()))?;
        Ok(Self {
            hash: ContentHash::new(hash)?,
            block_number,
        })
    }
}
