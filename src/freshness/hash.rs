//! Content hashing using blake3.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash representing "no content" (all zeros), used for unreadable files.
    #[inline]
    pub const fn empty() -> Self {
        Self([0; 32])
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 32]
    }

    /// Full hex form, as persisted in freeze entries.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // first 16 hex chars
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[inline]
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::new(*blake3::hash(bytes).as_bytes())
}

/// Hash text with line endings normalized to LF, so a checkout with CRLF
/// endings keeps matching a freeze entry written on another platform.
pub fn hash_text_lf(text: &str) -> ContentHash {
    if text.contains('\r') {
        hash_bytes(text.replace("\r\n", "\n").as_bytes())
    } else {
        hash_bytes(text.as_bytes())
    }
}

/// Compute blake3 hash of file contents. Unreadable files hash to
/// [`ContentHash::empty`].
pub fn hash_file(path: &Path) -> ContentHash {
    let Ok(file) = File::open(path) else {
        return ContentHash::empty();
    };

    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return ContentHash::empty(),
        }
    }

    ContentHash::new(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hex_roundtrip() {
        let hash = hash_bytes(b"quire");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()), Some(hash));
        assert_eq!(ContentHash::from_hex("abcd"), None);
    }

    #[test]
    fn test_lf_normalization() {
        assert_eq!(hash_text_lf("a\r\nb\r\n"), hash_text_lf("a\nb\n"));
        assert_ne!(hash_text_lf("a\nb"), hash_text_lf("a\nc"));
    }

    #[test]
    fn test_hash_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.qmd");
        std::fs::write(&path, "# Title").unwrap();
        assert_eq!(hash_file(&path), hash_bytes(b"# Title"));
        assert!(hash_file(&dir.path().join("missing")).is_empty());
    }
}
