//! SHA-256 helpers for stage fingerprints.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 of a file's contents as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buffer)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Incremental hash over several components.
///
/// Components are NUL-separated so `["ab", "c"]` and `["a", "bc"]` differ.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Fingerprint::default()
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    pub fn update_strs<'a>(&mut self, items: impl IntoIterator<Item = &'a str>) -> &mut Self {
        for s in items {
            self.update_str(s);
        }
        self
    }

    pub fn update_path(&mut self, path: &Path) -> &mut Self {
        self.update_str(&path.to_string_lossy())
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// First 16 hex characters of [`Fingerprint::finish`].
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("game.nss");
        std::fs::write(&path, "hello").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_sha256_file_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(sha256_file(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn test_components_are_separated() {
        let mut a = Fingerprint::new();
        a.update_strs(["ab", "c"]);
        let mut b = Fingerprint::new();
        b.update_strs(["a", "bc"]);

        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_finish_short_is_prefix() {
        let mut a = Fingerprint::new();
        a.update_path(Path::new("out/game.nso"));
        let mut b = Fingerprint::new();
        b.update_path(Path::new("out/game.nso"));

        let full = a.finish();
        let short = b.finish_short();
        assert_eq!(short.len(), 16);
        assert!(full.starts_with(&short));
    }
}
