//! Content fingerprints for downloaded artifacts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::Digest;
use tokio::io::AsyncReadExt;

use crate::error::{ProviderError, Result};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Digest used to fingerprint file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-1, the digest the API reports for packages.
    #[default]
    Sha1,
    /// SHA-256.
    Sha256,
}

impl HashAlgorithm {
    /// Lower-case algorithm name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    fn hasher(self) -> Hasher {
        match self {
            HashAlgorithm::Sha1 => Hasher::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(sha2::Sha256::new()),
        }
    }
}

enum Hasher {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Size and content hash of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Size in bytes.
    pub size: u64,
    /// Lower-case hex digest.
    pub hash: String,
    /// Digest that produced `hash`.
    #[serde(default)]
    pub algorithm: HashAlgorithm,
}

impl Fingerprint {
    /// Fingerprint an in-memory buffer.
    pub fn of_bytes(data: &[u8], algorithm: HashAlgorithm) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(data);
        Self {
            size: data.len() as u64,
            hash: hasher.finalize_hex(),
            algorithm,
        }
    }

    /// Fingerprint a file without loading it into memory.
    pub async fn of_file(path: &Path, algorithm: HashAlgorithm) -> Result<Self> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ProviderError::filesystem("open", path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| ProviderError::filesystem("stat", path, e))?
            .len();

        let mut hasher = algorithm.hasher();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| ProviderError::filesystem("read", path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(Self {
            size,
            hash: hasher.finalize_hex(),
            algorithm,
        })
    }

    /// Compare against server-reported values; size is checked first.
    ///
    /// A hash mismatch names the digest in use, `sha1` or `sha256`.
    pub fn verify(&self, expected_size: u64, expected_hash: &str) -> Result<()> {
        if self.size != expected_size {
            return Err(ProviderError::FingerprintMismatch {
                field: "file_size",
                expected: expected_size.to_string(),
                actual: self.size.to_string(),
            });
        }
        if !self.hash.eq_ignore_ascii_case(expected_hash) {
            return Err(ProviderError::FingerprintMismatch {
                field: self.algorithm.as_str(),
                expected: expected_hash.to_string(),
                actual: self.hash.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";
    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_known_digests() {
        assert_eq!(Fingerprint::of_bytes(b"", HashAlgorithm::Sha1).hash, EMPTY_SHA1);
        assert_eq!(Fingerprint::of_bytes(b"abc", HashAlgorithm::Sha1).hash, ABC_SHA1);
        assert_eq!(Fingerprint::of_bytes(b"abc", HashAlgorithm::Sha256).hash, ABC_SHA256);
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha1);
    }

    #[tokio::test]
    async fn test_file_fingerprint_is_deterministic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let first = Fingerprint::of_file(&path, HashAlgorithm::Sha1).await.unwrap();
        let second = Fingerprint::of_file(&path, HashAlgorithm::Sha1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Fingerprint::of_bytes(&data, HashAlgorithm::Sha1));
        assert_eq!(first.size, 200_000);
    }

    #[tokio::test]
    async fn test_missing_file_is_filesystem_error() {
        let dir = tempdir().unwrap();
        let err = Fingerprint::of_file(&dir.path().join("nope"), HashAlgorithm::Sha1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Filesystem { operation: "open", .. }));
    }

    #[test]
    fn test_verify() {
        let fp = Fingerprint::of_bytes(b"abc", HashAlgorithm::Sha1);
        assert!(fp.verify(3, ABC_SHA1).is_ok());
        assert!(fp.verify(3, &ABC_SHA1.to_uppercase()).is_ok());

        let err = fp.verify(4, ABC_SHA1).unwrap_err();
        assert!(matches!(err, ProviderError::FingerprintMismatch { field: "file_size", .. }));

        let err = fp.verify(3, EMPTY_SHA1).unwrap_err();
        assert!(matches!(err, ProviderError::FingerprintMismatch { field: "sha1", .. }));
    }

    #[test]
    fn test_sha256_mismatch_names_sha256() {
        let fp = Fingerprint::of_bytes(b"abc", HashAlgorithm::Sha256);
        assert!(fp.verify(3, ABC_SHA256).is_ok());

        let err = fp.verify(3, ABC_SHA1).unwrap_err();
        assert!(matches!(err, ProviderError::FingerprintMismatch { field: "sha256", .. }));
        assert!(err.to_string().contains("sha256 of the downloaded file"));
    }
}
