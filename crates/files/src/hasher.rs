//! Local content hashing, done before any network transfer.

use crate::descriptor::Digest;
use cvault_crypto::HashType;
use std::io::Read;
use std::path::Path;

/// Computes content digests with a fixed algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentHasher {
    algorithm: HashType,
}

impl ContentHasher {
    pub fn new(algorithm: HashType) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashType {
        self.algorithm
    }

    /// Digest an in-memory buffer.
    pub fn digest(&self, data: &[u8]) -> Digest {
        Digest::from_bytes(self.algorithm.digest(data))
    }

    /// Digest a stream without buffering it whole.
    pub fn digest_reader<R: Read>(&self, reader: R) -> std::io::Result<Digest> {
        self.algorithm.digest_reader(reader).map(Digest::from_bytes)
    }

    pub fn digest_file(&self, path: &Path) -> std::io::Result<Digest> {
        let file = std::fs::File::open(path)?;
        self.digest_reader(std::io::BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sha256() {
        let hasher = ContentHasher::default();
        assert_eq!(hasher.algorithm(), HashType::Sha256);
        assert_eq!(
            hasher.digest(b"hello world!").to_hex(),
            "7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9"
        );
    }

    #[test]
    fn test_file_and_buffer_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let hasher = ContentHasher::new(HashType::Blake3);
        assert_eq!(hasher.digest_file(&path).unwrap(), hasher.digest(&data));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ContentHasher::default()
            .digest_file(&dir.path().join("nope"))
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
