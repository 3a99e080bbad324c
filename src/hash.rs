//! Streaming hash computation over a byte stream, used by the Downloader to
//! verify file integrity without buffering the whole transfer in memory.

/// Accumulates one or more digests as bytes are fed through it.
///
/// BLAKE3 is always computed (it is the reference hash `DatabaseEntry`
/// verification relies on); SHA256 and CRC32 are optional secondary hashes
/// recorded on `File` metadata but not load-bearing for the integrity
/// invariant.
#[derive(Debug, Default)]
pub struct StreamingHasher {
    blake3: blake3::Hasher,
    sha256: Option<sha2::Sha256>,
    crc32: Option<crc32fast::Hasher>,
}

impl StreamingHasher {
    /// Creates a hasher that only tracks BLAKE3.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blake3: blake3::Hasher::new(),
            sha256: None,
            crc32: None,
        }
    }

    /// Enables SHA256 tracking alongside BLAKE3.
    #[must_use]
    pub fn with_sha256(mut self) -> Self {
        self.sha256 = Some(<sha2::Sha256 as sha2::Digest>::new());
        self
    }

    /// Enables CRC32 tracking alongside BLAKE3.
    #[must_use]
    pub fn with_crc32(mut self) -> Self {
        self.crc32 = Some(crc32fast::Hasher::new());
        self
    }

    /// Feeds a chunk of bytes into every enabled digest.
    pub fn update(&mut self, chunk: &[u8]) {
        self.blake3.update(chunk);
        if let Some(sha256) = self.sha256.as_mut() {
            sha2::Digest::update(sha256, chunk);
        }
        if let Some(crc32) = self.crc32.as_mut() {
            crc32.update(chunk);
        }
    }

    /// Finalizes all enabled digests. Consumes the hasher since BLAKE3 and
    /// SHA256 finalization is destructive.
    #[must_use]
    pub fn finalize(self) -> Digests {
        Digests {
            blake3: self.blake3.finalize().to_hex().to_string(),
            sha256: self
                .sha256
                .map(|hasher| hex_encode(&sha2::Digest::finalize(hasher))),
            crc32: self.crc32.map(|hasher| format!("{:08x}", hasher.finalize())),
        }
    }
}

/// The finalized digest set produced by [`StreamingHasher::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digests {
    pub blake3: String,
    pub sha256: Option<String>,
    pub crc32: Option<String>,
}

impl Digests {
    /// Compares `self.blake3` against `expected` case-insensitively. An
    /// empty `expected` hash means "accept the transfer" per spec §4.7 step
    /// 4, so this returns `true`.
    #[must_use]
    pub fn matches_blake3(&self, expected: &str) -> bool {
        expected.is_empty() || expected.eq_ignore_ascii_case(&self.blake3)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn blake3_digest_matches_reference_implementation() {
        let mut hasher = StreamingHasher::new();
        hasher.update(b"hello world");
        let digest = hasher.finalize();
        assert_eq!(digest.blake3, blake3::hash(b"hello world").to_hex().to_string());
    }

    #[test]
    fn empty_expected_hash_always_matches() {
        let digest = StreamingHasher::new().finalize();
        assert!(digest.matches_blake3(""));
    }

    #[test]
    fn mismatched_hash_does_not_match() {
        let mut hasher = StreamingHasher::new();
        hasher.update(b"data");
        let digest = hasher.finalize();
        assert!(!digest.matches_blake3("deadbeef"));
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let mut hasher = StreamingHasher::new();
        hasher.update(b"data");
        let digest = hasher.finalize();
        assert!(digest.matches_blake3(&digest.blake3.to_uppercase()));
    }

    #[test]
    fn optional_digests_are_none_unless_enabled() {
        let mut hasher = StreamingHasher::new();
        hasher.update(b"data");
        let digest = hasher.finalize();
        assert!(digest.sha256.is_none());
        assert!(digest.crc32.is_none());
    }

    #[test]
    fn optional_digests_populate_when_enabled() {
        let mut hasher = StreamingHasher::new().with_sha256().with_crc32();
        hasher.update(b"data");
        let digest = hasher.finalize();
        assert!(digest.sha256.is_some());
        assert!(digest.crc32.is_some());
    }
}
