use md5::{Digest, Md5};

/// Incremental MD5 over streamed content.
///
/// The digest covers bytes in the order they are fed to [`update`](Self::update),
/// so a writer feeds what it read from its input and a reader feeds what it
/// received from the server.
#[derive(Clone, Default)]
pub struct ContentDigest {
    context: Md5,
    bytes: u64,
}

impl ContentDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.context.update(data);
        self.bytes += data.len() as u64;
    }

    /// Bytes consumed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Consume the context and return the lowercase hex digest.
    pub fn finalize(self) -> String {
        hex::encode(self.context.finalize())
    }
}

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDigest")
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}

/// One-shot MD5 of `data` as lowercase hex.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Compare a local hex digest with a server-reported checksum.
///
/// Servers may prefix the value with the algorithm (`md5:`) and may use
/// either case.
pub fn checksums_match(local: &str, remote: &str) -> bool {
    let remote = remote.strip_prefix("md5:").unwrap_or(remote);
    local.eq_ignore_ascii_case(remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_digest() {
        assert_eq!(ContentDigest::new().finalize(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut d = ContentDigest::new();
        d.update(b"hello ");
        d.update(b"world");
        assert_eq!(d.bytes(), 11);
        assert_eq!(d.finalize(), md5_hex(b"hello world"));
    }

    #[test]
    fn known_value() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn match_tolerates_prefix_and_case() {
        assert!(checksums_match("900150983cd24fb0d6963f7d28e17f72", "md5:900150983CD24FB0D6963F7D28E17F72"));
        assert!(!checksums_match("d41d8cd98f00b204e9800998ecf8427e", "e99a18c428cb38d5f260853678922e03"));
    }
}
