//! Digest algorithm selection and the digest value type.

use std::fmt;

use digest::DynDigest;

use crate::infra::error::{SigningError, SigningResult};

/// Digest algorithms accepted for the Authenticode image hash.
///
/// SHA-256 is what current Secure Boot deployments expect; SHA-1 is kept for
/// verifying-against-legacy setups only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Parse an algorithm name as it appears on the command line.
    pub fn from_name(name: &str) -> SigningResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            other => Err(SigningError::UnsupportedAlgorithm(format!(
                "unknown digest algorithm '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn digest_size(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// OID content bytes of the digest algorithm.
    pub(crate) fn oid_der(&self) -> &'static [u8] {
        match self {
            DigestAlgorithm::Sha1 => &[0x2b, 0x0e, 0x03, 0x02, 0x1a],
            DigestAlgorithm::Sha256 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
            DigestAlgorithm::Sha384 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02],
            DigestAlgorithm::Sha512 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03],
        }
    }

    /// Dotted-string OID, for the `der`-based encoders.
    pub(crate) fn dotted_oid(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "1.3.14.3.2.26",
            DigestAlgorithm::Sha256 => "2.16.840.1.101.3.4.2.1",
            DigestAlgorithm::Sha384 => "2.16.840.1.101.3.4.2.2",
            DigestAlgorithm::Sha512 => "2.16.840.1.101.3.4.2.3",
        }
    }

    pub(crate) fn message_digest(&self) -> openssl::hash::MessageDigest {
        use openssl::hash::MessageDigest;
        match self {
            DigestAlgorithm::Sha1 => MessageDigest::sha1(),
            DigestAlgorithm::Sha256 => MessageDigest::sha256(),
            DigestAlgorithm::Sha384 => MessageDigest::sha384(),
            DigestAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }

    /// A streaming hasher for this algorithm.
    pub fn hasher(&self) -> Box<dyn DynDigest> {
        match self {
            DigestAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
            DigestAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
            DigestAlgorithm::Sha384 => Box::new(sha2::Sha384::default()),
            DigestAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
        }
    }

    /// One-shot digest of a byte slice.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize().to_vec()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An Authenticode image digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDigest {
    bytes: Vec<u8>,
    algorithm: DigestAlgorithm,
}

impl ImageDigest {
    pub fn new(bytes: Vec<u8>, algorithm: DigestAlgorithm) -> Self {
        Self { bytes, algorithm }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_sizes() {
        assert_eq!(DigestAlgorithm::Sha1.digest_size(), 20);
        assert_eq!(DigestAlgorithm::Sha256.digest_size(), 32);
        assert_eq!(DigestAlgorithm::Sha384.digest_size(), 48);
        assert_eq!(DigestAlgorithm::Sha512.digest_size(), 64);
    }

    #[test]
    fn name_round_trip() {
        for algorithm in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(DigestAlgorithm::from_name(algorithm.as_str()).unwrap(), algorithm);
        }
        assert_eq!(
            DigestAlgorithm::from_name("SHA256").unwrap(),
            DigestAlgorithm::Sha256
        );
    }

    #[test]
    fn unknown_name_is_rejected() {
        let error = DigestAlgorithm::from_name("md5").unwrap_err();
        assert!(matches!(
            error,
            crate::SigningError::UnsupportedAlgorithm(_)
        ));
    }

    #[test]
    fn one_shot_digest_matches_streaming() {
        let data = b"the quick brown fox";
        let mut hasher = DigestAlgorithm::Sha256.hasher();
        hasher.update(data);
        assert_eq!(
            hasher.finalize().to_vec(),
            DigestAlgorithm::Sha256.digest(data)
        );
        assert_eq!(DigestAlgorithm::Sha256.digest(data).len(), 32);
    }
}
