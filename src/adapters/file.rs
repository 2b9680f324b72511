//! File-based signing keys (PEM or DER on disk).

use std::path::Path;

use openssl::pkey::{PKey, Private};

use super::{KeyFormat, SignerHandle};
use crate::domain::crypto::DigestAlgorithm;
use crate::infra::error::{SigningError, SigningResult};

/// A private key read from the filesystem.
#[derive(Debug)]
pub struct FileKey {
    key: PKey<Private>,
}

impl FileKey {
    /// Read and parse a private-key file. `format` must be `Pem` or `Der`.
    pub fn load(path: &Path, format: KeyFormat) -> SigningResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            SigningError::KeyLoad(format!("cannot read key file {}: {e}", path.display()))
        })?;
        let key = match format {
            KeyFormat::Pem => PKey::private_key_from_pem(&bytes),
            KeyFormat::Der => PKey::private_key_from_der(&bytes),
            KeyFormat::External => {
                return Err(SigningError::KeyLoad(
                    "EXTERNAL keys are not loaded from files".to_string(),
                ))
            }
        }
        .map_err(|e| {
            SigningError::KeyLoad(format!(
                "cannot parse private key from {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { key })
    }

    pub fn from_pkey(key: PKey<Private>) -> Self {
        Self { key }
    }
}

impl SignerHandle for FileKey {
    fn sign(&self, algorithm: DigestAlgorithm, message: &[u8]) -> SigningResult<Vec<u8>> {
        let mut signer = openssl::sign::Signer::new(algorithm.message_digest(), &self.key)
            .map_err(|e| {
                SigningError::Signing(format!("cannot initialize {algorithm} signer: {e}"))
            })?;
        signer
            .update(message)
            .map_err(|e| SigningError::Signing(format!("digest update failed: {e}")))?;
        signer
            .sign_to_vec()
            .map_err(|e| SigningError::Signing(format!("signature operation failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::hash::MessageDigest;
    use openssl::rsa::Rsa;
    use openssl::sign::Verifier;
    use std::io::Write;

    fn test_key() -> PKey<Private> {
        let rsa = Rsa::generate(2048).unwrap();
        PKey::from_rsa(rsa).unwrap()
    }

    #[test]
    fn signs_verifiable_pkcs1_signatures() {
        let key = test_key();
        let handle = FileKey::from_pkey(key.clone());
        let message = b"attribute set bytes";
        let signature = handle.sign(DigestAlgorithm::Sha256, message).unwrap();
        assert_eq!(signature.len(), 256);

        let mut verifier = Verifier::new(MessageDigest::sha256(), &key).unwrap();
        verifier.update(message).unwrap();
        assert!(verifier.verify(&signature).unwrap());
    }

    #[test]
    fn loads_pem_and_der_files() {
        let key = test_key();
        let dir = tempfile::tempdir().unwrap();

        let pem_path = dir.path().join("key.pem");
        let mut file = std::fs::File::create(&pem_path).unwrap();
        file.write_all(&key.private_key_to_pem_pkcs8().unwrap())
            .unwrap();
        FileKey::load(&pem_path, KeyFormat::Pem).unwrap();

        let der_path = dir.path().join("key.der");
        let mut file = std::fs::File::create(&der_path).unwrap();
        file.write_all(&key.private_key_to_der().unwrap()).unwrap();
        FileKey::load(&der_path, KeyFormat::Der).unwrap();

        // PEM bytes are not DER
        let error = FileKey::load(&pem_path, KeyFormat::Der).unwrap_err();
        assert!(matches!(error, SigningError::KeyLoad(_)));
    }
}
