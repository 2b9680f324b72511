//! Signing providers.
//!
//! The PKCS#7 builder only ever sees a [`SignerHandle`]: an opaque
//! capability that signs a message with a chosen digest algorithm. Where the
//! key actually lives (a PEM/DER file on disk, or an external provider such
//! as a token or a remote key service) is decided here.

pub mod external;
pub mod file;

use std::path::Path;

use crate::domain::crypto::DigestAlgorithm;
use crate::infra::error::{SigningError, SigningResult};

pub use external::{register_provider, ExternalProvider, ProviderSession};
pub use file::FileKey;

/// A private key usable for single-shot sign operations.
///
/// `sign` performs the full hash-then-sign: the implementation hashes
/// `message` with `algorithm` and returns the signature (PKCS#1 v1.5 for RSA
/// keys, DER ECDSA for EC keys). External providers may block for as long as
/// a network round-trip or a token interaction takes. Resources are released
/// when the handle is dropped.
pub trait SignerHandle: std::fmt::Debug {
    fn sign(&self, algorithm: DigestAlgorithm, message: &[u8]) -> SigningResult<Vec<u8>>;
}

/// How the key locator is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// `locator` is a path to a PEM private-key file.
    Pem,
    /// `locator` is a path to a DER private-key file.
    Der,
    /// `locator` is an opaque string interpreted by a named external
    /// provider.
    External,
}

/// A key locator as handed in by the driver.
#[derive(Debug, Clone)]
pub struct KeyLocator {
    pub locator: String,
    pub format: KeyFormat,
    /// Provider name; required for [`KeyFormat::External`].
    pub provider: Option<String>,
}

impl KeyLocator {
    pub fn file(path: impl Into<String>, format: KeyFormat) -> Self {
        Self {
            locator: path.into(),
            format,
            provider: None,
        }
    }

    pub fn external(locator: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            format: KeyFormat::External,
            provider: Some(provider.into()),
        }
    }
}

/// Materialize a signer handle for a key locator.
///
/// For `External` keys this acquires a provider session; the session (and
/// with it the provider's process-wide state) is torn down once the returned
/// handle is dropped.
pub fn acquire_signer(key: &KeyLocator) -> SigningResult<Box<dyn SignerHandle>> {
    match key.format {
        KeyFormat::Pem | KeyFormat::Der => {
            let handle = FileKey::load(Path::new(&key.locator), key.format)?;
            Ok(Box::new(handle))
        }
        KeyFormat::External => {
            let provider = key.provider.as_deref().ok_or_else(|| {
                SigningError::KeyLoad(
                    "keyform EXTERNAL requires a provider name".to_string(),
                )
            })?;
            let session = ProviderSession::acquire(provider)?;
            session.open_key(&key.locator)
        }
    }
}
