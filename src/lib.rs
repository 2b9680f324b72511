//! UEFI Secure Boot image signer.
//!
//! Signs PE/COFF executables for Secure Boot: parses the image, computes the
//! Authenticode digest over the covered byte ranges, wraps it in a
//! `SpcIndirectDataContent`, assembles a PKCS#7 SignedData with the signer's
//! certificate (and optional intermediates), and either splices the result
//! into the image's certificate table or emits it as a detached blob.
//!
//! The private key is an opaque capability behind [`SignerHandle`]: the same
//! pipeline works with an on-disk PEM/DER key or with an external provider
//! (token, HSM, remote key service) registered through
//! [`register_provider`].

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

use std::path::PathBuf;

pub use adapters::{
    acquire_signer, register_provider, ExternalProvider, FileKey, KeyFormat, KeyLocator,
    ProviderSession, SignerHandle,
};
pub use domain::crypto::{DigestAlgorithm, ImageDigest};
pub use domain::pe::{CertificateEntry, Image, PeFormat};
pub use domain::pkcs7::{AuthenticatedAttributes, SignedDataBuilder};
pub use domain::spc::SpcIndirectData;
pub use infra::error::{SigningError, SigningResult};
pub use pipelines::{SignRequest, SignWorkflow};
pub use services::AuthenticodeDigester;

/// Sign an image per `request` with the given digest algorithm. Returns the
/// path written.
pub fn sign_image(request: &SignRequest, algorithm: DigestAlgorithm) -> SigningResult<PathBuf> {
    SignWorkflow::new(algorithm).run(request)
}
