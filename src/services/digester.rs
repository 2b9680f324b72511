//! Authenticode digester: streams the image's covered byte ranges through a
//! hash in canonical order.

use digest::DynDigest as _;

use crate::domain::crypto::{DigestAlgorithm, ImageDigest};
use crate::domain::pe::Image;

pub struct AuthenticodeDigester {
    algorithm: DigestAlgorithm,
}

impl AuthenticodeDigester {
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Compute the Authenticode digest of `image`.
    ///
    /// Feeds the regions from [`Image::authenticode_regions`] through a
    /// streaming hash; nothing is allocated beyond the hash state, and the
    /// result is deterministic for a given image and algorithm.
    #[must_use]
    pub fn digest(&self, image: &Image) -> ImageDigest {
        let mut hasher = self.algorithm.hasher();
        let bytes = image.as_bytes();
        for region in image.authenticode_regions() {
            log::debug!("hashing [{:#x}..{:#x}]", region.start, region.end);
            hasher.update(&bytes[region]);
        }
        ImageDigest::new(hasher.finalize().to_vec(), self.algorithm)
    }
}
