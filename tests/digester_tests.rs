//! Authenticode digest properties.

mod common;

use common::*;
use digest::Digest;
use uefisign::{AuthenticodeDigester, DigestAlgorithm, Image};

#[test]
fn digest_is_deterministic() {
    let image = Image::parse(minimal_pe32plus()).unwrap();
    let digester = AuthenticodeDigester::new(DigestAlgorithm::Sha256);
    assert_eq!(digester.digest(&image), digester.digest(&image));

    let other = Image::parse(minimal_pe32plus()).unwrap();
    assert_eq!(digester.digest(&image), digester.digest(&other));
}

#[test]
fn digest_matches_manual_concatenation() {
    let image = Image::parse(minimal_pe32plus()).unwrap();
    let digest = AuthenticodeDigester::new(DigestAlgorithm::Sha256).digest(&image);

    let data = image.as_bytes();
    let mut hasher = sha2::Sha256::new();
    hasher.update(&data[0x000..0x0d8]);
    hasher.update(&data[0x0dc..0x128]);
    hasher.update(&data[0x130..0x200]);
    hasher.update(&data[0x200..0x1000]);
    assert_eq!(digest.as_bytes(), hasher.finalize().as_slice());
}

#[test]
fn digest_sizes_match_algorithms() {
    let image = Image::parse(minimal_pe32plus()).unwrap();
    for (algorithm, size) in [
        (DigestAlgorithm::Sha1, 20),
        (DigestAlgorithm::Sha256, 32),
        (DigestAlgorithm::Sha384, 48),
        (DigestAlgorithm::Sha512, 64),
    ] {
        let digest = AuthenticodeDigester::new(algorithm).digest(&image);
        assert_eq!(digest.as_bytes().len(), size);
        assert_eq!(digest.algorithm(), algorithm);
    }
}

#[test]
fn digest_is_independent_of_signature() {
    // Appending a certificate entry (and refreshing the checksum) must not
    // change the digest: the checksum field and the certificate table are
    // excluded from the covered ranges.
    let digester = AuthenticodeDigester::new(DigestAlgorithm::Sha256);
    let mut image = Image::parse(minimal_pe32plus()).unwrap();
    let before = digester.digest(&image);

    image.append_signature(&[0x5a; 100]).unwrap();
    image.update_checksum();
    assert_eq!(digester.digest(&image), before);

    // A second signature does not change it either.
    image.append_signature(&[0xa5; 64]).unwrap();
    image.update_checksum();
    assert_eq!(digester.digest(&image), before);

    // And the same holds after a round-trip through the parser.
    let reparsed = Image::parse(image.as_bytes().to_vec()).unwrap();
    assert_eq!(digester.digest(&reparsed), before);
}

#[test]
fn digest_covers_the_overlay() {
    let base = Image::parse(minimal_pe32plus()).unwrap();
    let mut with_overlay = minimal_pe32plus();
    with_overlay.extend_from_slice(&[0x77; 8]);
    let overlay = Image::parse(with_overlay).unwrap();

    let digester = AuthenticodeDigester::new(DigestAlgorithm::Sha256);
    assert_ne!(digester.digest(&base), digester.digest(&overlay));
}

#[test]
fn pe32_digest_works() {
    let image = Image::parse(minimal_pe32()).unwrap();
    let digest = AuthenticodeDigester::new(DigestAlgorithm::Sha256).digest(&image);
    assert_eq!(digest.as_bytes().len(), 32);
}
