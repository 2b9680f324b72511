//! `SpcIndirectDataContent` encoding.
//!
//! The content carried inside the PKCS#7 SignedData is not the image bytes
//! but this Microsoft-defined structure wrapping the image digest:
//!
//! ```text
//! SpcIndirectDataContent ::= SEQUENCE {
//!     data          SpcAttributeTypeAndOptionalValue,  -- SPC_PE_IMAGE_DATA
//!     messageDigest DigestInfo
//! }
//! ```
//!
//! The `SpcPeImageData` value uses the fixed template firmware validators
//! expect: an empty flags BIT STRING and a present-but-empty file link.

use std::fmt;

use der::asn1::{AnyRef, ObjectIdentifier, OctetString};
use der::Encode;
use spki::AlgorithmIdentifier;

use crate::domain::asn1::{self, oids, TAG_CONTEXT_0, TAG_CONTEXT_2, TAG_SEQUENCE};
use crate::domain::crypto::{DigestAlgorithm, ImageDigest};
use crate::infra::error::{SigningError, SigningResult};

/// DER-encoded `SpcIndirectDataContent` plus the digest algorithm it
/// embeds.
pub struct SpcIndirectData {
    der: Vec<u8>,
    algorithm: DigestAlgorithm,
}

impl SpcIndirectData {
    /// Encode the content for an image digest. Pure: the output depends only
    /// on the digest bytes and algorithm.
    pub fn encode(digest: &ImageDigest) -> SigningResult<Self> {
        let mut body = spc_pe_image_attribute();
        body.extend_from_slice(&digest_info(digest)?);
        Ok(Self {
            der: asn1::tlv(TAG_SEQUENCE, &body),
            algorithm: digest.algorithm(),
        })
    }

    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}

impl fmt::Debug for SpcIndirectData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpcIndirectData({}, {} bytes)", self.algorithm, self.der.len())
    }
}

/// `SpcAttributeTypeAndOptionalValue` with the SPC_PE_IMAGE_DATA OID and the
/// template `SpcPeImageData` value: flags is an empty BIT STRING, the link is
/// a `[0]`-tagged `SpcLink` holding a `[2]` file choice with an empty
/// `[0]`-tagged unicode `SpcString`.
fn spc_pe_image_attribute() -> Vec<u8> {
    let empty_unicode = asn1::tlv(0x80, &[]);
    let file_link = asn1::tlv(TAG_CONTEXT_2, &empty_unicode);
    let link = asn1::tlv(TAG_CONTEXT_0, &file_link);

    let mut image_data = vec![0x03, 0x01, 0x00]; // flags: BIT STRING, no bits
    image_data.extend_from_slice(&link);

    let mut body = asn1::oid(oids::SPC_PE_IMAGE_DATA);
    body.extend_from_slice(&asn1::tlv(TAG_SEQUENCE, &image_data));
    asn1::tlv(TAG_SEQUENCE, &body)
}

/// `DigestInfo ::= SEQUENCE { digestAlgorithm AlgorithmIdentifier, digest
/// OCTET STRING }` with explicit NULL algorithm parameters.
fn digest_info(digest: &ImageDigest) -> SigningResult<Vec<u8>> {
    let oid = ObjectIdentifier::new(digest.algorithm().dotted_oid())
        .map_err(|e| SigningError::Encoding(format!("invalid digest OID: {e}")))?;
    let algorithm = AlgorithmIdentifier::<AnyRef> {
        oid,
        parameters: Some(AnyRef::NULL),
    }
    .to_der()?;
    let value = OctetString::new(digest.as_bytes())?.to_der()?;

    let mut body = algorithm;
    body.extend_from_slice(&value);
    Ok(asn1::tlv(TAG_SEQUENCE, &body))
}
