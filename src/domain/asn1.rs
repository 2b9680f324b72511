//! Minimal DER writer and the OIDs shared between the SPC and PKCS#7
//! encoders.
//!
//! The structures this crate emits are few and fixed, so a narrow
//! tag-length-value writer is all the encoding machinery the builders need.

use crate::infra::error::{SigningError, SigningResult};

pub(crate) const TAG_SEQUENCE: u8 = 0x30;
pub(crate) const TAG_SET: u8 = 0x31;
pub(crate) const TAG_OID: u8 = 0x06;
pub(crate) const TAG_OCTET_STRING: u8 = 0x04;
pub(crate) const TAG_CONTEXT_0: u8 = 0xa0;
pub(crate) const TAG_CONTEXT_2: u8 = 0xa2;

/// INTEGER 1, used as the version of both SignedData and SignerInfo.
pub(crate) const DER_INTEGER_ONE: &[u8] = &[0x02, 0x01, 0x01];

/// ASN.1 NULL, the parameter block of the SHA algorithm identifiers.
pub(crate) const DER_NULL: &[u8] = &[0x05, 0x00];

/// OID content bytes (without tag and length).
pub(crate) mod oids {
    /// PKCS#7 signedData (1.2.840.113549.1.7.2)
    pub const PKCS7_SIGNED_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];

    /// PKCS#9 contentType attribute (1.2.840.113549.1.9.3)
    pub const CONTENT_TYPE: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x03];

    /// PKCS#9 messageDigest attribute (1.2.840.113549.1.9.4)
    pub const MESSAGE_DIGEST: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x04];

    /// SPC indirect data content (1.3.6.1.4.1.311.2.1.4)
    pub const SPC_INDIRECT_DATA: &[u8] =
        &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x01, 0x04];

    /// SPC PE image data object (1.3.6.1.4.1.311.2.1.15)
    pub const SPC_PE_IMAGE_DATA: &[u8] =
        &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x01, 0x0f];

    /// SPC statement type attribute (1.3.6.1.4.1.311.2.1.11)
    pub const SPC_STATEMENT_TYPE: &[u8] =
        &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x01, 0x0b];

    /// SPC individual code signing purpose (1.3.6.1.4.1.311.2.1.21)
    pub const SPC_INDIVIDUAL_PURPOSE: &[u8] =
        &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x01, 0x15];

    /// rsaEncryption (1.2.840.113549.1.1.1)
    pub const RSA_ENCRYPTION: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

    /// ecdsa-with-SHA1 (1.2.840.10045.4.1)
    pub const ECDSA_WITH_SHA1: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x01];

    /// ecdsa-with-SHA256 (1.2.840.10045.4.3.2)
    pub const ECDSA_WITH_SHA256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];

    /// ecdsa-with-SHA384 (1.2.840.10045.4.3.3)
    pub const ECDSA_WITH_SHA384: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x03];

    /// ecdsa-with-SHA512 (1.2.840.10045.4.3.4)
    pub const ECDSA_WITH_SHA512: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x04];
}

/// Encode a definite-form DER length. Lengths above 2^24 - 1 do not occur in
/// the structures this crate builds and are rejected upstream.
pub(crate) fn encode_len(len: usize) -> Vec<u8> {
    if len < 128 {
        vec![len as u8]
    } else if len < 256 {
        vec![0x81, len as u8]
    } else if len < 65536 {
        vec![0x82, (len >> 8) as u8, (len & 0xff) as u8]
    } else {
        vec![
            0x83,
            (len >> 16) as u8,
            (len >> 8) as u8,
            (len & 0xff) as u8,
        ]
    }
}

/// Emit one tag-length-value triple.
pub(crate) fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 5);
    out.push(tag);
    out.extend_from_slice(&encode_len(content.len()));
    out.extend_from_slice(content);
    out
}

/// Emit an OBJECT IDENTIFIER from its content bytes.
pub(crate) fn oid(content: &[u8]) -> Vec<u8> {
    tlv(TAG_OID, content)
}

/// Return the contents of a top-level SEQUENCE, without its header.
///
/// Authenticode hashes the value octets of `SpcIndirectDataContent`, not the
/// full encoding, so the builders need to peel the outer header off.
pub(crate) fn strip_sequence_header(der: &[u8]) -> SigningResult<&[u8]> {
    if der.len() < 2 || der[0] != TAG_SEQUENCE {
        return Err(SigningError::Encoding(
            "expected a top-level SEQUENCE".to_string(),
        ));
    }
    let first = der[1] as usize;
    let (header_len, content_len) = if first & 0x80 == 0 {
        (2, first)
    } else {
        let n = first & 0x7f;
        if n == 0 || n > 4 || 2 + n > der.len() {
            return Err(SigningError::Encoding(
                "unsupported DER length form".to_string(),
            ));
        }
        let mut len = 0usize;
        for byte in &der[2..2 + n] {
            len = (len << 8) | *byte as usize;
        }
        (2 + n, len)
    };
    if header_len + content_len != der.len() {
        return Err(SigningError::Encoding(format!(
            "SEQUENCE length {} does not match {} available bytes",
            content_len,
            der.len() - header_len
        )));
    }
    Ok(&der[header_len..])
}
