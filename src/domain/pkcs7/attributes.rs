//! Authenticated (signed) attributes of the SignerInfo.
//!
//! Per CMS, the presence of signed attributes shifts the signature input
//! from the content itself to the DER of the attribute SET. The same
//! attributes appear inside the SignerInfo under an `[0] IMPLICIT` tag, so
//! both encodings are produced from one canonical ordering.

use crate::domain::asn1::{self, oids, TAG_OCTET_STRING, TAG_SEQUENCE, TAG_SET};
use crate::domain::spc::SpcIndirectData;
use crate::infra::error::SigningResult;

/// The attribute set signed by the provider.
///
/// Contains exactly: `contentType` (the SPC indirect-data OID),
/// `messageDigest` (the digest of the content value, outer header
/// stripped, as Authenticode computes it), and `spcStatementType`
/// (individual code signing). No `signingTime`: the output of a signing run
/// must be reproducible.
pub struct AuthenticatedAttributes {
    /// Complete `Attribute` encodings in DER SET-OF order.
    attributes: Vec<Vec<u8>>,
}

impl AuthenticatedAttributes {
    pub fn for_content(content: &SpcIndirectData) -> SigningResult<Self> {
        let hashed_value = asn1::strip_sequence_header(content.as_der())?;
        let message_digest = content.algorithm().digest(hashed_value);

        let mut attributes = vec![
            attribute(oids::CONTENT_TYPE, &asn1::oid(oids::SPC_INDIRECT_DATA)),
            attribute(
                oids::MESSAGE_DIGEST,
                &asn1::tlv(TAG_OCTET_STRING, &message_digest),
            ),
            attribute(
                oids::SPC_STATEMENT_TYPE,
                &asn1::tlv(TAG_SEQUENCE, &asn1::oid(oids::SPC_INDIVIDUAL_PURPOSE)),
            ),
        ];
        // DER SET OF: elements ordered by their encoded octets.
        attributes.sort();
        Ok(Self { attributes })
    }

    fn content_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for attribute in &self.attributes {
            body.extend_from_slice(attribute);
        }
        body
    }

    /// The SET encoding. This is what the signature covers.
    #[must_use]
    pub fn to_set_der(&self) -> Vec<u8> {
        asn1::tlv(TAG_SET, &self.content_bytes())
    }

    /// The `[0] IMPLICIT` encoding embedded in the SignerInfo. Identical
    /// content octets, different tag.
    #[must_use]
    pub fn to_implicit_der(&self) -> Vec<u8> {
        asn1::tlv(0xa0, &self.content_bytes())
    }
}

/// `Attribute ::= SEQUENCE { attrType OBJECT IDENTIFIER, attrValues SET OF
/// AttributeValue }` with a single value.
fn attribute(type_oid: &[u8], value: &[u8]) -> Vec<u8> {
    let mut body = asn1::oid(type_oid);
    body.extend_from_slice(&asn1::tlv(TAG_SET, value));
    asn1::tlv(TAG_SEQUENCE, &body)
}
