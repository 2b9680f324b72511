//! SignedData assembly.
//!
//! Builds the complete PKCS#7 `ContentInfo { signedData }` around an
//! `SpcIndirectDataContent`: one digest algorithm, the signer certificate
//! plus optional intermediates, and a single SignerInfo whose signature the
//! signing provider produces over the authenticated-attribute SET.

use openssl::pkey::Id;
use openssl::x509::X509;

use super::attributes::AuthenticatedAttributes;
use crate::adapters::SignerHandle;
use crate::domain::asn1::{
    self, oids, DER_INTEGER_ONE, DER_NULL, TAG_CONTEXT_0, TAG_OCTET_STRING, TAG_SEQUENCE, TAG_SET,
};
use crate::domain::crypto::DigestAlgorithm;
use crate::domain::spc::SpcIndirectData;
use crate::infra::error::{SigningError, SigningResult};

pub struct SignedDataBuilder {
    signer_cert: X509,
    intermediates: Vec<X509>,
    algorithm: DigestAlgorithm,
}

impl SignedDataBuilder {
    #[must_use]
    pub fn new(signer_cert: X509, algorithm: DigestAlgorithm) -> Self {
        Self {
            signer_cert,
            intermediates: Vec::new(),
            algorithm,
        }
    }

    /// Add intermediate certificates to embed after the signer certificate,
    /// in the order given. Firmware can then build the chain without any
    /// external store.
    #[must_use]
    pub fn with_intermediates(mut self, certs: Vec<X509>) -> Self {
        self.intermediates = certs;
        self
    }

    /// Assemble the SignedData for `content`, obtaining the signature from
    /// `signer`. Returns the DER of the outer ContentInfo.
    pub fn build(
        &self,
        content: &SpcIndirectData,
        signer: &dyn SignerHandle,
    ) -> SigningResult<Vec<u8>> {
        let attributes = AuthenticatedAttributes::for_content(content)?;
        let signature = signer.sign(self.algorithm, &attributes.to_set_der())?;
        if signature.is_empty() {
            return Err(SigningError::Signing(
                "provider returned an empty signature".to_string(),
            ));
        }
        log::debug!("provider produced a {}-byte signature", signature.len());
        self.assemble(content, &attributes, &signature)
    }

    fn assemble(
        &self,
        content: &SpcIndirectData,
        attributes: &AuthenticatedAttributes,
        signature: &[u8],
    ) -> SigningResult<Vec<u8>> {
        let digest_algorithm = digest_algorithm_identifier(self.algorithm);

        let mut body = Vec::new();
        body.extend_from_slice(DER_INTEGER_ONE);
        body.extend_from_slice(&asn1::tlv(TAG_SET, &digest_algorithm));
        body.extend_from_slice(&encap_content_info(content));
        body.extend_from_slice(&self.certificates_block()?);
        body.extend_from_slice(&self.signer_infos(attributes, &digest_algorithm, signature)?);
        let signed_data = asn1::tlv(TAG_SEQUENCE, &body);

        let mut outer = asn1::oid(oids::PKCS7_SIGNED_DATA);
        outer.extend_from_slice(&asn1::tlv(TAG_CONTEXT_0, &signed_data));
        Ok(asn1::tlv(TAG_SEQUENCE, &outer))
    }

    /// `certificates [0] IMPLICIT`: signer certificate first, then the
    /// intermediates in the order they were read.
    fn certificates_block(&self) -> SigningResult<Vec<u8>> {
        let mut body = cert_der(&self.signer_cert)?;
        for cert in &self.intermediates {
            body.extend_from_slice(&cert_der(cert)?);
        }
        Ok(asn1::tlv(TAG_CONTEXT_0, &body))
    }

    fn signer_infos(
        &self,
        attributes: &AuthenticatedAttributes,
        digest_algorithm: &[u8],
        signature: &[u8],
    ) -> SigningResult<Vec<u8>> {
        let mut body = Vec::new();
        body.extend_from_slice(DER_INTEGER_ONE);
        body.extend_from_slice(&self.issuer_and_serial()?);
        body.extend_from_slice(digest_algorithm);
        body.extend_from_slice(&attributes.to_implicit_der());
        body.extend_from_slice(&self.signature_algorithm()?);
        body.extend_from_slice(&asn1::tlv(TAG_OCTET_STRING, signature));
        let signer_info = asn1::tlv(TAG_SEQUENCE, &body);
        Ok(asn1::tlv(TAG_SET, &signer_info))
    }

    /// `IssuerAndSerialNumber` taken from the signer certificate.
    fn issuer_and_serial(&self) -> SigningResult<Vec<u8>> {
        let issuer = self
            .signer_cert
            .issuer_name()
            .to_der()
            .map_err(|e| SigningError::CertificateLoad(format!("issuer name: {e}")))?;
        let serial = self
            .signer_cert
            .serial_number()
            .to_bn()
            .map_err(|e| SigningError::CertificateLoad(format!("serial number: {e}")))?;
        let mut serial_bytes = serial.to_vec();
        if serial_bytes.is_empty() {
            serial_bytes.push(0);
        }
        // INTEGER is signed; keep large serials positive.
        if serial_bytes[0] & 0x80 != 0 {
            serial_bytes.insert(0, 0);
        }
        let mut body = issuer;
        body.extend_from_slice(&asn1::tlv(0x02, &serial_bytes));
        Ok(asn1::tlv(TAG_SEQUENCE, &body))
    }

    /// The digestEncryptionAlgorithm, chosen from the certificate's key
    /// type: rsaEncryption with NULL parameters for RSA, the matching
    /// ecdsa-with-* for EC keys.
    fn signature_algorithm(&self) -> SigningResult<Vec<u8>> {
        let key = self
            .signer_cert
            .public_key()
            .map_err(|e| SigningError::CertificateLoad(format!("public key: {e}")))?;
        let body = match key.id() {
            Id::RSA => {
                let mut body = asn1::oid(oids::RSA_ENCRYPTION);
                body.extend_from_slice(DER_NULL);
                body
            }
            Id::EC => asn1::oid(match self.algorithm {
                DigestAlgorithm::Sha1 => oids::ECDSA_WITH_SHA1,
                DigestAlgorithm::Sha256 => oids::ECDSA_WITH_SHA256,
                DigestAlgorithm::Sha384 => oids::ECDSA_WITH_SHA384,
                DigestAlgorithm::Sha512 => oids::ECDSA_WITH_SHA512,
            }),
            other => {
                return Err(SigningError::UnsupportedAlgorithm(format!(
                    "certificate key type {other:?} cannot sign Authenticode images"
                )))
            }
        };
        Ok(asn1::tlv(TAG_SEQUENCE, &body))
    }
}

/// `encapContentInfo` with the SPC indirect-data OID and the content under
/// an `[0] EXPLICIT` tag.
fn encap_content_info(content: &SpcIndirectData) -> Vec<u8> {
    let mut body = asn1::oid(oids::SPC_INDIRECT_DATA);
    body.extend_from_slice(&asn1::tlv(TAG_CONTEXT_0, content.as_der()));
    asn1::tlv(TAG_SEQUENCE, &body)
}

fn digest_algorithm_identifier(algorithm: DigestAlgorithm) -> Vec<u8> {
    let mut body = asn1::oid(algorithm.oid_der());
    body.extend_from_slice(DER_NULL);
    asn1::tlv(TAG_SEQUENCE, &body)
}

fn cert_der(cert: &X509) -> SigningResult<Vec<u8>> {
    cert.to_der()
        .map_err(|e| SigningError::CertificateLoad(format!("certificate DER: {e}")))
}
