//! The signing workflow: one image, one key, one output.

use std::path::{Path, PathBuf};

use openssl::x509::X509;

use crate::adapters::{acquire_signer, KeyLocator};
use crate::domain::crypto::DigestAlgorithm;
use crate::domain::pe::Image;
use crate::domain::pkcs7::SignedDataBuilder;
use crate::domain::spc::SpcIndirectData;
use crate::infra::error::{SigningError, SigningResult};
use crate::services::AuthenticodeDigester;

/// The parsed configuration of a signing run, as handed in by the driver.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub input: PathBuf,
    /// Output path; defaults to `<input>.signed`, or `<input>.pk7` when
    /// detached.
    pub output: Option<PathBuf>,
    pub key: KeyLocator,
    /// Path to the signer's X.509 certificate (PEM).
    pub certificate: PathBuf,
    /// Optional PEM file of intermediate certificates to embed.
    pub additional_certs: Option<PathBuf>,
    /// Emit the raw DER SignedData instead of a signed image.
    pub detached: bool,
}

impl SignRequest {
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => {
                let mut name = self.input.as_os_str().to_os_string();
                name.push(if self.detached { ".pk7" } else { ".signed" });
                PathBuf::from(name)
            }
        }
    }
}

/// Runs a signing request end to end.
///
/// The pipeline is single-threaded and blocking: the only suspension points
/// are file I/O and the provider's sign operation, which may take as long as
/// a token or network round-trip needs. Any failure aborts the run before
/// the output path is created.
pub struct SignWorkflow {
    algorithm: DigestAlgorithm,
}

impl SignWorkflow {
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self { algorithm }
    }

    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Sign the image and write the attached or detached output. Returns
    /// the path written.
    pub fn run(&self, request: &SignRequest) -> SigningResult<PathBuf> {
        let mut image = Image::load(&request.input)?;
        let certificate = load_certificate(&request.certificate)?;
        let intermediates = match &request.additional_certs {
            Some(path) => load_certificate_stack(path)?,
            None => Vec::new(),
        };
        let signer = acquire_signer(&request.key)?;

        // 1. Authenticode digest over the covered regions.
        let digest = AuthenticodeDigester::new(self.algorithm).digest(&image);
        log::info!(
            "computed {} image digest over {} regions",
            self.algorithm,
            image.authenticode_regions().len()
        );

        // 2. The signed content and the SignedData around it.
        let content = SpcIndirectData::encode(&digest)?;
        let signed_data = SignedDataBuilder::new(certificate, self.algorithm)
            .with_intermediates(intermediates)
            .build(&content, signer.as_ref())?;
        log::info!("assembled SignedData ({} bytes)", signed_data.len());

        // 3. Splice into the certificate table and emit.
        image.append_signature(&signed_data)?;
        image.update_checksum();

        let output = request.output_path();
        if request.detached {
            image.write_detached(image.entries().len() - 1, &output)?;
        } else {
            image.write(&output)?;
        }
        log::info!(
            "wrote {} output to {}",
            if request.detached { "detached" } else { "signed" },
            output.display()
        );
        Ok(output)
    }
}

fn load_certificate(path: &Path) -> SigningResult<X509> {
    let bytes = std::fs::read(path).map_err(|e| {
        SigningError::CertificateLoad(format!("cannot read {}: {e}", path.display()))
    })?;
    X509::from_pem(&bytes).map_err(|e| {
        SigningError::CertificateLoad(format!("cannot parse {}: {e}", path.display()))
    })
}

/// Read every certificate from a PEM file, preserving file order.
fn load_certificate_stack(path: &Path) -> SigningResult<Vec<X509>> {
    let bytes = std::fs::read(path).map_err(|e| {
        SigningError::CertificateLoad(format!("cannot read {}: {e}", path.display()))
    })?;
    let certs = X509::stack_from_pem(&bytes).map_err(|e| {
        SigningError::CertificateLoad(format!("cannot parse {}: {e}", path.display()))
    })?;
    if certs.is_empty() {
        return Err(SigningError::CertificateLoad(format!(
            "{} contains no certificates",
            path.display()
        )));
    }
    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::KeyFormat;

    fn request(detached: bool, output: Option<&str>) -> SignRequest {
        SignRequest {
            input: PathBuf::from("boot/grubx64.efi"),
            output: output.map(PathBuf::from),
            key: KeyLocator::file("keys/db.key", KeyFormat::Pem),
            certificate: PathBuf::from("keys/db.crt"),
            additional_certs: None,
            detached,
        }
    }

    #[test]
    fn default_output_names() {
        assert_eq!(
            request(false, None).output_path(),
            PathBuf::from("boot/grubx64.efi.signed")
        );
        assert_eq!(
            request(true, None).output_path(),
            PathBuf::from("boot/grubx64.efi.pk7")
        );
    }

    #[test]
    fn explicit_output_wins() {
        assert_eq!(
            request(false, Some("out.efi")).output_path(),
            PathBuf::from("out.efi")
        );
    }
}
