//! Command-line driver: sign a UEFI boot image for Secure Boot.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use miette::Result;
use uefisign::{sign_image, DigestAlgorithm, KeyFormat, KeyLocator, SignRequest};

#[derive(Parser)]
#[command(name = "uefisign")]
#[command(about = "Sign a UEFI PE/COFF boot image for use with Secure Boot")]
#[command(long_about = "
Sign a UEFI PE/COFF boot image for use with Secure Boot.

EXAMPLES:
    # Sign with an on-disk key, write <image>.signed
    uefisign --key db.key --cert db.crt grubx64.efi

    # Embed an intermediate chain and pick the output path
    uefisign --key db.key --cert db.crt --addcert chain.pem \\
             --output grubx64.efi.signed grubx64.efi

    # Detached signature (raw PKCS#7 DER, written to <image>.pk7)
    uefisign --key db.key --cert db.crt --detached grubx64.efi

    # Key held by an external provider
    uefisign --keyform external --provider vault \\
             --key 'vault:secure-boot:db-key' --cert db.crt grubx64.efi

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging filter (overrides --verbose)
")]
#[command(version)]
struct Cli {
    /// PE/COFF image to sign
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Signing key: a PEM/DER file path, or a provider-specific locator
    /// with --keyform external
    #[arg(short, long, value_name = "KEY")]
    key: String,

    /// Signer's X.509 certificate (PEM)
    #[arg(short, long, value_name = "FILE")]
    cert: PathBuf,

    /// PEM file with intermediate certificates to embed
    #[arg(short = 'a', long, value_name = "FILE")]
    addcert: Option<PathBuf>,

    /// Output path (default: <IMAGE>.signed, or <IMAGE>.pk7 when detached)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write a detached signature instead of a signed image
    #[arg(short, long)]
    detached: bool,

    /// External cryptographic provider holding the key
    #[arg(short = 'e', long, visible_alias = "engine", value_name = "NAME")]
    provider: Option<String>,

    /// How to interpret the key argument
    #[arg(short = 'f', long, value_enum, ignore_case = true, default_value = "pem")]
    keyform: KeyFormArg,

    /// Digest algorithm for the image hash
    #[arg(long, value_enum, ignore_case = true, default_value = "sha256")]
    digest: DigestArg,

    /// Enable informational diagnostics
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy)]
enum KeyFormArg {
    Pem,
    Der,
    External,
}

impl From<KeyFormArg> for KeyFormat {
    fn from(arg: KeyFormArg) -> Self {
        match arg {
            KeyFormArg::Pem => KeyFormat::Pem,
            KeyFormArg::Der => KeyFormat::Der,
            KeyFormArg::External => KeyFormat::External,
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum DigestArg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl From<DigestArg> for DigestAlgorithm {
    fn from(arg: DigestArg) -> Self {
        match arg {
            DigestArg::Sha1 => DigestAlgorithm::Sha1,
            DigestArg::Sha256 => DigestAlgorithm::Sha256,
            DigestArg::Sha384 => DigestAlgorithm::Sha384,
            DigestArg::Sha512 => DigestAlgorithm::Sha512,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let request = SignRequest {
        input: cli.image,
        output: cli.output,
        key: KeyLocator {
            locator: cli.key,
            format: cli.keyform.into(),
            provider: cli.provider,
        },
        certificate: cli.cert,
        additional_certs: cli.addcert,
        detached: cli.detached,
    };

    let output = sign_image(&request, cli.digest.into()).map_err(miette::Report::new)?;
    log::info!("signing complete: {}", output.display());
    Ok(())
}
