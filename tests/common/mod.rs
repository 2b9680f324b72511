//! Shared test fixtures: synthetic PE images and throwaway signing
//! identities.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder, X509};

/// File offset of the certificate-table data-directory entry in the
/// synthetic PE32+ image.
pub const PE32PLUS_CERT_DIR_OFFSET: usize = 0x128;
/// File offset of the optional-header CheckSum field (same for both
/// synthetic images).
pub const CHECKSUM_OFFSET: usize = 0xd8;

pub fn put_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// A minimal but well-formed 4096-byte PE32+ EFI application: one `.text`
/// section at 0x200..0x1000, headers declaring SizeOfHeaders = 0x200, no
/// certificate table.
pub fn minimal_pe32plus() -> Vec<u8> {
    let mut data = vec![0u8; 4096];

    // DOS header
    data[0] = b'M';
    data[1] = b'Z';
    put_u32(&mut data, 0x3c, 0x80); // e_lfanew

    // PE signature
    data[0x80..0x84].copy_from_slice(b"PE\0\0");

    // COFF file header
    put_u16(&mut data, 0x84, 0x8664); // machine: x86-64
    put_u16(&mut data, 0x86, 1); // sections
    put_u16(&mut data, 0x94, 0xf0); // optional header size
    put_u16(&mut data, 0x96, 0x0022); // executable, large-address-aware

    // Optional header (PE32+), starts at 0x98
    put_u16(&mut data, 0x98, 0x20b); // magic
    data[0x9a] = 14; // linker major
    put_u32(&mut data, 0x9c, 0xe00); // size of code
    put_u32(&mut data, 0xa8, 0x1000); // entry point
    put_u32(&mut data, 0xac, 0x1000); // base of code
    put_u64(&mut data, 0xb0, 0x1_4000_0000); // image base
    put_u32(&mut data, 0xb8, 0x1000); // section alignment
    put_u32(&mut data, 0xbc, 0x200); // file alignment
    put_u16(&mut data, 0xc0, 6); // os major
    put_u16(&mut data, 0xc8, 6); // subsystem major
    put_u32(&mut data, 0xd0, 0x2000); // size of image
    put_u32(&mut data, 0xd4, 0x200); // size of headers
    put_u32(&mut data, CHECKSUM_OFFSET, 0); // checksum
    put_u16(&mut data, 0xdc, 10); // subsystem: EFI application
    put_u64(&mut data, 0xe0, 0x10_0000); // stack reserve
    put_u64(&mut data, 0xe8, 0x1000); // stack commit
    put_u64(&mut data, 0xf0, 0x10_0000); // heap reserve
    put_u64(&mut data, 0xf8, 0x1000); // heap commit
    put_u32(&mut data, 0x104, 16); // number of data directories
    // data directories 0x108..0x188, all zero

    // Section table at 0x188: one .text section
    data[0x188..0x18d].copy_from_slice(b".text");
    put_u32(&mut data, 0x190, 0xe00); // virtual size
    put_u32(&mut data, 0x194, 0x1000); // virtual address
    put_u32(&mut data, 0x198, 0xe00); // size of raw data
    put_u32(&mut data, 0x19c, 0x200); // pointer to raw data
    put_u32(&mut data, 0x1ac, 0x6000_0020); // code | execute | read

    // Section payload: deterministic non-zero pattern
    for (i, byte) in data[0x200..0x1000].iter_mut().enumerate() {
        *byte = (i.wrapping_mul(31) >> 3) as u8;
    }

    data
}

/// The PE32 sibling of [`minimal_pe32plus`]: i386 machine, PE32 optional
/// header, same overall layout.
pub fn minimal_pe32() -> Vec<u8> {
    let mut data = vec![0u8; 4096];

    data[0] = b'M';
    data[1] = b'Z';
    put_u32(&mut data, 0x3c, 0x80);
    data[0x80..0x84].copy_from_slice(b"PE\0\0");

    put_u16(&mut data, 0x84, 0x014c); // machine: i386
    put_u16(&mut data, 0x86, 1);
    put_u16(&mut data, 0x94, 0xe0); // optional header size (PE32)
    put_u16(&mut data, 0x96, 0x0102);

    put_u16(&mut data, 0x98, 0x10b); // magic
    data[0x9a] = 14;
    put_u32(&mut data, 0x9c, 0xe00); // size of code
    put_u32(&mut data, 0xa8, 0x1000); // entry point
    put_u32(&mut data, 0xac, 0x1000); // base of code
    put_u32(&mut data, 0xb0, 0x2000); // base of data
    put_u32(&mut data, 0xb4, 0x40_0000); // image base
    put_u32(&mut data, 0xb8, 0x1000); // section alignment
    put_u32(&mut data, 0xbc, 0x200); // file alignment
    put_u16(&mut data, 0xc0, 6);
    put_u16(&mut data, 0xc8, 6);
    put_u32(&mut data, 0xd0, 0x2000); // size of image
    put_u32(&mut data, 0xd4, 0x200); // size of headers
    put_u32(&mut data, CHECKSUM_OFFSET, 0);
    put_u16(&mut data, 0xdc, 10); // subsystem
    put_u32(&mut data, 0xe0, 0x10_0000); // stack reserve
    put_u32(&mut data, 0xe4, 0x1000); // stack commit
    put_u32(&mut data, 0xe8, 0x10_0000); // heap reserve
    put_u32(&mut data, 0xec, 0x1000); // heap commit
    put_u32(&mut data, 0xf4, 16); // number of data directories
    // data directories 0xf8..0x178, all zero

    data[0x178..0x17d].copy_from_slice(b".text");
    put_u32(&mut data, 0x180, 0xe00);
    put_u32(&mut data, 0x184, 0x1000);
    put_u32(&mut data, 0x188, 0xe00);
    put_u32(&mut data, 0x18c, 0x200);
    put_u32(&mut data, 0x19c, 0x6000_0020);

    for (i, byte) in data[0x200..0x1000].iter_mut().enumerate() {
        *byte = (i.wrapping_mul(17) >> 2) as u8;
    }

    data
}

/// File offset of the certificate-table data-directory entry in the
/// synthetic PE32 image.
pub const PE32_CERT_DIR_OFFSET: usize = 0x118;

/// Generate a 2048-bit RSA key and a matching self-signed certificate.
pub fn test_identity(common_name: &str) -> (PKey<Private>, X509) {
    let rsa = Rsa::generate(2048).unwrap();
    let key = PKey::from_rsa(rsa).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(0x1001).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    (key, builder.build())
}

pub fn write_key_pem(dir: &Path, key: &PKey<Private>) -> PathBuf {
    let path = dir.join("signer.key");
    std::fs::write(&path, key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    path
}

pub fn write_cert_pem(dir: &Path, name: &str, certs: &[&X509]) -> PathBuf {
    let path = dir.join(name);
    let mut pem = Vec::new();
    for cert in certs {
        pem.extend_from_slice(&cert.to_pem().unwrap());
    }
    std::fs::write(&path, pem).unwrap();
    path
}
