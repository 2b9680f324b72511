//! PE/COFF image model.
//!
//! `Image` owns the file bytes plus a parsed view of the offsets that matter
//! for signing: the optional-header `CheckSum` field, the certificate-table
//! data-directory entry, the section file ranges, and the certificate-table
//! entries already present. The view never borrows into the buffer, so the
//! buffer can grow when a signature is appended.

mod parse;

use std::io::Write;
use std::ops::Range;
use std::path::Path;

use crate::infra::error::{SigningError, SigningResult};

/// WIN_CERTIFICATE wRevision for current-revision entries.
pub const CERT_REVISION: u16 = 0x0200;
/// WIN_CERTIFICATE wCertificateType for PKCS#7 SignedData payloads.
pub const CERT_TYPE_PKCS_SIGNED_DATA: u16 = 0x0002;

/// Size of the WIN_CERTIFICATE header (dwLength, wRevision, wCertificateType).
const CERT_HEADER_SIZE: usize = 8;

/// Optional-header variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeFormat {
    Pe32,
    Pe32Plus,
}

/// A section's raw-data range in the file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SectionRegion {
    pub start: usize,
    pub len: usize,
}

impl SectionRegion {
    pub(crate) fn end(&self) -> usize {
        self.start + self.len
    }
}

/// One WIN_CERTIFICATE entry in the certificate table.
///
/// `length` is the dwLength field: header plus payload, excluding the
/// trailing padding that aligns the next entry to 8 bytes.
#[derive(Debug, Clone, Copy)]
pub struct CertificateEntry {
    pub offset: usize,
    pub length: u32,
    pub revision: u16,
    pub cert_type: u16,
}

impl CertificateEntry {
    fn payload_range(&self) -> Range<usize> {
        self.offset + CERT_HEADER_SIZE..self.offset + self.length as usize
    }
}

/// A loaded PE/COFF image.
#[derive(Debug)]
pub struct Image {
    pub(crate) data: Vec<u8>,
    pub(crate) format: PeFormat,
    pub(crate) machine: u16,
    pub(crate) checksum_offset: usize,
    pub(crate) cert_dir_offset: usize,
    pub(crate) size_of_headers: usize,
    /// End of the image proper: max of `SizeOfHeaders` and every section's
    /// raw-data end. Anything beyond it is overlay or certificate table.
    pub(crate) end_of_image: usize,
    pub(crate) sections: Vec<SectionRegion>,
    pub(crate) entries: Vec<CertificateEntry>,
}

impl Image {
    /// Read a PE/COFF file fully into memory and parse it.
    pub fn load(path: &Path) -> SigningResult<Self> {
        let data = std::fs::read(path)
            .map_err(|e| SigningError::Io(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(data)
    }

    /// Parse and validate an in-memory PE/COFF image.
    ///
    /// Rejects structurally broken inputs with `InvalidImage`; see the parser
    /// for the full list of checks. An unsigned image whose length is not a
    /// multiple of 8 is zero-padded so that an appended certificate table
    /// starts on the required 8-byte boundary.
    pub fn parse(data: Vec<u8>) -> SigningResult<Self> {
        parse::parse_image(data)
    }

    /// The full image buffer, including any certificate table.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> PeFormat {
        self.format
    }

    pub fn machine(&self) -> u16 {
        self.machine
    }

    /// Certificate-table entries currently present, in file order.
    pub fn entries(&self) -> &[CertificateEntry] {
        &self.entries
    }

    /// Payload of the `index`-th certificate entry, without the 8-byte
    /// WIN_CERTIFICATE header and without trailing padding.
    pub fn signature_payload(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).map(|e| &self.data[e.payload_range()])
    }

    /// The certificate-table region `(offset, size)` from data directory 4,
    /// or `None` when the image is unsigned.
    pub fn certificate_table(&self) -> Option<(usize, usize)> {
        let offset = read_u32(&self.data, self.cert_dir_offset) as usize;
        let size = read_u32(&self.data, self.cert_dir_offset + 4) as usize;
        if offset == 0 || size == 0 {
            None
        } else {
            Some((offset, size))
        }
    }

    /// The byte ranges covered by the Authenticode digest, in canonical
    /// order:
    ///
    /// 1. file start up to the `CheckSum` field,
    /// 2. after `CheckSum` up to the certificate-table directory entry,
    /// 3. after that entry to the end of the headers,
    /// 4. each section's raw data, ascending by file offset,
    /// 5. trailing data between the image proper and the certificate table
    ///    (or end of file when unsigned).
    ///
    /// The certificate table itself is never covered. The order is part of
    /// the signature contract; reordering yields a digest no verifier
    /// accepts.
    pub fn authenticode_regions(&self) -> Vec<Range<usize>> {
        let mut regions = Vec::with_capacity(self.sections.len() + 4);
        regions.push(0..self.checksum_offset);
        regions.push(self.checksum_offset + 4..self.cert_dir_offset);
        regions.push(self.cert_dir_offset + 8..self.size_of_headers);
        for section in &self.sections {
            regions.push(section.start..section.end());
        }
        let table_start = self
            .certificate_table()
            .map_or(self.data.len(), |(offset, _)| offset);
        if self.end_of_image < table_start {
            regions.push(self.end_of_image..table_start);
        }
        regions
    }

    /// Append a new certificate-table entry carrying `signature` (a DER
    /// PKCS#7 SignedData blob) and update the data-directory entry.
    ///
    /// An existing table is never cleared; the entry is appended after it and
    /// the directory size grows by the padded entry length.
    pub fn append_signature(&mut self, signature: &[u8]) -> SigningResult<()> {
        let length = u32::try_from(CERT_HEADER_SIZE + signature.len()).map_err(|_| {
            SigningError::Encoding("signature too large for a WIN_CERTIFICATE entry".to_string())
        })?;
        let padded = align8(length as usize);

        // Parsing guarantees the table, when present, ends at end-of-file,
        // and pads unsigned images to an 8-byte boundary.
        let entry_offset = self.data.len();
        debug_assert_eq!(entry_offset % 8, 0);

        self.data.reserve(padded);
        self.data.extend_from_slice(&length.to_le_bytes());
        self.data.extend_from_slice(&CERT_REVISION.to_le_bytes());
        self.data
            .extend_from_slice(&CERT_TYPE_PKCS_SIGNED_DATA.to_le_bytes());
        self.data.extend_from_slice(signature);
        self.data.extend_from_slice(&vec![0u8; padded - length as usize]);

        let (table_offset, table_size) = match self.certificate_table() {
            Some((offset, size)) => (offset, size + padded),
            None => (entry_offset, padded),
        };
        write_u32(&mut self.data, self.cert_dir_offset, table_offset as u32);
        write_u32(&mut self.data, self.cert_dir_offset + 4, table_size as u32);

        self.entries.push(CertificateEntry {
            offset: entry_offset,
            length,
            revision: CERT_REVISION,
            cert_type: CERT_TYPE_PKCS_SIGNED_DATA,
        });
        log::debug!(
            "appended certificate entry at {entry_offset:#x}, table now {table_offset:#x}+{table_size:#x}"
        );
        Ok(())
    }

    /// Recompute the optional-header `CheckSum` over the current buffer.
    ///
    /// The checksum field is excluded from the Authenticode digest, so
    /// refreshing it after appending a signature does not perturb the
    /// signature.
    pub fn update_checksum(&mut self) {
        let checksum = compute_checksum(&self.data, self.checksum_offset);
        write_u32(&mut self.data, self.checksum_offset, checksum);
        log::debug!("refreshed PE checksum: {checksum:#010x}");
    }

    /// Write the full image to `path`, atomically where the host supports
    /// it: the buffer goes to a temporary file in the target directory which
    /// is then renamed over the destination. The temporary file is removed
    /// if anything fails before the rename.
    pub fn write(&self, path: &Path) -> SigningResult<()> {
        write_atomic(path, &self.data)
    }

    /// Write the payload of the `index`-th certificate entry (the raw DER
    /// SignedData, without the WIN_CERTIFICATE header) to `path`.
    pub fn write_detached(&self, index: usize, path: &Path) -> SigningResult<()> {
        let payload = self.signature_payload(index).ok_or_else(|| {
            SigningError::InvalidImage(format!("no certificate-table entry at index {index}"))
        })?;
        write_atomic(path, payload)
    }
}

pub(crate) fn align8(value: usize) -> usize {
    (value + 7) & !7
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// PE checksum: fold little-endian 16-bit words with the checksum field
/// treated as zero, then add the file length.
fn compute_checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let mut sum: u32 = 0;
    let mut offset = 0;
    while offset + 1 < data.len() {
        if offset != checksum_offset && offset != checksum_offset + 2 {
            let word = u32::from(read_u16(data, offset));
            sum = sum.wrapping_add(word);
            sum = (sum & 0xffff) + (sum >> 16);
        }
        offset += 2;
    }
    sum = (sum & 0xffff) + (sum >> 16);
    sum.wrapping_add(offset as u32)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> SigningResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        SigningError::Io(format!(
            "failed to create temporary file in {}: {e}",
            dir.display()
        ))
    })?;
    tmp.write_all(bytes)
        .map_err(|e| SigningError::Io(format!("failed to write {}: {e}", path.display())))?;
    tmp.persist(path)
        .map_err(|e| SigningError::Io(format!("failed to persist {}: {e}", path.display())))?;
    Ok(())
}
