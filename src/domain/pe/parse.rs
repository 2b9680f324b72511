//! PE/COFF parsing and structural validation.
//!
//! goblin does the header and section-table heavy lifting; the offsets used
//! for mutation (checksum field, certificate data-directory entry) are
//! computed from the raw bytes so the view survives buffer growth.

use goblin::pe::optional_header::{MAGIC_32, MAGIC_64};
use goblin::pe::PE;

use super::{
    align8, read_u16, read_u32, CertificateEntry, Image, PeFormat, SectionRegion,
};
use crate::infra::error::{SigningError, SigningResult};

const DOS_HEADER_SIZE: usize = 64;
const E_LFANEW_OFFSET: usize = 0x3c;
const PE_SIGNATURE_SIZE: usize = 4;
const COFF_HEADER_SIZE: usize = 20;
const CHECKSUM_OFFSET_IN_OPTIONAL: usize = 64;
const SECTION_HEADER_SIZE: usize = 40;
const CERT_TABLE_DIRECTORY_INDEX: usize = 4;

// Machine types with a fixed optional-header variant.
const MACHINE_I386: u16 = 0x014c;
const MACHINE_ARM: u16 = 0x01c0;
const MACHINE_ARMNT: u16 = 0x01c4;
const MACHINE_AMD64: u16 = 0x8664;
const MACHINE_ARM64: u16 = 0xaa64;
const MACHINE_RISCV64: u16 = 0x5064;
const MACHINE_LOONGARCH64: u16 = 0x6264;

fn invalid(message: impl Into<String>) -> SigningError {
    SigningError::InvalidImage(message.into())
}

pub(super) fn parse_image(mut data: Vec<u8>) -> SigningResult<Image> {
    if data.len() < DOS_HEADER_SIZE + PE_SIGNATURE_SIZE + COFF_HEADER_SIZE {
        return Err(invalid(format!(
            "file too small for DOS and PE headers ({} bytes)",
            data.len()
        )));
    }
    if &data[0..2] != b"MZ" {
        return Err(invalid("missing MZ signature"));
    }

    let pe_offset = read_u32(&data, E_LFANEW_OFFSET) as usize;
    if pe_offset % 4 != 0 {
        return Err(invalid(format!("e_lfanew {pe_offset:#x} is misaligned")));
    }
    if pe_offset < DOS_HEADER_SIZE
        || pe_offset + PE_SIGNATURE_SIZE + COFF_HEADER_SIZE + 2 > data.len()
    {
        return Err(invalid(format!("e_lfanew {pe_offset:#x} is out of range")));
    }
    if &data[pe_offset..pe_offset + PE_SIGNATURE_SIZE] != b"PE\0\0" {
        return Err(invalid("missing PE signature"));
    }

    // goblin validates the overall structure and gives us the section table;
    // everything offset-related below is recomputed from the raw bytes.
    let pe = PE::parse(&data).map_err(|e| invalid(format!("PE parsing failed: {e}")))?;

    let optional = pe
        .header
        .optional_header
        .ok_or_else(|| invalid("missing optional header"))?;
    let machine = pe.header.coff_header.machine;
    let magic = optional.standard_fields.magic;
    let format = match magic {
        MAGIC_32 => PeFormat::Pe32,
        MAGIC_64 => PeFormat::Pe32Plus,
        other => {
            return Err(invalid(format!(
                "optional header magic {other:#x} is neither PE32 nor PE32+"
            )))
        }
    };
    check_machine_magic(machine, format)?;

    let optional_offset = pe_offset + PE_SIGNATURE_SIZE + COFF_HEADER_SIZE;
    let optional_size = read_u16(&data, pe_offset + PE_SIGNATURE_SIZE + 16) as usize;
    if optional_offset + optional_size > data.len() {
        return Err(invalid("optional header extends past end of file"));
    }

    // Offsets of the fields the signer skips or rewrites. The CheckSum field
    // sits at +64 for both PE32 and PE32+; the data directories start at +96
    // or +112 respectively.
    let checksum_offset = optional_offset + CHECKSUM_OFFSET_IN_OPTIONAL;
    let (dir_count_offset, dir_array_offset) = match format {
        PeFormat::Pe32 => (optional_offset + 92, optional_offset + 96),
        PeFormat::Pe32Plus => (optional_offset + 108, optional_offset + 112),
    };
    if dir_array_offset > optional_offset + optional_size {
        return Err(invalid("optional header too small for data directories"));
    }
    let dir_count = read_u32(&data, dir_count_offset) as usize;
    if dir_count <= CERT_TABLE_DIRECTORY_INDEX {
        return Err(invalid(format!(
            "{dir_count} data directories do not cover the certificate table (index 4)"
        )));
    }
    let cert_dir_offset = dir_array_offset + CERT_TABLE_DIRECTORY_INDEX * 8;
    if dir_array_offset + dir_count * 8 > optional_offset + optional_size {
        return Err(invalid("data directories exceed the optional header"));
    }

    let size_of_headers = optional.windows_fields.size_of_headers as usize;
    let section_table_end = optional_offset
        + optional_size
        + pe.header.coff_header.number_of_sections as usize * SECTION_HEADER_SIZE;
    if section_table_end > data.len() {
        return Err(invalid("section table extends past end of file"));
    }
    if size_of_headers < section_table_end || size_of_headers > data.len() {
        return Err(invalid(format!(
            "SizeOfHeaders {size_of_headers:#x} is inconsistent with the header layout"
        )));
    }
    if cert_dir_offset + 8 > size_of_headers {
        return Err(invalid(
            "certificate data-directory entry lies outside the headers",
        ));
    }

    let sections = collect_sections(&pe, size_of_headers, data.len())?;
    let end_of_image = sections
        .last()
        .map_or(size_of_headers, |s| s.end().max(size_of_headers));

    let table = certificate_table_bounds(&data, cert_dir_offset, end_of_image)?;
    let entries = match table {
        Some((offset, size)) => walk_certificate_entries(&data, offset, size)?,
        None => Vec::new(),
    };

    // Unsigned images are padded so an appended certificate table starts on
    // the 8-byte boundary verifiers require; the padding is covered by the
    // digest. Signed images end on a boundary already (table offset and all
    // padded entry lengths are multiples of 8).
    if entries.is_empty() && data.len() % 8 != 0 {
        let padding = align8(data.len()) - data.len();
        log::debug!("zero-padding image by {padding} bytes to an 8-byte boundary");
        data.resize(data.len() + padding, 0);
    }

    log::debug!(
        "parsed {:?} image: machine {machine:#06x}, {} section(s), {} certificate entr{}",
        format,
        sections.len(),
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" },
    );

    Ok(Image {
        data,
        format,
        machine,
        checksum_offset,
        cert_dir_offset,
        size_of_headers,
        end_of_image,
        sections,
        entries,
    })
}

/// Machines with a well-known word width must carry the matching
/// optional-header magic; unknown machine types accept either.
fn check_machine_magic(machine: u16, format: PeFormat) -> SigningResult<()> {
    let expected = match machine {
        MACHINE_I386 | MACHINE_ARM | MACHINE_ARMNT => Some(PeFormat::Pe32),
        MACHINE_AMD64 | MACHINE_ARM64 | MACHINE_RISCV64 | MACHINE_LOONGARCH64 => {
            Some(PeFormat::Pe32Plus)
        }
        _ => None,
    };
    match expected {
        Some(expected) if expected != format => Err(invalid(format!(
            "machine type {machine:#06x} does not match optional-header format {format:?}"
        ))),
        _ => Ok(()),
    }
}

fn collect_sections(
    pe: &PE<'_>,
    size_of_headers: usize,
    file_len: usize,
) -> SigningResult<Vec<SectionRegion>> {
    let mut sections = Vec::with_capacity(pe.sections.len());
    for section in &pe.sections {
        if section.size_of_raw_data == 0 {
            continue;
        }
        let start = section.pointer_to_raw_data as usize;
        let len = section.size_of_raw_data as usize;
        let end = start
            .checked_add(len)
            .ok_or_else(|| invalid("section size overflows"))?;
        if end > file_len {
            return Err(invalid(format!(
                "section [{start:#x}..{end:#x}] extends past end of file ({file_len:#x})"
            )));
        }
        if start < size_of_headers {
            return Err(invalid(format!(
                "section at {start:#x} overlaps the headers"
            )));
        }
        sections.push(SectionRegion { start, len });
    }
    sections.sort_by_key(|s| s.start);
    for pair in sections.windows(2) {
        if pair[0].end() > pair[1].start {
            return Err(invalid(format!(
                "sections [{:#x}..{:#x}] and [{:#x}..{:#x}] overlap",
                pair[0].start,
                pair[0].end(),
                pair[1].start,
                pair[1].end()
            )));
        }
    }
    Ok(sections)
}

/// Validate the certificate-table directory entry. A present table must be
/// 8-byte aligned, must not overlap the image proper, and must extend exactly
/// to end-of-file: Authenticode appends entries in place, so a table followed
/// by other data cannot be grown without relocating it.
fn certificate_table_bounds(
    data: &[u8],
    cert_dir_offset: usize,
    end_of_image: usize,
) -> SigningResult<Option<(usize, usize)>> {
    let offset = read_u32(data, cert_dir_offset) as usize;
    let size = read_u32(data, cert_dir_offset + 4) as usize;
    if offset == 0 && size == 0 {
        return Ok(None);
    }
    if offset == 0 || size == 0 {
        return Err(invalid(format!(
            "half-empty certificate directory entry ({offset:#x}+{size:#x})"
        )));
    }
    if offset % 8 != 0 {
        return Err(invalid(format!(
            "certificate table at {offset:#x} is not 8-byte aligned"
        )));
    }
    if offset < end_of_image {
        return Err(invalid(format!(
            "certificate table at {offset:#x} overlaps image data ending at {end_of_image:#x}"
        )));
    }
    let end = offset
        .checked_add(size)
        .ok_or_else(|| invalid("certificate table size overflows"))?;
    if end > data.len() {
        return Err(invalid(format!(
            "certificate table [{offset:#x}..{end:#x}] extends past end of file"
        )));
    }
    if end < data.len() {
        return Err(invalid(format!(
            "certificate table ends at {end:#x} but the file ends at {:#x}; \
             tables not at end-of-file are not supported",
            data.len()
        )));
    }
    Ok(Some((offset, size)))
}

/// Walk the WIN_CERTIFICATE entries. Each dwLength covers the 8-byte header
/// and the payload; entries are aligned to 8 bytes, and the padded lengths
/// must add up to exactly the directory size.
fn walk_certificate_entries(
    data: &[u8],
    table_offset: usize,
    table_size: usize,
) -> SigningResult<Vec<CertificateEntry>> {
    let table_end = table_offset + table_size;
    let mut entries = Vec::new();
    let mut position = table_offset;
    while position < table_end {
        if position + 8 > table_end {
            return Err(invalid(format!(
                "truncated WIN_CERTIFICATE header at {position:#x}"
            )));
        }
        let length = read_u32(data, position);
        if (length as usize) < 8 {
            return Err(invalid(format!(
                "WIN_CERTIFICATE at {position:#x} declares length {length}"
            )));
        }
        let padded = align8(length as usize);
        if position + padded > table_end {
            return Err(invalid(format!(
                "WIN_CERTIFICATE at {position:#x} overruns the certificate table"
            )));
        }
        entries.push(CertificateEntry {
            offset: position,
            length,
            revision: read_u16(data, position + 4),
            cert_type: read_u16(data, position + 6),
        });
        position += padded;
    }
    Ok(entries)
}
