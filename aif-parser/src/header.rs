//! Fixed 64-byte `.aif-bin` header (spec.md §6.1).

pub const MAGIC: [u8; 8] = [0x41, 0x49, 0x46, 0x42, 0x49, 0x4E, 0x00, 0x01];
pub const HEADER_LEN: usize = 64;
pub const ABSENT: u64 = 0xFFFF_FFFF_FFFF_FFFF;

#[derive(Debug, Clone, Copy)]
pub struct SectionOffsets {
    pub metadata: Option<u64>,
    pub original_raw: Option<u64>,
    pub content_chunks: Option<u64>,
    pub versions: Option<u64>,
    pub footer: Option<u64>,
    pub total_size: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub version: u32,
    pub offsets: SectionOffsets,
}

pub fn parse_header(buf: &[u8]) -> Option<Header> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    if buf[0..8] != MAGIC {
        return None;
    }
    let version = u32::from_le_bytes(buf[8..12].try_into().ok()?);
    // bytes 12..16 are padding, deliberately ignored.
    let read_offset = |at: usize| -> Option<u64> {
        let raw = u64::from_le_bytes(buf[at..at + 8].try_into().ok()?);
        Some(raw).filter(|v| *v != ABSENT)
    };
    let offsets = SectionOffsets {
        metadata: read_offset(16),
        original_raw: read_offset(24),
        content_chunks: read_offset(32),
        versions: read_offset(40),
        footer: read_offset(48),
        total_size: read_offset(56),
    };
    Some(Header { version, offsets })
}

/// Read the `u64` length prefix and payload bytes of a section located at
/// `offset` within `buf`. Returns `None` if the section's declared bounds
/// run past the end of the file.
pub fn read_section(buf: &[u8], offset: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let payload_start = start.checked_add(8)?;
    let len_bytes = buf.get(start..payload_start)?;
    let len = usize::try_from(u64::from_le_bytes(len_bytes.try_into().ok()?)).ok()?;
    let payload_end = payload_start.checked_add(len)?;
    buf.get(payload_start..payload_end)
}
