//! The library-archive (v1) container: build and inspect over in-memory
//! byte buffers. Reading and writing actual files is the packaging
//! collaborator's job; the core only defines the layout and checks its
//! invariants.
//!
//! Layout: a header, a table of contents of fixed 48-byte entries, then
//! aligned chunk data. v1 supports no compression. Checksums and content
//! hashes are FNV-1a 64; equal content hashes identify dedup candidates and
//! duplicate chunks share their first copy's data.

use std::fmt;

use strum::FromRepr;

/// Fixed size of one TOC entry in bytes.
pub const TOC_ENTRY_SIZE: u32 = 48;

pub const FORMAT_MAJOR: u16 = 1;
pub const FORMAT_MINOR: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u16)]
pub enum ChunkKind {
    Manifest = 1,
    StringTable = 2,
    SymbolIndex = 3,
    TypeMeta = 4,
    OirArchive = 5,
    ObjectArchive = 6,
    Debug = 7,
    Reserved = 0x7FFF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u16)]
pub enum Lane {
    Global = 0,
    Pcore = 1,
    Prt = 2,
    Pstd = 3,
    VendorBegin = 0x8000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u16)]
pub enum Compression {
    None = 0,
}

/// One chunk to pack.
#[derive(Debug, Clone)]
pub struct ChunkPayload {
    pub kind: ChunkKind,
    pub lane: Lane,
    pub alignment: u32,
    pub compression: Compression,
    pub bytes: Vec<u8>,
}

impl ChunkPayload {
    #[must_use]
    pub fn new(kind: ChunkKind, lane: Lane, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            lane,
            alignment: 8,
            compression: Compression::None,
            bytes,
        }
    }
}

/// Decoded header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub format_major: u16,
    pub format_minor: u16,
    pub flags: u32,
    pub feature_bits: u64,
    pub target_triple: String,
    pub toc_offset: u64,
    pub toc_entry_size: u32,
    pub toc_entry_count: u32,
    pub chunk_data_offset: u64,
    pub file_size: u64,
}

/// Decoded TOC entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRecord {
    pub kind: ChunkKind,
    pub lane: Lane,
    pub alignment: u32,
    pub compression: Compression,
    pub offset: u64,
    pub size: u64,
    pub checksum: u64,
    pub content_hash: u64,
    pub deduplicated: bool,
}

/// The manifest chunk payload, serialized as JSON.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub target_triple: String,
    pub feature_bits: u64,
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub target_triple: String,
    pub feature_bits: u64,
    pub flags: u32,
    pub chunks: Vec<ChunkPayload>,
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub bytes: Vec<u8>,
    pub header: HeaderInfo,
    pub records: Vec<ChunkRecord>,
}

#[derive(Debug, Clone)]
pub struct InspectOutput {
    pub header: HeaderInfo,
    pub records: Vec<ChunkRecord>,
}

/// Errors produced while decoding or validating an archive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    Truncated { need: usize, have: usize },
    BadVersion { major: u16, minor: u16 },
    BadEnum { field: &'static str, value: u16 },
    BadUtf8,
    BadAlignment { index: usize, offset: u64, alignment: u32 },
    ChecksumMismatch { index: usize },
    SizeMismatch { declared: u64, actual: u64 },
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { need, have } => {
                write!(f, "archive truncated: need {need} bytes, have {have}")
            }
            Self::BadVersion { major, minor } => {
                write!(f, "unsupported archive format version {major}.{minor}")
            }
            Self::BadEnum { field, value } => {
                write!(f, "invalid {field} value {value}")
            }
            Self::BadUtf8 => f.write_str("target triple is not valid UTF-8"),
            Self::BadAlignment {
                index,
                offset,
                alignment,
            } => write!(
                f,
                "chunk #{index} offset {offset} violates alignment {alignment}"
            ),
            Self::ChecksumMismatch { index } => write!(f, "chunk #{index} checksum mismatch"),
            Self::SizeMismatch { declared, actual } => {
                write!(f, "file size field {declared} does not match buffer length {actual}")
            }
        }
    }
}

impl std::error::Error for ArchiveError {}

/// FNV-1a 64-bit over a byte slice.
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
}

/// Builds a v1 archive buffer.
#[must_use]
pub fn build_archive(opt: &BuildOptions) -> BuildOutput {
    let triple = opt.target_triple.as_bytes();
    let header_size = 2 + 2 + 4 + 8 + 2 + triple.len() + 8 + 4 + 4 + 8 + 8;
    let toc_offset = header_size as u64;
    let toc_entry_count = u32::try_from(opt.chunks.len()).expect("too many chunks");
    let toc_size = u64::from(TOC_ENTRY_SIZE) * u64::from(toc_entry_count);
    let chunk_data_start = toc_offset + toc_size;

    // lay out chunk data with alignment and content-hash dedup
    let mut data = Writer { buf: Vec::new() };
    let mut records: Vec<ChunkRecord> = Vec::new();
    let mut placed: Vec<(u64, u64, u64)> = Vec::new(); // (content_hash, offset, size)

    for chunk in &opt.chunks {
        let align = u64::from(chunk.alignment.max(1));
        let checksum = fnv1a(&chunk.bytes);
        let content_hash = checksum;
        let size = chunk.bytes.len() as u64;

        let dedup_hit = placed
            .iter()
            .find(|(h, _, s)| *h == content_hash && *s == size)
            .copied();

        let (offset, deduplicated) = match dedup_hit {
            Some((_, off, _)) => (off, true),
            None => {
                // chunk offsets are absolute; align within the final buffer
                loop {
                    let abs = chunk_data_start + data.buf.len() as u64;
                    if abs % align == 0 {
                        break;
                    }
                    data.u8(0);
                }
                let abs = chunk_data_start + data.buf.len() as u64;
                data.buf.extend_from_slice(&chunk.bytes);
                placed.push((content_hash, abs, size));
                (abs, false)
            }
        };

        records.push(ChunkRecord {
            kind: chunk.kind,
            lane: chunk.lane,
            alignment: chunk.alignment,
            compression: chunk.compression,
            offset,
            size,
            checksum,
            content_hash,
            deduplicated,
        });
    }

    let file_size = chunk_data_start + data.buf.len() as u64;

    let mut w = Writer {
        buf: Vec::with_capacity(file_size as usize),
    };
    w.u16(FORMAT_MAJOR);
    w.u16(FORMAT_MINOR);
    w.u32(opt.flags);
    w.u64(opt.feature_bits);
    w.u16(u16::try_from(triple.len()).expect("triple too long"));
    w.buf.extend_from_slice(triple);
    w.u64(toc_offset);
    w.u32(TOC_ENTRY_SIZE);
    w.u32(toc_entry_count);
    w.u64(chunk_data_start);
    w.u64(file_size);

    debug_assert_eq!(w.buf.len() as u64, toc_offset);

    for r in &records {
        let before = w.buf.len();
        w.u16(r.kind as u16);
        w.u16(r.lane as u16);
        w.u32(r.alignment);
        w.u16(r.compression as u16);
        w.u16(0); // reserved
        w.u64(r.offset);
        w.u64(r.size);
        w.u64(r.checksum);
        w.u64(r.content_hash);
        w.u8(u8::from(r.deduplicated));
        w.u8(0);
        w.u8(0);
        w.u8(0);
        debug_assert_eq!(w.buf.len() - before, TOC_ENTRY_SIZE as usize);
    }

    w.buf.extend_from_slice(&data.buf);

    let header = HeaderInfo {
        format_major: FORMAT_MAJOR,
        format_minor: FORMAT_MINOR,
        flags: opt.flags,
        feature_bits: opt.feature_bits,
        target_triple: opt.target_triple.clone(),
        toc_offset,
        toc_entry_size: TOC_ENTRY_SIZE,
        toc_entry_count,
        chunk_data_offset: chunk_data_start,
        file_size,
    };

    BuildOutput {
        bytes: w.buf,
        header,
        records,
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ArchiveError> {
        if self.pos + n > self.buf.len() {
            return Err(ArchiveError::Truncated {
                need: self.pos + n,
                have: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, ArchiveError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("2 bytes")))
    }
    fn u32(&mut self) -> Result<u32, ArchiveError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }
    fn u64(&mut self) -> Result<u64, ArchiveError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }
    fn u8(&mut self) -> Result<u8, ArchiveError> {
        Ok(self.take(1)?[0])
    }
}

/// Decodes an archive buffer and validates checksums, alignment, and size
/// fields.
pub fn inspect_archive(bytes: &[u8]) -> Result<InspectOutput, ArchiveError> {
    let mut r = Reader { buf: bytes, pos: 0 };

    let format_major = r.u16()?;
    let format_minor = r.u16()?;
    if format_major != FORMAT_MAJOR {
        return Err(ArchiveError::BadVersion {
            major: format_major,
            minor: format_minor,
        });
    }
    let flags = r.u32()?;
    let feature_bits = r.u64()?;
    let triple_len = r.u16()? as usize;
    let target_triple = std::str::from_utf8(r.take(triple_len)?)
        .map_err(|_| ArchiveError::BadUtf8)?
        .to_owned();
    let toc_offset = r.u64()?;
    let toc_entry_size = r.u32()?;
    let toc_entry_count = r.u32()?;
    let chunk_data_offset = r.u64()?;
    let file_size = r.u64()?;

    if file_size != bytes.len() as u64 {
        return Err(ArchiveError::SizeMismatch {
            declared: file_size,
            actual: bytes.len() as u64,
        });
    }

    let mut records = Vec::with_capacity(toc_entry_count as usize);
    let mut toc = Reader {
        buf: bytes,
        pos: usize::try_from(toc_offset).expect("offset fits"),
    };
    for index in 0..toc_entry_count as usize {
        let kind_raw = toc.u16()?;
        let kind = ChunkKind::from_repr(kind_raw).ok_or(ArchiveError::BadEnum {
            field: "chunk kind",
            value: kind_raw,
        })?;
        let lane_raw = toc.u16()?;
        let lane = Lane::from_repr(lane_raw).ok_or(ArchiveError::BadEnum {
            field: "lane",
            value: lane_raw,
        })?;
        let alignment = toc.u32()?;
        let comp_raw = toc.u16()?;
        let compression = Compression::from_repr(comp_raw).ok_or(ArchiveError::BadEnum {
            field: "compression",
            value: comp_raw,
        })?;
        let _reserved = toc.u16()?;
        let offset = toc.u64()?;
        let size = toc.u64()?;
        let checksum = toc.u64()?;
        let content_hash = toc.u64()?;
        let deduplicated = toc.u8()? != 0;
        let _pad = toc.take(3)?;

        if alignment != 0 && offset % u64::from(alignment) != 0 {
            return Err(ArchiveError::BadAlignment {
                index,
                offset,
                alignment,
            });
        }

        let lo = usize::try_from(offset).expect("offset fits");
        let hi = lo + usize::try_from(size).expect("size fits");
        if hi > bytes.len() {
            return Err(ArchiveError::Truncated {
                need: hi,
                have: bytes.len(),
            });
        }
        if fnv1a(&bytes[lo..hi]) != checksum {
            return Err(ArchiveError::ChecksumMismatch { index });
        }

        records.push(ChunkRecord {
            kind,
            lane,
            alignment,
            compression,
            offset,
            size,
            checksum,
            content_hash,
            deduplicated,
        });
    }

    let _ = toc_entry_size;

    Ok(InspectOutput {
        header: HeaderInfo {
            format_major,
            format_minor,
            flags,
            feature_bits,
            target_triple,
            toc_offset,
            toc_entry_size,
            toc_entry_count,
            chunk_data_offset,
            file_size,
        },
        records,
    })
}
