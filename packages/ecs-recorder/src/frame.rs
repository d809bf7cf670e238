//! Binary frame format: fixed header, CRC32 trailer, and the TLV
//! section encoding used inside a frame's payload.
//!
//! Little-endian throughout, with a `crc32fast` checksum trailer over a
//! raw frame stream rather than a schema'd data file.

use std::io::{Read, Write};

use crc32fast::Hasher;

use crate::error::{RecorderError, RecorderResult};

pub const MAGIC: [u8; 4] = *b"ECSF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Keyframe = 0,
    Delta = 1,
}

impl FrameType {
    fn from_byte(b: u8) -> RecorderResult<Self> {
        match b {
            0 => Ok(FrameType::Keyframe),
            1 => Ok(FrameType::Delta),
            other => Err(RecorderError::CorruptFrame(format!(
                "unknown frame_type byte {other}"
            ))),
        }
    }
}

/// Section tags inside a frame's TLV payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionTag {
    EntityHeaderChunk = 0,
    ComponentChunk = 1,
    ManagedComponent = 2,
    DestructionLog = 3,
    EventStream = 4,
}

impl SectionTag {
    fn from_byte(b: u8) -> RecorderResult<Self> {
        match b {
            0 => Ok(SectionTag::EntityHeaderChunk),
            1 => Ok(SectionTag::ComponentChunk),
            2 => Ok(SectionTag::ManagedComponent),
            3 => Ok(SectionTag::DestructionLog),
            4 => Ok(SectionTag::EventStream),
            other => Err(RecorderError::CorruptFrame(format!(
                "unknown section tag byte {other}"
            ))),
        }
    }
}

/// Appends a `{tag: u8, len: u32, body}` record to `buf`.
pub fn write_section(buf: &mut Vec<u8>, tag: SectionTag, body: &[u8]) {
    buf.push(tag as u8);
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);
}

/// Parses every section out of a frame's payload in order.
pub fn parse_sections(payload: &[u8]) -> RecorderResult<Vec<(SectionTag, &[u8])>> {
    let mut sections = Vec::new();
    let mut cursor = 0usize;
    while cursor < payload.len() {
        if cursor + 5 > payload.len() {
            return Err(RecorderError::CorruptFrame(
                "truncated section header".into(),
            ));
        }
        let tag = SectionTag::from_byte(payload[cursor])?;
        let len = u32::from_le_bytes(payload[cursor + 1..cursor + 5].try_into().unwrap()) as usize;
        cursor += 5;
        if cursor + len > payload.len() {
            return Err(RecorderError::CorruptFrame(
                "truncated section body".into(),
            ));
        }
        sections.push((tag, &payload[cursor..cursor + len]));
        cursor += len;
    }
    Ok(sections)
}

/// Writes one complete frame: header, payload, and a CRC32 trailer over the
/// payload bytes.
pub fn write_frame(
    writer: &mut impl Write,
    frame_type: FrameType,
    tick: u64,
    base_tick: u64,
    payload: &[u8],
) -> RecorderResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[frame_type as u8])?;
    writer.write_all(&tick.to_le_bytes())?;
    writer.write_all(&base_tick.to_le_bytes())?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(payload)?;

    let mut hasher = Hasher::new();
    hasher.update(payload);
    writer.write_all(&hasher.finalize().to_le_bytes())?;
    Ok(())
}

pub struct ParsedFrame {
    pub frame_type: FrameType,
    pub tick: u64,
    pub base_tick: u64,
    pub payload: Vec<u8>,
}

/// Outcome of reading one frame. `Corrupt` is a normal return value, not an
/// error: the flight recorder's failure policy returns `false` from
/// `read_next_frame` on truncation or checksum mismatch rather than
/// throwing.
pub enum FrameReadOutcome {
    Eof,
    Frame(ParsedFrame),
    Corrupt(String),
}

/// Reads one frame, validating magic, length, and checksum.
pub fn read_one_frame(reader: &mut impl Read) -> RecorderResult<FrameReadOutcome> {
    let mut magic = [0u8; 4];
    match read_exact_or_eof(reader, &mut magic)? {
        false => return Ok(FrameReadOutcome::Eof),
        true => {}
    }
    if magic != MAGIC {
        return Ok(FrameReadOutcome::Corrupt(format!(
            "bad magic {magic:?}"
        )));
    }

    let mut rest_header = [0u8; 1 + 8 + 8 + 4];
    if !read_exact_or_eof(reader, &mut rest_header)? {
        return Ok(FrameReadOutcome::Corrupt("truncated frame header".into()));
    }
    let frame_type = match FrameType::from_byte(rest_header[0]) {
        Ok(ft) => ft,
        Err(_) => return Ok(FrameReadOutcome::Corrupt("bad frame_type byte".into())),
    };
    let tick = u64::from_le_bytes(rest_header[1..9].try_into().unwrap());
    let base_tick = u64::from_le_bytes(rest_header[9..17].try_into().unwrap());
    let payload_len = u32::from_le_bytes(rest_header[17..21].try_into().unwrap()) as usize;

    let mut payload = vec![0u8; payload_len];
    if !read_exact_or_eof(reader, &mut payload)? {
        return Ok(FrameReadOutcome::Corrupt("truncated payload".into()));
    }

    let mut trailer = [0u8; 4];
    if !read_exact_or_eof(reader, &mut trailer)? {
        return Ok(FrameReadOutcome::Corrupt("truncated checksum trailer".into()));
    }
    let expected = u32::from_le_bytes(trailer);
    let mut hasher = Hasher::new();
    hasher.update(&payload);
    if hasher.finalize() != expected {
        return Ok(FrameReadOutcome::Corrupt("checksum mismatch".into()));
    }

    Ok(FrameReadOutcome::Frame(ParsedFrame {
        frame_type,
        tick,
        base_tick,
        payload,
    }))
}

/// Like `Read::read_exact`, but treats a zero-byte read at the very start
/// as a clean EOF (`Ok(false)`) instead of an error, and a short read
/// mid-record as a genuine I/O error.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> RecorderResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return if filled == 0 {
                    Ok(false)
                } else {
                    Err(RecorderError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "short read mid-record",
                    )))
                };
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RecorderError::Io(e)),
        }
    }
    Ok(true)
}
