//! Chunked save state container
//!
//! A state is a fixed header followed by one chunk per component. Chunk bodies are bincode-encoded
//! component state; older chunk versions are migrated to the current layout before decoding.

use crate::smpc::SmpcSignal;
use bincode::config::{Fixint, LittleEndian};
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use thiserror::Error;

pub const BINCODE_CONFIG: bincode::config::Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_little_endian().with_fixed_int_encoding();

pub const HEADER_VERSION: i32 = 3;

const MAGIC: &[u8; 3] = b"YSS";
const LITTLE_ENDIAN: u8 = 1;

// Version 1 headers stop after the payload size
const HEADER_LEN_V1: usize = 0x0C;
const HEADER_LEN: usize = 0x14;
const SIZE_OFFSET: usize = 0x08;

const CHUNK_HEADER_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("data is not a save state")]
    NotSaveState,
    #[error("unsupported save state version {0}")]
    UnsupportedVersion(i32),
    #[error("save state was written on a host with different endianness")]
    Endianness,
    #[error("save state payload is {actual} bytes, header says {expected}")]
    SizeMismatch { expected: i64, actual: i64 },
    #[error("expected chunk '{expected}', found '{found}'")]
    ChunkTag { expected: String, found: String },
    #[error("unsupported version {version} for chunk '{tag}'")]
    UnsupportedChunkVersion { tag: String, version: i32 },
    #[error("error saving state: {source}")]
    Encode {
        #[from]
        source: EncodeError,
    },
    #[error("error loading state: {source}")]
    Decode {
        #[from]
        source: DecodeError,
    },
}

impl SaveStateError {
    /// Integer result code used by front-ends that predate structured errors.
    #[must_use]
    pub fn legacy_code(&self) -> i32 {
        match self {
            Self::NotSaveState | Self::SizeMismatch { .. } => -2,
            _ => -3,
        }
    }
}

/// Component chunks, in the order they appear in a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkTag {
    Cartridge,
    CdBlock,
    MasterSh2,
    SlaveSh2,
    Scsp,
    Scu,
    Smpc,
    Vdp1,
    Vdp2,
    Other,
}

impl ChunkTag {
    pub const ALL: [Self; 10] = [
        Self::Cartridge,
        Self::CdBlock,
        Self::MasterSh2,
        Self::SlaveSh2,
        Self::Scsp,
        Self::Scu,
        Self::Smpc,
        Self::Vdp1,
        Self::Vdp2,
        Self::Other,
    ];

    #[must_use]
    pub fn bytes(self) -> [u8; 4] {
        match self {
            Self::Cartridge => *b"CART",
            Self::CdBlock => *b"CS2 ",
            Self::MasterSh2 => *b"MSH2",
            Self::SlaveSh2 => *b"SSH2",
            Self::Scsp => *b"SCSP",
            Self::Scu => *b"SCU ",
            Self::Smpc => *b"SMPC",
            Self::Vdp1 => *b"VDP1",
            Self::Vdp2 => *b"VDP2",
            Self::Other => *b"OTHR",
        }
    }

    /// Version written for this chunk.
    #[must_use]
    pub fn version(self) -> i32 {
        match self {
            Self::MasterSh2 | Self::SlaveSh2 | Self::Smpc => 3,
            _ => 1,
        }
    }

    fn name(self) -> String {
        tag_name(&self.bytes())
    }
}

fn tag_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

pub struct StateWriter {
    buffer: Vec<u8>,
}

impl StateWriter {
    #[must_use]
    pub fn new(frame_counter: u32, movie_position: u32) -> Self {
        let mut buffer = Vec::with_capacity(4 * 1024 * 1024);
        buffer.extend_from_slice(MAGIC);
        buffer.push(LITTLE_ENDIAN);
        buffer.extend_from_slice(&HEADER_VERSION.to_le_bytes());
        // Payload size, patched in finish()
        buffer.extend_from_slice(&0_i32.to_le_bytes());
        buffer.extend_from_slice(&frame_counter.to_le_bytes());
        buffer.extend_from_slice(&movie_position.to_le_bytes());

        Self { buffer }
    }

    pub fn write_chunk(&mut self, tag: ChunkTag, body: &[u8]) {
        self.buffer.extend_from_slice(&tag.bytes());
        self.buffer.extend_from_slice(&tag.version().to_le_bytes());
        self.buffer.extend_from_slice(&(body.len() as i32).to_le_bytes());
        self.buffer.extend_from_slice(body);
    }

    /// Encode `value` with [`BINCODE_CONFIG`] and write it as the body of a chunk.
    ///
    /// # Errors
    ///
    /// Propagates encoding errors.
    pub fn encode_chunk<T: Encode>(
        &mut self,
        tag: ChunkTag,
        value: T,
    ) -> Result<(), SaveStateError> {
        let body = bincode::encode_to_vec(value, BINCODE_CONFIG)?;
        self.write_chunk(tag, &body);
        Ok(())
    }

    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        let payload_len = (self.buffer.len() - HEADER_LEN) as i32;
        self.buffer[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&payload_len.to_le_bytes());
        self.buffer
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub version: i32,
    pub body: &'a [u8],
}

pub struct StateReader<'a> {
    bytes: &'a [u8],
    position: usize,
    header_version: i32,
    frame_counter: u32,
    movie_position: u32,
}

impl<'a> StateReader<'a> {
    /// Validate the header of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the magic, endianness, header version or payload size is wrong.
    pub fn new(bytes: &'a [u8]) -> Result<Self, SaveStateError> {
        if bytes.len() < HEADER_LEN_V1 || &bytes[..3] != MAGIC {
            return Err(SaveStateError::NotSaveState);
        }

        if bytes[3] != LITTLE_ENDIAN {
            return Err(SaveStateError::Endianness);
        }

        let header_version = read_i32(bytes, 4);
        if !(1..=HEADER_VERSION).contains(&header_version) {
            return Err(SaveStateError::UnsupportedVersion(header_version));
        }

        let header_len = if header_version == 1 { HEADER_LEN_V1 } else { HEADER_LEN };
        if bytes.len() < header_len {
            return Err(SaveStateError::NotSaveState);
        }

        let expected = i64::from(read_i32(bytes, SIZE_OFFSET));
        let actual = (bytes.len() - header_len) as i64;
        if expected != actual {
            return Err(SaveStateError::SizeMismatch { expected, actual });
        }

        let (frame_counter, movie_position) = if header_version >= 2 {
            (read_u32(bytes, 0x0C), read_u32(bytes, 0x10))
        } else {
            (0, 0)
        };

        Ok(Self { bytes, position: header_len, header_version, frame_counter, movie_position })
    }

    #[must_use]
    pub fn header_version(&self) -> i32 {
        self.header_version
    }

    #[must_use]
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    #[must_use]
    pub fn movie_position(&self) -> u32 {
        self.movie_position
    }

    /// Read the next chunk, which must carry `expected`'s tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk is truncated, has a different tag, or has a version newer
    /// than this build writes.
    pub fn read_chunk(&mut self, expected: ChunkTag) -> Result<Chunk<'a>, SaveStateError> {
        let remaining = &self.bytes[self.position..];
        if remaining.len() < CHUNK_HEADER_LEN {
            return Err(SaveStateError::ChunkTag {
                expected: expected.name(),
                found: tag_name(&remaining[..remaining.len().min(4)]),
            });
        }

        if remaining[..4] != expected.bytes() {
            return Err(SaveStateError::ChunkTag {
                expected: expected.name(),
                found: tag_name(&remaining[..4]),
            });
        }

        let version = read_i32(remaining, 4);
        if version < 1 || version > expected.version() {
            return Err(SaveStateError::UnsupportedChunkVersion { tag: expected.name(), version });
        }

        let size = read_i32(remaining, 8);
        let body_len = remaining.len() - CHUNK_HEADER_LEN;
        if size < 0 || size as usize > body_len {
            return Err(SaveStateError::SizeMismatch {
                expected: i64::from(size),
                actual: body_len as i64,
            });
        }

        let body = &remaining[CHUNK_HEADER_LEN..CHUNK_HEADER_LEN + size as usize];
        self.position += CHUNK_HEADER_LEN + size as usize;

        log::trace!("Read chunk '{}' version {version}, {size} bytes", expected.name());

        Ok(Chunk { version, body })
    }
}

/// Decode a whole chunk body.
///
/// # Errors
///
/// Propagates decoding errors.
pub fn decode_body<T: Decode<()>>(body: &[u8]) -> Result<T, SaveStateError> {
    let (value, _) = bincode::decode_from_slice(body, BINCODE_CONFIG)?;
    Ok(value)
}

fn append_default<T: Encode>(mut body: Vec<u8>, value: T) -> Result<Vec<u8>, SaveStateError> {
    body.extend(bincode::encode_to_vec(value, BINCODE_CONFIG)?);
    Ok(body)
}

// SH-2 chunk bodies are (cpu, overshoot cycles, pending input capture). Version 1 only stored the
// CPU; version 2 added the overshoot.

/// # Errors
///
/// Propagates encoding errors.
pub fn sh2_v1_to_v2(body: Vec<u8>) -> Result<Vec<u8>, SaveStateError> {
    append_default(body, 0_u32)
}

/// # Errors
///
/// Propagates encoding errors.
pub fn sh2_v2_to_v3(body: Vec<u8>) -> Result<Vec<u8>, SaveStateError> {
    append_default(body, false)
}

/// Bring an SH-2 chunk body of any supported version up to the current layout.
///
/// # Errors
///
/// Propagates encoding errors.
pub fn migrate_sh2(version: i32, body: &[u8]) -> Result<Vec<u8>, SaveStateError> {
    let mut body = body.to_vec();
    if version < 2 {
        body = sh2_v1_to_v2(body)?;
    }
    if version < 3 {
        body = sh2_v2_to_v3(body)?;
    }
    Ok(body)
}

/// Version 3 added the frame counter and the queued signals to the end of the SMPC state.
///
/// # Errors
///
/// Propagates encoding errors.
pub fn smpc_v2_to_v3(body: Vec<u8>) -> Result<Vec<u8>, SaveStateError> {
    append_default(body, (0_u32, Vec::<SmpcSignal>::new()))
}

/// # Errors
///
/// Returns an error for version 1 bodies, which no longer load.
pub fn migrate_smpc(version: i32, body: &[u8]) -> Result<Vec<u8>, SaveStateError> {
    match version {
        1 => Err(SaveStateError::UnsupportedChunkVersion {
            tag: ChunkTag::Smpc.name(),
            version,
        }),
        2 => smpc_v2_to_v3(body.to_vec()),
        _ => Ok(body.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn header_round_trip() {
        let mut writer = StateWriter::new(1234, 56);
        writer.write_chunk(ChunkTag::Cartridge, &[]);
        writer.write_chunk(ChunkTag::CdBlock, &[1, 2, 3]);
        let bytes = writer.finish();

        assert_eq!(&bytes[..4], b"YSS\x01");
        assert_eq!(read_i32(&bytes, 4), HEADER_VERSION);
        assert_eq!(read_i32(&bytes, 8) as usize, bytes.len() - HEADER_LEN);

        let mut reader = StateReader::new(&bytes).unwrap();
        assert_eq!(reader.frame_counter(), 1234);
        assert_eq!(reader.movie_position(), 56);

        let cart = reader.read_chunk(ChunkTag::Cartridge).unwrap();
        assert!(cart.body.is_empty());
        let cs2 = reader.read_chunk(ChunkTag::CdBlock).unwrap();
        assert_eq!(cs2.version, 1);
        assert_eq!(cs2.body, &[1, 2, 3]);
    }

    #[test]
    fn rejects_bad_headers() {
        let err = StateReader::new(b"ABC\x01\x03\x00\x00\x00\x00\x00\x00\x00").err().unwrap();
        assert!(matches!(err, SaveStateError::NotSaveState));
        assert_eq!(err.legacy_code(), -2);

        let mut bytes = StateWriter::new(0, 0).finish();
        bytes[3] = 0;
        let err = StateReader::new(&bytes).err().unwrap();
        assert!(matches!(err, SaveStateError::Endianness));
        assert_eq!(err.legacy_code(), -3);

        let mut bytes = StateWriter::new(0, 0).finish();
        bytes[4] = 4;
        assert!(matches!(StateReader::new(&bytes), Err(SaveStateError::UnsupportedVersion(4))));

        let mut bytes = StateWriter::new(0, 0).finish();
        bytes.push(0);
        let err = StateReader::new(&bytes).err().unwrap();
        assert!(matches!(err, SaveStateError::SizeMismatch { expected: 0, actual: 1 }));
        assert_eq!(err.legacy_code(), -2);
    }

    #[test]
    fn version_1_header_has_no_counters() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"YSS\x01");
        bytes.extend_from_slice(&1_i32.to_le_bytes());
        bytes.extend_from_slice(&0_i32.to_le_bytes());

        let reader = StateReader::new(&bytes).unwrap();
        assert_eq!(reader.header_version(), 1);
        assert_eq!(reader.frame_counter(), 0);
    }

    #[test]
    fn chunk_tag_and_version_checks() {
        let mut writer = StateWriter::new(0, 0);
        writer.write_chunk(ChunkTag::Scsp, &[0]);
        let bytes = writer.finish();

        let mut reader = StateReader::new(&bytes).unwrap();
        let err = reader.read_chunk(ChunkTag::Scu).err().unwrap();
        assert!(matches!(err, SaveStateError::ChunkTag { .. }));
        assert_eq!(err.legacy_code(), -3);

        let mut bytes = bytes;
        // Chunk version field of the SCSP chunk
        bytes[HEADER_LEN + 4] = 2;
        let mut reader = StateReader::new(&bytes).unwrap();
        assert!(matches!(
            reader.read_chunk(ChunkTag::Scsp),
            Err(SaveStateError::UnsupportedChunkVersion { version: 2, .. })
        ));
    }

    #[test]
    fn sh2_migrations_append_defaults() {
        let v1 = bincode::encode_to_vec(0xDEAD_BEEF_u32, BINCODE_CONFIG).unwrap();
        let migrated = migrate_sh2(1, &v1).unwrap();

        let (value, overshoot, pending): (u32, u32, bool) = decode_body(&migrated).unwrap();
        assert_eq!(value, 0xDEAD_BEEF);
        assert_eq!(overshoot, 0);
        assert!(!pending);

        let v2 = bincode::encode_to_vec((7_u32, 12_u32), BINCODE_CONFIG).unwrap();
        let (_, overshoot, pending): (u32, u32, bool) =
            decode_body(&migrate_sh2(2, &v2).unwrap()).unwrap();
        assert_eq!(overshoot, 12);
        assert!(!pending);
    }

    #[test]
    fn smpc_migration() {
        let v2 = bincode::encode_to_vec(0x55_u8, BINCODE_CONFIG).unwrap();
        let (value, frame_counter, signals): (u8, u32, Vec<SmpcSignal>) =
            decode_body(&migrate_smpc(2, &v2).unwrap()).unwrap();
        assert_eq!(value, 0x55);
        assert_eq!(frame_counter, 0);
        assert!(signals.is_empty());

        assert!(matches!(
            migrate_smpc(1, &v2),
            Err(SaveStateError::UnsupportedChunkVersion { version: 1, .. })
        ));
    }
}
