//! File magic, version, and stream directory (spec §4.1, §6).

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// File magic: `"Farkle\0\0"`.
pub const CONTAINER_MAGIC: [u8; 8] = *b"Farkle\0\0";

/// The major version this build writes.
pub const CURRENT_MAJOR_VERSION: u16 = 1;

/// The oldest major version this build can still read.
pub const MIN_SUPPORTED_MAJOR_VERSION: u16 = 1;

/// Well-known stream identifiers, stored as 8-byte little-endian tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    /// `#Strings`.
    Strings,
    /// `#Blob`.
    Blob,
    /// `#~`, the table stream.
    Tables,
    /// Any stream identifier this reader does not recognize.
    Unknown(u64),
}

impl StreamId {
    const STRINGS: u64 = 0x73676E6972745323;
    const BLOB: u64 = 0x000000646F6C4223;
    const TABLES: u64 = 0x0000000000007E23;

    fn from_raw(raw: u64) -> Self {
        match raw {
            Self::STRINGS => Self::Strings,
            Self::BLOB => Self::Blob,
            Self::TABLES => Self::Tables,
            other => Self::Unknown(other),
        }
    }

    fn to_raw(self) -> u64 {
        match self {
            Self::Strings => Self::STRINGS,
            Self::Blob => Self::BLOB,
            Self::Tables => Self::TABLES,
            Self::Unknown(raw) => raw,
        }
    }
}

/// One entry of the stream directory: an identifier plus its byte range in the file.
#[derive(Debug, Clone, Copy)]
pub struct StreamEntry {
    /// Which stream this is.
    pub id: StreamId,
    /// Byte offset from the start of the file.
    pub offset: u32,
    /// Length in bytes.
    pub length: u32,
}

/// The parsed container header: magic + version + stream directory.
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    /// Major version read from the file.
    pub major_version: u16,
    /// Minor version read from the file.
    pub minor_version: u16,
    /// Stream directory entries, in file order.
    pub streams: Vec<StreamEntry>,
}

impl ContainerHeader {
    /// Parse the magic, version, and stream directory from the start of `data`.
    ///
    /// Does not validate stream bounds against `data`'s length beyond what
    /// [`Reader`] itself enforces while reading the directory; callers that need bound
    /// checking against the whole file should use [`ContainerHeader::sections`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let magic = reader.read_bytes(8)?;
        if magic != CONTAINER_MAGIC {
            return Err(Error::MalformedContainer {
                offset: 0,
                reason: "bad file magic, expected \"Farkle\\0\\0\"",
            });
        }

        let major_version = reader.read_u16()?;
        let minor_version = reader.read_u16()?;
        if major_version < MIN_SUPPORTED_MAJOR_VERSION {
            return Err(Error::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
                reason: "file is older than this reader supports",
            });
        }
        if major_version > CURRENT_MAJOR_VERSION {
            return Err(Error::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
                reason: "file is newer than this reader supports",
            });
        }

        let stream_count = reader.read_u32()? as usize;
        let mut streams = Vec::with_capacity(stream_count);
        for _ in 0..stream_count {
            let id = StreamId::from_raw(reader.read_u64()?);
            let offset = reader.read_u32()?;
            let length = reader.read_u32()?;
            streams.push(StreamEntry { id, offset, length });
        }

        Ok(Self {
            major_version,
            minor_version,
            streams,
        })
    }

    /// Write the header (magic, version, stream directory) to `writer`.
    pub fn write_to(&self, writer: &mut Writer) {
        writer.write_bytes(&CONTAINER_MAGIC);
        writer.write_u16(self.major_version);
        writer.write_u16(self.minor_version);
        writer.write_u32(self.streams.len() as u32);
        for entry in &self.streams {
            writer.write_u64(entry.id.to_raw());
            writer.write_u32(entry.offset);
            writer.write_u32(entry.length);
        }
    }

    /// Size in bytes of the header once written (magic + version + directory).
    #[must_use]
    pub fn header_size(&self) -> usize {
        8 + 2 + 2 + 4 + self.streams.len() * 16
    }

    /// Resolve the byte ranges of the three recognized streams, bounds-checked against
    /// `file_len`. Rejects duplicate known streams and requires the table stream.
    pub fn sections(&self, file_len: usize) -> Result<GrammarSections> {
        let mut strings = None;
        let mut blob = None;
        let mut tables = None;

        for entry in &self.streams {
            let end = entry.offset as usize + entry.length as usize;
            if end > file_len {
                return Err(Error::MalformedContainer {
                    offset: entry.offset as usize,
                    reason: "stream range exceeds file length",
                });
            }
            let slot = match entry.id {
                StreamId::Strings => &mut strings,
                StreamId::Blob => &mut blob,
                StreamId::Tables => &mut tables,
                StreamId::Unknown(_) => continue,
            };
            if slot.is_some() {
                return Err(Error::InvalidData(
                    "duplicate known stream in directory".to_string(),
                ));
            }
            *slot = Some((entry.offset as usize, entry.length as usize));
        }

        let tables = tables.ok_or_else(|| {
            Error::InvalidData("missing required \"#~\" table stream".to_string())
        })?;

        Ok(GrammarSections {
            strings,
            blob,
            tables,
        })
    }
}

/// Resolved byte ranges of the streams a grammar file actually uses.
#[derive(Debug, Clone, Copy)]
pub struct GrammarSections {
    /// `(offset, length)` of the string heap, if present.
    pub strings: Option<(usize, usize)>,
    /// `(offset, length)` of the blob heap, if present.
    pub blob: Option<(usize, usize)>,
    /// `(offset, length)` of the table stream. Always present.
    pub tables: (usize, usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let mut data = vec![0u8; 16];
        data[0] = b'X';
        let err = ContainerHeader::parse(&data).unwrap_err();
        assert!(matches!(err, Error::MalformedContainer { .. }));
    }

    #[test]
    fn rejects_future_major_version() {
        let mut w = Writer::new();
        w.write_bytes(&CONTAINER_MAGIC);
        w.write_u16(CURRENT_MAJOR_VERSION + 1);
        w.write_u16(0);
        w.write_u32(0);
        let bytes = w.into_inner();
        let err = ContainerHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { .. }));
    }

    #[test]
    fn roundtrips_stream_directory() {
        let header = ContainerHeader {
            major_version: CURRENT_MAJOR_VERSION,
            minor_version: 0,
            streams: vec![
                StreamEntry {
                    id: StreamId::Strings,
                    offset: 16,
                    length: 8,
                },
                StreamEntry {
                    id: StreamId::Tables,
                    offset: 24,
                    length: 40,
                },
            ],
        };
        let mut w = Writer::new();
        header.write_to(&mut w);
        let bytes = w.into_inner();
        let parsed = ContainerHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.streams.len(), 2);
        assert_eq!(parsed.streams[0].id, StreamId::Strings);
        assert_eq!(parsed.streams[1].id, StreamId::Tables);
    }
}
