//! The `#~` table stream header: presence bitmap and per-table row counts/widths (spec §4.1).

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::tables::context::TableContext;
use crate::tables::kind::{ALL_TABLE_KINDS, TableKind};
use crate::writer::Writer;

/// Header of the `#~` stream: which tables are present, and how many rows (and what row width)
/// each has.
#[derive(Debug, Clone)]
pub struct TablesHeader {
    /// Width (2 or 4) of `#Strings` heap offsets used by rows in this stream.
    pub string_width: u8,
    /// Width (2 or 4) of `#Blob` heap offsets used by rows in this stream.
    pub blob_width: u8,
    /// Bitmap of which tables have at least one row.
    pub present: u64,
    /// Row count for each table, indexed by [`TableKind`] discriminant.
    pub row_counts: [u32; 9],
    /// Declared row width (in bytes) for each present table, indexed by [`TableKind`]
    /// discriminant; `0` for absent tables.
    pub row_widths: [u8; 9],
}

impl TablesHeader {
    /// Parse the header from the start of the `#~` stream: the bitmap, then a `(row count, row
    /// width)` pair per present table, then the heap-size flags byte, padded to 8 bytes.
    pub fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let present = reader.read_u64()?;
        let mut row_counts = [0u32; 9];
        let mut row_widths = [0u8; 9];
        for kind in ALL_TABLE_KINDS {
            if present & (1u64 << (kind as u8)) != 0 {
                row_counts[kind as usize] = reader.read_u32()?;
                row_widths[kind as usize] = reader.read_u8()?;
            }
        }

        let heap_size_flags = reader.read_u8()?;
        let string_width = if heap_size_flags & 0x1 != 0 { 2 } else { 4 };
        let blob_width = if heap_size_flags & 0x2 != 0 { 2 } else { 4 };
        reader.align(8)?;

        let header = Self {
            string_width,
            blob_width,
            present,
            row_counts,
            row_widths,
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        for bit in 0..64u8 {
            if self.present & (1u64 << bit) != 0 && TableKind::from_u8(bit).is_err() {
                return Err(Error::MalformedContainer {
                    offset: 0,
                    reason: "presence bitmap sets a bit with no assigned table",
                });
            }
        }
        Ok(())
    }

    /// Write the header to `writer`, padding to an 8-byte boundary afterward.
    pub fn write_to(&self, writer: &mut Writer) {
        writer.write_u64(self.present);
        for kind in ALL_TABLE_KINDS {
            if self.has_table(kind) {
                writer.write_u32(self.row_counts[kind as usize]);
                writer.write_u8(self.row_widths[kind as usize]);
            }
        }
        let heap_size_flags = u8::from(self.string_width == 2) | (u8::from(self.blob_width == 2) << 1);
        writer.write_u8(heap_size_flags);
        writer.align(8);
    }

    /// Whether `kind` has at least one row.
    #[must_use]
    pub fn has_table(&self, kind: TableKind) -> bool {
        self.present & (1u64 << (kind as u8)) != 0
    }

    /// Row count for `kind` (`0` if absent).
    #[must_use]
    pub fn row_count(&self, kind: TableKind) -> u32 {
        self.row_counts[kind as usize]
    }

    /// Declared row width for `kind` (`0` if absent).
    #[must_use]
    pub fn row_width(&self, kind: TableKind) -> u8 {
        self.row_widths[kind as usize]
    }

    /// Build the width context used to parse or write every row, given the two heaps' lengths.
    #[must_use]
    pub fn context(&self, string_heap_len: u32, blob_heap_len: u32) -> TableContext {
        TableContext::new(self.row_counts, string_heap_len, blob_heap_len)
    }

    /// Iterate `(kind, row_count)` for every present table.
    pub fn tables(&self) -> impl Iterator<Item = (TableKind, u32)> + '_ {
        ALL_TABLE_KINDS
            .into_iter()
            .filter(move |k| self.has_table(*k))
            .map(move |k| (k, self.row_counts[k as usize]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_header() {
        let mut row_counts = [0u32; 9];
        row_counts[TableKind::Grammar as usize] = 1;
        row_counts[TableKind::TokenSymbol as usize] = 12;
        let mut row_widths = [0u8; 9];
        row_widths[TableKind::Grammar as usize] = 3;
        row_widths[TableKind::TokenSymbol as usize] = 5;
        let present = (1u64 << TableKind::Grammar as u8) | (1u64 << TableKind::TokenSymbol as u8);

        let header = TablesHeader {
            string_width: 2,
            blob_width: 4,
            present,
            row_counts,
            row_widths,
        };

        let mut w = Writer::new();
        header.write_to(&mut w);
        let bytes = w.into_inner();
        assert_eq!(bytes.len() % 8, 0, "header must pad to an 8-byte boundary");
        let mut r = Reader::new(&bytes);
        let parsed = TablesHeader::parse(&mut r).unwrap();
        assert_eq!(parsed.row_count(TableKind::TokenSymbol), 12);
        assert_eq!(parsed.row_width(TableKind::TokenSymbol), 5);
        assert!(parsed.has_table(TableKind::Grammar));
        assert!(!parsed.has_table(TableKind::Production));
        assert_eq!(parsed.string_width, 2);
        assert_eq!(parsed.blob_width, 4);
    }

    #[test]
    fn rejects_unassigned_presence_bit() {
        let mut w = Writer::new();
        w.write_u64(1u64 << 63);
        w.write_u8(0);
        w.align(8);
        let bytes = w.into_inner();
        let mut r = Reader::new(&bytes);
        assert!(TablesHeader::parse(&mut r).is_err());
    }
}
