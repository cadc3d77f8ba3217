//! Per-grammar index widths (spec §8, §9): computed once from row counts and heap sizes, then
//! carried as plain fields rather than threaded through generic index types.

use crate::tables::coded::coded_ref_width;
use crate::tables::kind::{ALL_TABLE_KINDS, TableKind};
use crate::width::{width_for_count, width_for_heap_len};

/// Widths needed to parse or write every row in the `#~` stream.
///
/// Built once per grammar (by [`crate::tables::TablesHeader::context`] when reading, or by the
/// builder when writing) and handed to every row's `parse`/`write`.
#[derive(Debug, Clone, Copy)]
pub struct TableContext {
    /// Row counts for each table, indexed by [`TableKind`] discriminant.
    row_counts: [u32; 9],
    /// Width of a `#Strings` heap offset: 2 or 4 bytes, per the heap-is-small flag bit.
    pub string_width: u8,
    /// Width of a `#Blob` heap offset: 2 or 4 bytes, per the heap-is-small flag bit.
    pub blob_width: u8,
    /// Width of a reference into `TokenSymbol`.
    pub token_symbol_width: u8,
    /// Width of a reference into `Group`.
    pub group_width: u8,
    /// Width of a reference into `GroupNesting`.
    pub group_nesting_width: u8,
    /// Width of a reference into `Nonterminal`.
    pub nonterminal_width: u8,
    /// Width of a reference into `Production`.
    pub production_width: u8,
    /// Width of a reference into `ProductionMember`.
    pub production_member_width: u8,
    /// Width of a `ProductionMember`'s coded `TokenSymbol | Nonterminal` reference.
    pub member_target_width: u8,
}

impl TableContext {
    /// Derive widths from the per-table row counts and the sizes of the two heaps.
    #[must_use]
    pub fn new(row_counts: [u32; 9], string_heap_len: u32, blob_heap_len: u32) -> Self {
        let count = |kind: TableKind| row_counts[kind as usize];
        let member_target_width = coded_ref_width(&[
            count(TableKind::TokenSymbol),
            count(TableKind::Nonterminal),
        ]);

        Self {
            row_counts,
            string_width: width_for_heap_len(string_heap_len),
            blob_width: width_for_heap_len(blob_heap_len),
            token_symbol_width: width_for_count(count(TableKind::TokenSymbol)),
            group_width: width_for_count(count(TableKind::Group)),
            group_nesting_width: width_for_count(count(TableKind::GroupNesting)),
            nonterminal_width: width_for_count(count(TableKind::Nonterminal)),
            production_width: width_for_count(count(TableKind::Production)),
            production_member_width: width_for_count(count(TableKind::ProductionMember)),
            member_target_width,
        }
    }

    /// Row count for `kind`.
    #[must_use]
    pub fn row_count(&self, kind: TableKind) -> u32 {
        self.row_counts[kind as usize]
    }

    /// Width, in bytes, of a reference into `kind`'s table.
    #[must_use]
    pub fn table_width(&self, kind: TableKind) -> u8 {
        match kind {
            TableKind::Grammar => width_for_count(self.row_count(kind)),
            TableKind::TokenSymbol => self.token_symbol_width,
            TableKind::Group => self.group_width,
            TableKind::GroupNesting => width_for_count(self.row_count(kind)),
            TableKind::Nonterminal => self.nonterminal_width,
            TableKind::Production => self.production_width,
            TableKind::ProductionMember => self.production_member_width,
            TableKind::StateMachine => width_for_count(self.row_count(kind)),
            TableKind::SpecialName => width_for_count(self.row_count(kind)),
        }
    }

    /// Byte width of one row of `kind`, given these widths.
    #[must_use]
    pub fn row_size(&self, kind: TableKind) -> usize {
        match kind {
            TableKind::Grammar => {
                self.string_width as usize + self.nonterminal_width as usize
            }
            TableKind::TokenSymbol => self.string_width as usize + 1,
            TableKind::Group => {
                self.string_width as usize
                    + self.token_symbol_width as usize * 3
                    + 1
                    + 1
                    + self.group_nesting_width as usize
            }
            TableKind::GroupNesting => self.group_width as usize,
            TableKind::Nonterminal => self.string_width as usize + self.production_width as usize,
            TableKind::Production => {
                self.nonterminal_width as usize + self.production_member_width as usize
            }
            TableKind::ProductionMember => self.member_target_width as usize,
            TableKind::StateMachine => 1 + self.blob_width as usize,
            TableKind::SpecialName => self.string_width as usize + self.token_symbol_width as usize,
        }
    }

    /// Iterate table kinds that have at least one row.
    pub fn present_tables(&self) -> impl Iterator<Item = TableKind> + '_ {
        ALL_TABLE_KINDS
            .into_iter()
            .filter(move |k| self.row_count(*k) > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(grammar: u32, token: u32, nt: u32) -> [u32; 9] {
        let mut row_counts = [0u32; 9];
        row_counts[TableKind::Grammar as usize] = grammar;
        row_counts[TableKind::TokenSymbol as usize] = token;
        row_counts[TableKind::Nonterminal as usize] = nt;
        row_counts
    }

    #[test]
    fn small_grammar_uses_one_byte_table_widths() {
        let ctx = TableContext::new(counts(1, 10, 5), 100, 100);
        assert_eq!(ctx.token_symbol_width, 1);
        assert_eq!(ctx.nonterminal_width, 1);
    }

    #[test]
    fn heap_widths_are_never_one_byte() {
        // heap offsets have only a binary "is-small" flag: 2 bytes or 4, never 1.
        let ctx = TableContext::new(counts(1, 10, 5), 100, 100);
        assert_eq!(ctx.string_width, 2);
        let ctx = TableContext::new(counts(1, 10, 5), 100_000, 100);
        assert_eq!(ctx.string_width, 4);
    }

    #[test]
    fn large_table_widens_its_reference() {
        let ctx = TableContext::new(counts(1, 70_000, 5), 100, 100);
        assert_eq!(ctx.token_symbol_width, 4);
    }

    #[test]
    fn member_target_width_accounts_for_tag_bit() {
        let ctx = TableContext::new(counts(1, 200, 5), 100, 100);
        // max packed = (200 << 1) | 1 = 401, too big for 1 byte, so width 2.
        assert_eq!(ctx.member_target_width, 2);
    }
}
