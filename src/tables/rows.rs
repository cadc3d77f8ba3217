//! Row layouts for every table in the `#~` stream (spec §4.4–§4.7).
//!
//! Every row type exposes `parse`/`write` taking a [`TableContext`], which supplies the widths
//! computed for this grammar. Rows are stored column-major within each table, but since every
//! field of a row is fixed-width for a given context, reading row `i` of table `T` is just
//! `base + i * ctx.row_size(T)`.

use crate::error::Result;
use crate::reader::Reader;
use crate::tables::coded::{CodedRef, CodedRefKind};
use crate::tables::context::TableContext;
use crate::writer::Writer;

/// The single `Grammar` row: the grammar's name and its start symbol.
#[derive(Debug, Clone, Copy)]
pub struct GrammarRow {
    /// Offset into `#Strings` of the grammar's name.
    pub name: u32,
    /// 1-based row in `Nonterminal` that is the start symbol.
    pub start_symbol: u32,
}

impl GrammarRow {
    pub fn parse(reader: &mut Reader<'_>, ctx: &TableContext) -> Result<Self> {
        Ok(Self {
            name: reader.read_width(ctx.string_width)?,
            start_symbol: reader.read_width(ctx.nonterminal_width)?,
        })
    }

    pub fn write(&self, writer: &mut Writer, ctx: &TableContext) {
        writer.write_width(self.name, ctx.string_width);
        writer.write_width(self.start_symbol, ctx.nonterminal_width);
    }
}

/// Flags on a `TokenSymbol` row (spec §4.5).
pub mod token_symbol_flags {
    /// The symbol is a terminal that appears in productions (as opposed to pure lexical noise).
    pub const TERMINAL: u8 = 1 << 0;
    /// The symbol opens a lexical group (comment/string block).
    pub const GROUP_START: u8 = 1 << 1;
    /// The symbol is discarded by the tokenizer rather than handed to the parser.
    pub const NOISE: u8 = 1 << 2;
    /// The symbol is hidden from diagnostic/tree output but still reaches the parser.
    pub const HIDDEN: u8 = 1 << 3;
    /// The symbol was synthesized by the grammar compiler, not written by hand.
    pub const GENERATED: u8 = 1 << 4;
}

/// A `TokenSymbol` row: a terminal, noise symbol, or group delimiter.
#[derive(Debug, Clone, Copy)]
pub struct TokenSymbolRow {
    /// Offset into `#Strings` of the symbol's name.
    pub name: u32,
    /// [`token_symbol_flags`] bitmask.
    pub flags: u8,
}

impl TokenSymbolRow {
    pub fn parse(reader: &mut Reader<'_>, ctx: &TableContext) -> Result<Self> {
        Ok(Self {
            name: reader.read_width(ctx.string_width)?,
            flags: reader.read_u8()?,
        })
    }

    pub fn write(&self, writer: &mut Writer, ctx: &TableContext) {
        writer.write_width(self.name, ctx.string_width);
        writer.write_u8(self.flags);
    }

    /// Whether [`token_symbol_flags::TERMINAL`] is set.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.flags & token_symbol_flags::TERMINAL != 0
    }

    /// Whether [`token_symbol_flags::GROUP_START`] is set.
    #[must_use]
    pub fn is_group_start(&self) -> bool {
        self.flags & token_symbol_flags::GROUP_START != 0
    }
}

/// A `Group` row: a lexical group such as a block comment or quoted string (spec §4.5). Like
/// `Nonterminal`/`Production`, the set of `GroupNesting` rows that belong to this group is the
/// monotonic slice `[first_nesting, next_group.first_nesting)`.
#[derive(Debug, Clone, Copy)]
pub struct GroupRow {
    /// Offset into `#Strings` of the group's name.
    pub name: u32,
    /// 1-based row in `TokenSymbol` emitted to represent this group's contents as one token.
    pub container_token: u32,
    /// 1-based row in `TokenSymbol` that opens the group.
    pub start_token: u32,
    /// 1-based row in `TokenSymbol` that closes the group, or `0` if it closes at end-of-line.
    pub end_token: u32,
    /// How the tokenizer advances while inside the group (spec §4.5 `AdvanceMode`).
    pub advance_mode: u8,
    /// Whether the closing token is consumed or left for the next token (spec §4.5 `EndingMode`).
    pub ending_mode: u8,
    /// 1-based row in `GroupNesting` of this group's first nested-group entry, or `0` if none.
    pub first_nesting: u32,
}

impl GroupRow {
    pub fn parse(reader: &mut Reader<'_>, ctx: &TableContext) -> Result<Self> {
        Ok(Self {
            name: reader.read_width(ctx.string_width)?,
            container_token: reader.read_width(ctx.token_symbol_width)?,
            start_token: reader.read_width(ctx.token_symbol_width)?,
            end_token: reader.read_width(ctx.token_symbol_width)?,
            advance_mode: reader.read_u8()?,
            ending_mode: reader.read_u8()?,
            first_nesting: reader.read_width(ctx.group_nesting_width)?,
        })
    }

    pub fn write(&self, writer: &mut Writer, ctx: &TableContext) {
        writer.write_width(self.name, ctx.string_width);
        writer.write_width(self.container_token, ctx.token_symbol_width);
        writer.write_width(self.start_token, ctx.token_symbol_width);
        writer.write_width(self.end_token, ctx.token_symbol_width);
        writer.write_u8(self.advance_mode);
        writer.write_u8(self.ending_mode);
        writer.write_width(self.first_nesting, ctx.group_nesting_width);
    }
}

/// A `GroupNesting` row: one group that may appear nested inside whichever `Group` owns this
/// row's slice (spec §4.5). Like `ProductionMember`, the owning row isn't stored redundantly.
#[derive(Debug, Clone, Copy)]
pub struct GroupNestingRow {
    /// 1-based row in `Group` that may appear nested within the owning group.
    pub nested_group: u32,
}

impl GroupNestingRow {
    pub fn parse(reader: &mut Reader<'_>, ctx: &TableContext) -> Result<Self> {
        Ok(Self {
            nested_group: reader.read_width(ctx.group_width)?,
        })
    }

    pub fn write(&self, writer: &mut Writer, ctx: &TableContext) {
        writer.write_width(self.nested_group, ctx.group_width);
    }
}

/// A `Nonterminal` row: a name plus the (monotonic) slice of `Production` rows that belong to
/// it. The slice's end is the next nonterminal's `first_production`, or the end of the table
/// for the last nonterminal (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct NonterminalRow {
    /// Offset into `#Strings` of the nonterminal's name.
    pub name: u32,
    /// 1-based row in `Production` of this nonterminal's first production.
    pub first_production: u32,
}

impl NonterminalRow {
    pub fn parse(reader: &mut Reader<'_>, ctx: &TableContext) -> Result<Self> {
        Ok(Self {
            name: reader.read_width(ctx.string_width)?,
            first_production: reader.read_width(ctx.production_width)?,
        })
    }

    pub fn write(&self, writer: &mut Writer, ctx: &TableContext) {
        writer.write_width(self.name, ctx.string_width);
        writer.write_width(self.first_production, ctx.production_width);
    }
}

/// A `Production` row: which nonterminal it belongs to, plus the (monotonic) slice of
/// `ProductionMember` rows that are its right-hand side.
#[derive(Debug, Clone, Copy)]
pub struct ProductionRow {
    /// 1-based row in `Nonterminal` this production reduces to.
    pub nonterminal: u32,
    /// 1-based row in `ProductionMember` of this production's first member.
    pub first_member: u32,
}

impl ProductionRow {
    pub fn parse(reader: &mut Reader<'_>, ctx: &TableContext) -> Result<Self> {
        Ok(Self {
            nonterminal: reader.read_width(ctx.nonterminal_width)?,
            first_member: reader.read_width(ctx.production_member_width)?,
        })
    }

    pub fn write(&self, writer: &mut Writer, ctx: &TableContext) {
        writer.write_width(self.nonterminal, ctx.nonterminal_width);
        writer.write_width(self.first_member, ctx.production_member_width);
    }
}

/// A `ProductionMember` row: one symbol in a production's right-hand side, tagged by whether it
/// is a token symbol or a nonterminal (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct ProductionMemberRow {
    /// The referenced symbol.
    pub target: CodedRef,
}

impl ProductionMemberRow {
    pub fn parse(reader: &mut Reader<'_>, ctx: &TableContext) -> Result<Self> {
        let value = reader.read_width(ctx.member_target_width)?;
        Ok(Self {
            target: CodedRef::decode(CodedRefKind::ProductionMember, value),
        })
    }

    pub fn write(&self, writer: &mut Writer, ctx: &TableContext) {
        writer.write_width(
            self.target.encode(CodedRefKind::ProductionMember),
            ctx.member_target_width,
        );
    }
}

/// Which engine a `StateMachine` row's blob holds (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMachineKind {
    /// A DFA tokenizer engine blob with no conflicting accept symbols.
    Dfa,
    /// A DFA tokenizer engine blob whose states carry conflicting accept symbols.
    DfaWithConflicts,
    /// A DFA default-transition supplement blob.
    DfaDefaultTransition,
    /// A conflict-free LR(1) parser engine blob.
    Lr,
    /// A GLR(1) parser engine blob, whose states may carry more than one action per terminal.
    Glr,
}

impl StateMachineKind {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Dfa),
            1 => Ok(Self::DfaWithConflicts),
            2 => Ok(Self::DfaDefaultTransition),
            3 => Ok(Self::Lr),
            4 => Ok(Self::Glr),
            other => Err(crate::error::Error::InvalidData(format!(
                "unknown state machine kind {other}"
            ))),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Dfa => 0,
            Self::DfaWithConflicts => 1,
            Self::DfaDefaultTransition => 2,
            Self::Lr => 3,
            Self::Glr => 4,
        }
    }

    /// Whether this kind's blob is parsed by [`crate::dfa::DfaEngine`].
    #[must_use]
    pub fn is_dfa(self) -> bool {
        matches!(self, Self::Dfa | Self::DfaWithConflicts | Self::DfaDefaultTransition)
    }

    /// Whether this kind's blob is parsed by [`crate::lr::LrEngine`].
    #[must_use]
    pub fn is_lr(self) -> bool {
        matches!(self, Self::Lr | Self::Glr)
    }
}

/// A `StateMachine` row: a tagged blob holding a serialized DFA or LR engine (spec §4.7).
#[derive(Debug, Clone, Copy)]
pub struct StateMachineRow {
    /// Which engine the blob holds.
    pub kind: StateMachineKind,
    /// Offset into `#Blob` of the serialized engine.
    pub blob: u32,
}

impl StateMachineRow {
    pub fn parse(reader: &mut Reader<'_>, ctx: &TableContext) -> Result<Self> {
        let kind = StateMachineKind::from_u8(reader.read_u8()?)?;
        let blob = reader.read_width(ctx.blob_width)?;
        Ok(Self { kind, blob })
    }

    pub fn write(&self, writer: &mut Writer, ctx: &TableContext) {
        writer.write_u8(self.kind.to_u8());
        writer.write_width(self.blob, ctx.blob_width);
    }
}

/// A `SpecialName` row: a well-known name (e.g. an error or end-of-file symbol) bound to a
/// token symbol, so callers can look it up without hard-coding a row index (spec §4.5).
#[derive(Debug, Clone, Copy)]
pub struct SpecialNameRow {
    /// Offset into `#Strings` of the special name.
    pub name: u32,
    /// 1-based row in `TokenSymbol` this name resolves to.
    pub symbol: u32,
}

impl SpecialNameRow {
    pub fn parse(reader: &mut Reader<'_>, ctx: &TableContext) -> Result<Self> {
        Ok(Self {
            name: reader.read_width(ctx.string_width)?,
            symbol: reader.read_width(ctx.token_symbol_width)?,
        })
    }

    pub fn write(&self, writer: &mut Writer, ctx: &TableContext) {
        writer.write_width(self.name, ctx.string_width);
        writer.write_width(self.symbol, ctx.token_symbol_width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::kind::TableKind;

    fn test_ctx() -> TableContext {
        let mut row_counts = [0u32; 9];
        row_counts[TableKind::TokenSymbol as usize] = 20;
        row_counts[TableKind::Nonterminal as usize] = 10;
        row_counts[TableKind::Production as usize] = 15;
        row_counts[TableKind::ProductionMember as usize] = 40;
        row_counts[TableKind::Group as usize] = 2;
        TableContext::new(row_counts, 500, 200)
    }

    #[test]
    fn grammar_row_roundtrips() {
        let ctx = test_ctx();
        let row = GrammarRow {
            name: 4,
            start_symbol: 1,
        };
        let mut w = Writer::new();
        row.write(&mut w, &ctx);
        let bytes = w.into_inner();
        let mut r = Reader::new(&bytes);
        let parsed = GrammarRow::parse(&mut r, &ctx).unwrap();
        assert_eq!(parsed.name, 4);
        assert_eq!(parsed.start_symbol, 1);
    }

    #[test]
    fn token_symbol_flags_roundtrip() {
        let ctx = test_ctx();
        let row = TokenSymbolRow {
            name: 1,
            flags: token_symbol_flags::TERMINAL | token_symbol_flags::HIDDEN,
        };
        let mut w = Writer::new();
        row.write(&mut w, &ctx);
        let bytes = w.into_inner();
        let mut r = Reader::new(&bytes);
        let parsed = TokenSymbolRow::parse(&mut r, &ctx).unwrap();
        assert!(parsed.is_terminal());
        assert!(!parsed.is_group_start());
    }

    #[test]
    fn production_member_roundtrips_both_tags() {
        let ctx = test_ctx();
        for target in [
            CodedRef {
                table: TableKind::TokenSymbol,
                row: 3,
            },
            CodedRef {
                table: TableKind::Nonterminal,
                row: 7,
            },
        ] {
            let row = ProductionMemberRow { target };
            let mut w = Writer::new();
            row.write(&mut w, &ctx);
            let bytes = w.into_inner();
            let mut r = Reader::new(&bytes);
            let parsed = ProductionMemberRow::parse(&mut r, &ctx).unwrap();
            assert_eq!(parsed.target, target);
        }
    }

    #[test]
    fn state_machine_row_roundtrips() {
        let ctx = test_ctx();
        let row = StateMachineRow {
            kind: StateMachineKind::Dfa,
            blob: 12,
        };
        let mut w = Writer::new();
        row.write(&mut w, &ctx);
        let bytes = w.into_inner();
        let mut r = Reader::new(&bytes);
        let parsed = StateMachineRow::parse(&mut r, &ctx).unwrap();
        assert_eq!(parsed.kind, StateMachineKind::Dfa);
        assert_eq!(parsed.blob, 12);
    }
}
