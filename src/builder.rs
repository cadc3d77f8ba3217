//! The grammar builder (spec §4.5): a staged, stateful assembler that enforces ordering
//! invariants a loaded grammar can then rely on without re-checking them.

use std::collections::HashSet;

use crate::container::{ContainerHeader, CURRENT_MAJOR_VERSION, StreamEntry, StreamId};
use crate::entities::EntityHandle;
use crate::error::{Error, Result};
use crate::heaps::{BlobHeap, StringHeap};
use crate::tables::{
    ALL_TABLE_KINDS, CodedRef, GrammarRow, GroupNestingRow, GroupRow, NonterminalRow,
    ProductionMemberRow, ProductionRow, SpecialNameRow, StateMachineKind, StateMachineRow,
    TableContext, TableKind, TablesHeader, TokenSymbolRow, token_symbol_flags,
};
use crate::writer::Writer;

/// `MaxRowCount` from spec §3: the ceiling shared by every table except the two a 20-bit
/// `TokenSymbol`/`Nonterminal` row must also fit inside.
const MAX_ROW_COUNT: u32 = (1 << 24) - 1;
/// `MaxSymbolRowCount` from spec §3, for `TokenSymbol` and `Nonterminal`.
const MAX_SYMBOL_ROW_COUNT: u32 = (1 << 20) - 1;

/// Outstanding quota consumed by subsequent calls before the builder will accept the next
/// sibling at the same level (declaring a new nonterminal, starting a new production, etc.).
#[derive(Debug, Clone, Copy)]
struct Quota {
    owner_row: u32,
    remaining: u32,
}

/// Assembles a grammar one staged call at a time, matching the ordering spec §4.5 requires:
/// terminals before other token symbols, a nonterminal's declared production count consumed in
/// order, a production's declared member count consumed in order, and grammar info set exactly
/// once after its start nonterminal exists.
#[derive(Debug)]
pub struct GrammarBuilder {
    strings: StringHeap,
    blobs: BlobHeap,
    token_symbols: Vec<TokenSymbolRow>,
    terminals_closed: bool,
    groups: Vec<GroupRow>,
    group_nestings: Vec<GroupNestingRow>,
    nonterminals: Vec<NonterminalRow>,
    productions: Vec<ProductionRow>,
    production_members: Vec<ProductionMemberRow>,
    state_machines: Vec<StateMachineRow>,
    special_names: Vec<SpecialNameRow>,
    special_name_set: HashSet<String>,
    pending_productions: Option<Quota>,
    pending_members: Option<Quota>,
    pending_nestings: Option<Quota>,
    grammar_info: Option<(u32, u32)>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    /// Start assembling a new, empty grammar.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strings: StringHeap::new(),
            blobs: BlobHeap::new(),
            token_symbols: Vec::new(),
            terminals_closed: false,
            groups: Vec::new(),
            group_nestings: Vec::new(),
            nonterminals: Vec::new(),
            productions: Vec::new(),
            production_members: Vec::new(),
            state_machines: Vec::new(),
            special_names: Vec::new(),
            special_name_set: HashSet::new(),
            pending_productions: None,
            pending_members: None,
            pending_nestings: None,
            grammar_info: None,
        }
    }

    fn check_row_count(table: &'static str, count: usize, max: u32) -> Result<()> {
        if count as u64 > u64::from(max) {
            return Err(Error::SizeLimitExceeded {
                what: table,
                actual: count as u64,
                max: u64::from(max),
            });
        }
        Ok(())
    }

    /// Add a terminal token symbol. Must happen before any call to
    /// [`GrammarBuilder::add_token_symbol`] (spec §4.5: terminals are contiguous at the start of
    /// the table); `flags` may not carry [`token_symbol_flags::GROUP_START`].
    pub fn add_terminal(&mut self, name: &str, flags: u8) -> Result<EntityHandle> {
        if self.terminals_closed {
            return Err(Error::InvalidOperation(
                "terminals must be added before any non-terminal token symbol".to_string(),
            ));
        }
        if flags & token_symbol_flags::GROUP_START != 0 {
            return Err(Error::InvalidOperation(
                "a terminal may not carry the GroupStart flag".to_string(),
            ));
        }
        self.push_token_symbol(name, flags | token_symbol_flags::TERMINAL)
    }

    /// Add a non-terminal token symbol (noise, a group delimiter, or a generated symbol). Once
    /// called, no further terminal may be added.
    pub fn add_token_symbol(&mut self, name: &str, flags: u8) -> Result<EntityHandle> {
        self.terminals_closed = true;
        self.push_token_symbol(name, flags & !token_symbol_flags::TERMINAL)
    }

    fn push_token_symbol(&mut self, name: &str, flags: u8) -> Result<EntityHandle> {
        let name = self.strings.add(name)?;
        Self::check_row_count(
            "TokenSymbol",
            self.token_symbols.len() + 1,
            MAX_SYMBOL_ROW_COUNT,
        )?;
        self.token_symbols.push(TokenSymbolRow { name, flags });
        Ok(EntityHandle::new(
            TableKind::TokenSymbol,
            self.token_symbols.len() as u32,
        ))
    }

    /// Declare a nonterminal and the number of productions it will own. The previous
    /// nonterminal's production quota (and that production's member quota) must already be
    /// fully consumed.
    pub fn declare_nonterminal(
        &mut self,
        name: &str,
        production_count: u32,
    ) -> Result<EntityHandle> {
        if self.pending_productions.is_some() {
            return Err(Error::InvalidOperation(
                "the previous nonterminal still has productions outstanding".to_string(),
            ));
        }
        if self.pending_members.is_some() {
            return Err(Error::InvalidOperation(
                "the previous production still has members outstanding".to_string(),
            ));
        }

        let name = self.strings.add(name)?;
        let first_production = if production_count == 0 {
            0
        } else {
            self.productions.len() as u32 + 1
        };
        Self::check_row_count(
            "Nonterminal",
            self.nonterminals.len() + 1,
            MAX_SYMBOL_ROW_COUNT,
        )?;
        self.nonterminals.push(NonterminalRow {
            name,
            first_production,
        });
        let row = self.nonterminals.len() as u32;
        if production_count > 0 {
            self.pending_productions = Some(Quota {
                owner_row: row,
                remaining: production_count,
            });
        }
        Ok(EntityHandle::new(TableKind::Nonterminal, row))
    }

    /// Add the next production of `nonterminal`, declaring how many members it will own.
    pub fn add_production(
        &mut self,
        nonterminal: EntityHandle,
        member_count: u32,
    ) -> Result<EntityHandle> {
        let nt_row = nonterminal.check_kind(TableKind::Nonterminal)?;
        let quota = self.pending_productions.as_mut().ok_or_else(|| {
            Error::InvalidOperation("no nonterminal is awaiting productions".to_string())
        })?;
        if quota.owner_row != nt_row {
            return Err(Error::InvalidOperation(
                "productions must be added to the most recently declared nonterminal".to_string(),
            ));
        }
        if self.pending_members.is_some() {
            return Err(Error::InvalidOperation(
                "the previous production still has members outstanding".to_string(),
            ));
        }

        let first_member = if member_count == 0 {
            0
        } else {
            self.production_members.len() as u32 + 1
        };
        Self::check_row_count("Production", self.productions.len() + 1, MAX_ROW_COUNT)?;
        self.productions.push(ProductionRow {
            nonterminal: nt_row,
            first_member,
        });
        let row = self.productions.len() as u32;

        quota.remaining -= 1;
        if quota.remaining == 0 {
            self.pending_productions = None;
        }
        if member_count > 0 {
            self.pending_members = Some(Quota {
                owner_row: row,
                remaining: member_count,
            });
        }
        Ok(EntityHandle::new(TableKind::Production, row))
    }

    /// Add the next member of `production`'s right-hand side. `target` must be a handle into
    /// `TokenSymbol` or `Nonterminal`.
    pub fn add_production_member(
        &mut self,
        production: EntityHandle,
        target: EntityHandle,
    ) -> Result<()> {
        let prod_row = production.check_kind(TableKind::Production)?;
        let quota = self.pending_members.as_mut().ok_or_else(|| {
            Error::InvalidOperation("no production is awaiting members".to_string())
        })?;
        if quota.owner_row != prod_row {
            return Err(Error::InvalidOperation(
                "members must be added to the most recently started production".to_string(),
            ));
        }
        let target = match target.kind() {
            TableKind::TokenSymbol | TableKind::Nonterminal => CodedRef {
                table: target.kind(),
                row: target.row(),
            },
            other => {
                return Err(Error::InvalidOperation(format!(
                    "a production member must be a token symbol or nonterminal, got {other:?}"
                )));
            }
        };
        Self::check_row_count(
            "ProductionMember",
            self.production_members.len() + 1,
            MAX_ROW_COUNT,
        )?;
        self.production_members.push(ProductionMemberRow { target });

        quota.remaining -= 1;
        if quota.remaining == 0 {
            self.pending_members = None;
        }
        Ok(())
    }

    /// Declare a lexical group and the number of other groups that may nest within it.
    #[allow(clippy::too_many_arguments)]
    pub fn declare_group(
        &mut self,
        name: &str,
        container_token: EntityHandle,
        start_token: EntityHandle,
        end_token: Option<EntityHandle>,
        advance_mode: u8,
        ending_mode: u8,
        nesting_count: u32,
    ) -> Result<EntityHandle> {
        if self.pending_nestings.is_some() {
            return Err(Error::InvalidOperation(
                "the previous group still has nestings outstanding".to_string(),
            ));
        }
        let container_token = container_token.check_kind(TableKind::TokenSymbol)?;
        let start_token = start_token.check_kind(TableKind::TokenSymbol)?;
        let end_token = end_token
            .map(|h| h.check_kind(TableKind::TokenSymbol))
            .transpose()?
            .unwrap_or(0);

        let name = self.strings.add(name)?;
        let first_nesting = if nesting_count == 0 {
            0
        } else {
            self.group_nestings.len() as u32 + 1
        };
        Self::check_row_count("Group", self.groups.len() + 1, MAX_ROW_COUNT)?;
        self.groups.push(GroupRow {
            name,
            container_token,
            start_token,
            end_token,
            advance_mode,
            ending_mode,
            first_nesting,
        });
        let row = self.groups.len() as u32;
        if nesting_count > 0 {
            self.pending_nestings = Some(Quota {
                owner_row: row,
                remaining: nesting_count,
            });
        }
        Ok(EntityHandle::new(TableKind::Group, row))
    }

    /// Add the next nested-group entry of `group`.
    pub fn add_group_nesting(&mut self, group: EntityHandle, nested: EntityHandle) -> Result<()> {
        let group_row = group.check_kind(TableKind::Group)?;
        let nested_row = nested.check_kind(TableKind::Group)?;
        let quota = self
            .pending_nestings
            .as_mut()
            .ok_or_else(|| Error::InvalidOperation("no group is awaiting nestings".to_string()))?;
        if quota.owner_row != group_row {
            return Err(Error::InvalidOperation(
                "nestings must be added to the most recently declared group".to_string(),
            ));
        }
        Self::check_row_count(
            "GroupNesting",
            self.group_nestings.len() + 1,
            MAX_ROW_COUNT,
        )?;
        self.group_nestings.push(GroupNestingRow {
            nested_group: nested_row,
        });
        quota.remaining -= 1;
        if quota.remaining == 0 {
            self.pending_nestings = None;
        }
        Ok(())
    }

    /// Store a serialized DFA or LR engine blob. At most one state machine of each kind may be
    /// added per grammar.
    pub fn add_state_machine(&mut self, kind: StateMachineKind, blob: &[u8]) -> Result<()> {
        if self.state_machines.iter().any(|row| row.kind == kind) {
            return Err(Error::InvalidData(format!(
                "a state machine of kind {kind:?} was already added"
            )));
        }
        let blob = self.blobs.add(blob)?;
        self.state_machines.push(StateMachineRow { kind, blob });
        Ok(())
    }

    /// Bind a well-known name to a token symbol. Names must be unique per grammar.
    pub fn add_special_name(&mut self, name: &str, symbol: EntityHandle) -> Result<()> {
        let symbol_row = symbol.check_kind(TableKind::TokenSymbol)?;
        if !self.special_name_set.insert(name.to_string()) {
            return Err(Error::InvalidData(format!(
                "special name \"{name}\" was already added"
            )));
        }
        let name = self.strings.add(name)?;
        Self::check_row_count("SpecialName", self.special_names.len() + 1, MAX_ROW_COUNT)?;
        self.special_names.push(SpecialNameRow {
            name,
            symbol: symbol_row,
        });
        Ok(())
    }

    /// Set the grammar's name and start symbol. May be called exactly once, and only once every
    /// declared nonterminal's productions (and every production's members) have been fully
    /// supplied.
    pub fn set_grammar_info(&mut self, name: &str, start_symbol: EntityHandle) -> Result<()> {
        if self.grammar_info.is_some() {
            return Err(Error::InvalidOperation(
                "grammar info may be set at most once".to_string(),
            ));
        }
        let start_row = start_symbol.check_kind(TableKind::Nonterminal)?;
        if start_row == 0 || start_row > self.nonterminals.len() as u32 {
            return Err(Error::InvalidOperation(
                "grammar info must reference an already-added nonterminal".to_string(),
            ));
        }
        if self.pending_productions.is_some() || self.pending_members.is_some() {
            return Err(Error::InvalidOperation(
                "grammar info cannot be set while a nonterminal or production is incomplete"
                    .to_string(),
            ));
        }
        let name = self.strings.add(name)?;
        self.grammar_info = Some((name, start_row));
        Ok(())
    }

    fn row_counts(&self) -> [u32; 9] {
        let mut counts = [0u32; 9];
        counts[TableKind::Grammar as usize] = 1;
        counts[TableKind::TokenSymbol as usize] = self.token_symbols.len() as u32;
        counts[TableKind::Group as usize] = self.groups.len() as u32;
        counts[TableKind::GroupNesting as usize] = self.group_nestings.len() as u32;
        counts[TableKind::Nonterminal as usize] = self.nonterminals.len() as u32;
        counts[TableKind::Production as usize] = self.productions.len() as u32;
        counts[TableKind::ProductionMember as usize] = self.production_members.len() as u32;
        counts[TableKind::StateMachine as usize] = self.state_machines.len() as u32;
        counts[TableKind::SpecialName as usize] = self.special_names.len() as u32;
        counts
    }

    /// Finish building and serialize the grammar to its container byte form (spec §4.1, §4.5).
    pub fn finish(&self) -> Result<Vec<u8>> {
        let (name, start_symbol) = self
            .grammar_info
            .ok_or_else(|| Error::InvalidOperation("grammar info was never set".to_string()))?;
        if self.pending_nestings.is_some() {
            return Err(Error::InvalidOperation(
                "a group still has nestings outstanding".to_string(),
            ));
        }

        let row_counts = self.row_counts();
        let ctx = TableContext::new(row_counts, self.strings.size() as u32, self.blobs.size() as u32);

        let mut present = 0u64;
        for kind in ALL_TABLE_KINDS {
            if row_counts[kind as usize] > 0 {
                present |= 1u64 << (kind as u8);
            }
        }

        let mut row_widths = [0u8; 9];
        for kind in ALL_TABLE_KINDS {
            if row_counts[kind as usize] > 0 {
                row_widths[kind as usize] = ctx.row_size(kind) as u8;
            }
        }

        let mut table_writer = Writer::new();
        let header = TablesHeader {
            string_width: ctx.string_width,
            blob_width: ctx.blob_width,
            present,
            row_counts,
            row_widths,
        };
        header.write_to(&mut table_writer);

        GrammarRow { name, start_symbol }.write(&mut table_writer, &ctx);
        for row in &self.token_symbols {
            row.write(&mut table_writer, &ctx);
        }
        for row in &self.groups {
            row.write(&mut table_writer, &ctx);
        }
        for row in &self.group_nestings {
            row.write(&mut table_writer, &ctx);
        }
        for row in &self.nonterminals {
            row.write(&mut table_writer, &ctx);
        }
        for row in &self.productions {
            row.write(&mut table_writer, &ctx);
        }
        for row in &self.production_members {
            row.write(&mut table_writer, &ctx);
        }
        for row in &self.state_machines {
            row.write(&mut table_writer, &ctx);
        }
        for row in &self.special_names {
            row.write(&mut table_writer, &ctx);
        }

        let strings_bytes = self.strings.data();
        let blob_bytes = self.blobs.data();
        let table_bytes = table_writer.into_inner();

        let mut streams = Vec::with_capacity(3);
        if !self.strings.is_empty() {
            streams.push(StreamEntry {
                id: StreamId::Strings,
                offset: 0,
                length: strings_bytes.len() as u32,
            });
        }
        if !self.blobs.is_empty() {
            streams.push(StreamEntry {
                id: StreamId::Blob,
                offset: 0,
                length: blob_bytes.len() as u32,
            });
        }
        streams.push(StreamEntry {
            id: StreamId::Tables,
            offset: 0,
            length: table_bytes.len() as u32,
        });

        let mut header = ContainerHeader {
            major_version: CURRENT_MAJOR_VERSION,
            minor_version: 0,
            streams,
        };
        let mut offset = header.header_size() as u32;
        for entry in &mut header.streams {
            entry.offset = offset;
            offset += entry.length;
        }

        let mut writer = Writer::new();
        header.write_to(&mut writer);
        for entry in &header.streams {
            match entry.id {
                StreamId::Strings => writer.write_bytes(strings_bytes),
                StreamId::Blob => writer.write_bytes(blob_bytes),
                StreamId::Tables => writer.write_bytes(&table_bytes),
                StreamId::Unknown(_) => unreachable!("builder never emits unknown streams"),
            }
        }

        Ok(writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_grammar_builds() {
        let mut builder = GrammarBuilder::new();
        let x = builder.add_terminal("x", 0).unwrap();
        let s = builder.declare_nonterminal("S", 1).unwrap();
        let p = builder.add_production(s, 1).unwrap();
        builder.add_production_member(p, x).unwrap();
        builder.set_grammar_info("G", s).unwrap();
        let bytes = builder.finish().unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn rejects_terminal_after_token_symbol() {
        let mut builder = GrammarBuilder::new();
        builder.add_token_symbol("noise", 0).unwrap();
        let err = builder.add_terminal("x", 0).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn rejects_terminal_with_group_start_flag() {
        let mut builder = GrammarBuilder::new();
        let err = builder
            .add_terminal("x", token_symbol_flags::GROUP_START)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn rejects_grammar_info_set_twice() {
        let mut builder = GrammarBuilder::new();
        let s = builder.declare_nonterminal("S", 0).unwrap();
        builder.set_grammar_info("G", s).unwrap();
        let err = builder.set_grammar_info("G", s).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn rejects_duplicate_special_name() {
        let mut builder = GrammarBuilder::new();
        let x = builder.add_terminal("x", 0).unwrap();
        builder.add_special_name("EOF", x).unwrap();
        let err = builder.add_special_name("EOF", x).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn rejects_production_member_for_wrong_production() {
        let mut builder = GrammarBuilder::new();
        let x = builder.add_terminal("x", 0).unwrap();
        let s = builder.declare_nonterminal("S", 2).unwrap();
        let p1 = builder.add_production(s, 1).unwrap();
        // p1's member quota isn't filled yet; starting p2 must be rejected.
        let err = builder.add_production(s, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        builder.add_production_member(p1, x).unwrap();
    }
}
