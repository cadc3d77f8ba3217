//! The top-level `Grammar` facade (spec §3, §6): loads a container, owns its byte buffer for the
//! whole of its lifetime, and hands out typed views plus the DFA/LR engines stored inside it.

use crate::container::ContainerHeader;
use crate::dfa::DfaEngine;
use crate::entities::{EntityHandle, Group, Nonterminal, Symbol, TokenSymbol};
use crate::error::{Error, Result};
use crate::heaps::{BlobHeap, StringHeap};
use crate::lr::LrEngine;
use crate::reader::Reader;
use crate::tables::{
    GrammarRow, GroupNestingRow, GroupRow, NonterminalRow, ProductionMemberRow, ProductionRow,
    SpecialNameRow, StateMachineKind, StateMachineRow, TableContext, TableKind, TablesHeader,
    TokenSymbolRow,
};
use crate::validate;

/// A fully loaded grammar. Owns its source buffer; every row and heap lookup is resolved against
/// tables parsed once at load time (mirroring the teacher's `Metadata::parse`, which eagerly
/// parses every present table into a `Vec<Row>` rather than reading lazily on each access).
#[derive(Debug)]
pub struct Grammar {
    data: Vec<u8>,
    string_heap: StringHeap,
    blob_heap: BlobHeap,
    ctx: TableContext,
    grammar_row: GrammarRow,
    token_symbols: Vec<TokenSymbolRow>,
    groups: Vec<GroupRow>,
    group_nestings: Vec<GroupNestingRow>,
    nonterminals: Vec<NonterminalRow>,
    productions: Vec<ProductionRow>,
    production_members: Vec<ProductionMemberRow>,
    state_machines: Vec<StateMachineRow>,
    special_names: Vec<SpecialNameRow>,
}

fn parse_table<T>(
    reader: &mut Reader<'_>,
    ctx: &TableContext,
    kind: TableKind,
    parser: impl Fn(&mut Reader<'_>, &TableContext) -> Result<T>,
) -> Result<Vec<T>> {
    let count = ctx.row_count(kind) as usize;
    let mut rows = Vec::with_capacity(count);
    for _ in 0..count {
        rows.push(parser(reader, ctx)?);
    }
    Ok(rows)
}

impl Grammar {
    /// Load a grammar from a container byte buffer, running container and schema validation
    /// (spec §4.8, levels 1–2) but not the opt-in content pass — see [`Grammar::load_validated`].
    pub fn load(bytes: &[u8]) -> Result<Self> {
        Self::load_impl(bytes, false)
    }

    /// Load a grammar and additionally run the opt-in content validation pass (spec §4.8, level
    /// 3), recommended for untrusted input.
    pub fn load_validated(bytes: &[u8]) -> Result<Self> {
        Self::load_impl(bytes, true)
    }

    fn load_impl(bytes: &[u8], run_content_validation: bool) -> Result<Self> {
        let header = ContainerHeader::parse(bytes)?;
        let sections = header.sections(bytes.len())?;

        let string_heap = match sections.strings {
            Some((offset, length)) => StringHeap::parse(&bytes[offset..offset + length]),
            None => StringHeap::new(),
        };
        let blob_heap = match sections.blob {
            Some((offset, length)) => BlobHeap::parse(&bytes[offset..offset + length]),
            None => BlobHeap::new(),
        };

        let (tables_offset, tables_length) = sections.tables;
        let mut table_reader = Reader::new(&bytes[tables_offset..tables_offset + tables_length]);
        let tables_header = TablesHeader::parse(&mut table_reader)?;
        let ctx = tables_header.context(string_heap.size() as u32, blob_heap.size() as u32);

        validate::validate_schema(&tables_header, &ctx)?;

        let grammar_rows = parse_table(&mut table_reader, &ctx, TableKind::Grammar, GrammarRow::parse)?;
        let grammar_row = *grammar_rows.first().ok_or_else(|| {
            Error::InvalidData("the Grammar table must have exactly one row".to_string())
        })?;
        if grammar_rows.len() != 1 {
            return Err(Error::InvalidData(
                "the Grammar table must have exactly one row".to_string(),
            ));
        }

        let token_symbols = parse_table(
            &mut table_reader,
            &ctx,
            TableKind::TokenSymbol,
            TokenSymbolRow::parse,
        )?;
        let groups = parse_table(&mut table_reader, &ctx, TableKind::Group, GroupRow::parse)?;
        let group_nestings = parse_table(
            &mut table_reader,
            &ctx,
            TableKind::GroupNesting,
            GroupNestingRow::parse,
        )?;
        let nonterminals = parse_table(
            &mut table_reader,
            &ctx,
            TableKind::Nonterminal,
            NonterminalRow::parse,
        )?;
        let productions = parse_table(
            &mut table_reader,
            &ctx,
            TableKind::Production,
            ProductionRow::parse,
        )?;
        let production_members = parse_table(
            &mut table_reader,
            &ctx,
            TableKind::ProductionMember,
            ProductionMemberRow::parse,
        )?;
        let state_machines = parse_table(
            &mut table_reader,
            &ctx,
            TableKind::StateMachine,
            StateMachineRow::parse,
        )?;
        let special_names = parse_table(
            &mut table_reader,
            &ctx,
            TableKind::SpecialName,
            SpecialNameRow::parse,
        )?;

        let grammar = Self {
            data: bytes.to_vec(),
            string_heap,
            blob_heap,
            ctx,
            grammar_row,
            token_symbols,
            groups,
            group_nestings,
            nonterminals,
            productions,
            production_members,
            state_machines,
            special_names,
        };

        if run_content_validation {
            validate::validate_content(&grammar)?;
        }

        Ok(grammar)
    }

    /// Return the original container bytes this grammar was loaded from. A loaded grammar is
    /// strictly read-only, so this is always the verbatim input to [`Grammar::load`].
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// The grammar's own name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.resolve_string(self.grammar_row.name)
    }

    /// The nonterminal the grammar starts parsing from.
    #[must_use]
    pub fn start_symbol(&self) -> Nonterminal<'_> {
        Nonterminal::new(self, self.grammar_row.start_symbol)
    }

    /// Resolve a well-known name to the token symbol it is bound to, if any (spec §6).
    #[must_use]
    pub fn symbol_from_special_name(&self, name: &str) -> Option<EntityHandle> {
        let offset = self.string_heap.find(name)?;
        self.special_names
            .iter()
            .find(|row| row.name == offset)
            .map(|row| EntityHandle::new(TableKind::TokenSymbol, row.symbol))
    }

    /// All token symbols in table order.
    pub fn token_symbols(&self) -> impl Iterator<Item = TokenSymbol<'_>> + '_ {
        (1..=self.token_symbols.len() as u32).map(move |row| TokenSymbol::new(self, row))
    }

    /// All nonterminals in table order.
    pub fn nonterminals(&self) -> impl Iterator<Item = Nonterminal<'_>> + '_ {
        (1..=self.nonterminals.len() as u32).map(move |row| Nonterminal::new(self, row))
    }

    /// All lexical groups in table order.
    pub fn groups(&self) -> impl Iterator<Item = Group<'_>> + '_ {
        (1..=self.groups.len() as u32).map(move |row| Group::new(self, row))
    }

    /// The DFA tokenizer engine stored in this grammar, if any. Covers all three DFA kinds
    /// (conflict-free, conflict-carrying, default-transition supplement).
    pub fn dfa(&self) -> Result<Option<DfaEngine<'_>>> {
        match self.find_state_machine(StateMachineKind::is_dfa)? {
            Some((kind, blob)) => {
                let engine = DfaEngine::parse(blob)?;
                let expected_conflicts = kind == StateMachineKind::DfaWithConflicts;
                if engine.allows_conflicts != expected_conflicts {
                    return Err(Error::InvalidData(format!(
                        "state machine row says {kind:?} but its blob's conflict flag is {}",
                        engine.allows_conflicts
                    )));
                }
                Ok(Some(engine))
            }
            None => Ok(None),
        }
    }

    /// The LR(1)/GLR(1) parser engine stored in this grammar, if any.
    pub fn lr(&self) -> Result<Option<LrEngine<'_>>> {
        match self.find_state_machine(StateMachineKind::is_lr)? {
            Some((kind, blob)) => {
                let engine = LrEngine::parse(blob)?;
                let expected_conflicts = kind == StateMachineKind::Glr;
                if engine.allows_conflicts != expected_conflicts {
                    return Err(Error::InvalidData(format!(
                        "state machine row says {kind:?} but its blob's conflict flag is {}",
                        engine.allows_conflicts
                    )));
                }
                Ok(Some(engine))
            }
            None => Ok(None),
        }
    }

    fn find_state_machine(
        &self,
        matches: impl Fn(StateMachineKind) -> bool,
    ) -> Result<Option<(StateMachineKind, &[u8])>> {
        match self.state_machines.iter().find(|row| matches(row.kind)) {
            Some(row) => Ok(Some((row.kind, self.blob_heap.get(row.blob)?))),
            None => Ok(None),
        }
    }

    pub(crate) fn token_symbol_row(&self, row: u32) -> TokenSymbolRow {
        self.token_symbols[row as usize - 1]
    }

    pub(crate) fn group_row(&self, row: u32) -> GroupRow {
        self.groups[row as usize - 1]
    }

    pub(crate) fn group_nesting_row(&self, row: u32) -> GroupNestingRow {
        self.group_nestings[row as usize - 1]
    }

    pub(crate) fn nonterminal_row(&self, row: u32) -> NonterminalRow {
        self.nonterminals[row as usize - 1]
    }

    pub(crate) fn production_row(&self, row: u32) -> ProductionRow {
        self.productions[row as usize - 1]
    }

    pub(crate) fn production_member_row(&self, row: u32) -> ProductionMemberRow {
        self.production_members[row as usize - 1]
    }

    pub(crate) fn resolve_string(&self, offset: u32) -> &str {
        self.string_heap.get(offset).unwrap_or_default()
    }

    pub(crate) fn resolve_blob(&self, offset: u32) -> &[u8] {
        self.blob_heap.get(offset).unwrap_or_default()
    }

    pub(crate) fn group_count(&self) -> u32 {
        self.groups.len() as u32
    }

    pub(crate) fn group_nesting_count(&self) -> u32 {
        self.group_nestings.len() as u32
    }

    pub(crate) fn nonterminal_count(&self) -> u32 {
        self.nonterminals.len() as u32
    }

    pub(crate) fn production_count(&self) -> u32 {
        self.productions.len() as u32
    }

    pub(crate) fn production_member_count(&self) -> u32 {
        self.production_members.len() as u32
    }

    /// Resolve a `ProductionMember` row to the token symbol or nonterminal it references.
    pub(crate) fn resolve_member(&self, row: u32) -> Symbol<'_> {
        let target = self.production_member_row(row).target;
        match target.table {
            TableKind::Nonterminal => Symbol::Nonterminal(Nonterminal::new(self, target.row)),
            _ => Symbol::Token(TokenSymbol::new(self, target.row)),
        }
    }

    /// Raw access used by validation (spec §4.8) to walk every row without going through the
    /// typed entity facade.
    pub(crate) fn tables(&self) -> GrammarTables<'_> {
        GrammarTables {
            token_symbols: &self.token_symbols,
            groups: &self.groups,
            group_nestings: &self.group_nestings,
            nonterminals: &self.nonterminals,
            productions: &self.productions,
            production_members: &self.production_members,
            state_machines: &self.state_machines,
            special_names: &self.special_names,
        }
    }

    pub(crate) fn string_heap(&self) -> &StringHeap {
        &self.string_heap
    }

    pub(crate) fn blob_heap(&self) -> &BlobHeap {
        &self.blob_heap
    }

    pub(crate) fn context(&self) -> &TableContext {
        &self.ctx
    }
}

/// Borrowed view of every table, used by [`crate::validate`] and [`crate::builder`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrammarTables<'g> {
    pub token_symbols: &'g [TokenSymbolRow],
    pub groups: &'g [GroupRow],
    pub group_nestings: &'g [GroupNestingRow],
    pub nonterminals: &'g [NonterminalRow],
    pub productions: &'g [ProductionRow],
    pub production_members: &'g [ProductionMemberRow],
    pub state_machines: &'g [StateMachineRow],
    pub special_names: &'g [SpecialNameRow],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GrammarBuilder;

    fn trivial_grammar_bytes() -> Vec<u8> {
        let mut builder = GrammarBuilder::new();
        let x = builder.add_terminal("x", 0).unwrap();
        let s = builder.declare_nonterminal("S", 1).unwrap();
        let p = builder.add_production(s, 1).unwrap();
        builder.add_production_member(p, x).unwrap();
        builder.set_grammar_info("G", s).unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn loads_back_the_trivial_grammar() {
        let bytes = trivial_grammar_bytes();
        let grammar = Grammar::load(&bytes).unwrap();
        assert_eq!(grammar.name(), "G");
        assert_eq!(grammar.token_symbols().count(), 1);
        assert_eq!(grammar.nonterminals().count(), 1);
        let start = grammar.start_symbol();
        assert_eq!(start.name(), "S");
        let productions: Vec<_> = start.productions().collect();
        assert_eq!(productions.len(), 1);
        let members: Vec<_> = productions[0].members().collect();
        assert_eq!(members.len(), 1);
    }

    #[test]
    fn to_bytes_is_stable_across_a_load_roundtrip() {
        let bytes = trivial_grammar_bytes();
        let grammar = Grammar::load(&bytes).unwrap();
        assert_eq!(grammar.to_bytes(), bytes);
    }

    #[test]
    fn rejects_future_major_version() {
        let mut bytes = trivial_grammar_bytes();
        bytes[8] = (crate::container::CURRENT_MAJOR_VERSION + 1) as u8;
        bytes[9] = ((crate::container::CURRENT_MAJOR_VERSION + 1) >> 8) as u8;
        let err = Grammar::load(&bytes).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { .. }));
    }

    #[test]
    fn load_validated_accepts_a_genuine_glr_conflict() {
        use crate::lr::{Action, LrEngine, LrState};
        use crate::writer::Writer;

        let mut builder = GrammarBuilder::new();
        let x = builder.add_terminal("x", 0).unwrap();
        let s = builder.declare_nonterminal("S", 1).unwrap();
        let p = builder.add_production(s, 1).unwrap();
        builder.add_production_member(p, x).unwrap();
        builder.set_grammar_info("G", s).unwrap();

        let states = vec![LrState {
            actions: vec![(1, Action::Shift(1)), (1, Action::Reduce(1))],
            gotos: vec![],
            eof_actions: vec![],
        }];
        let mut w = Writer::new();
        LrEngine::write_to(&mut w, &states, 1, 1, true);
        builder
            .add_state_machine(StateMachineKind::Glr, &w.into_inner())
            .unwrap();

        let bytes = builder.finish().unwrap();
        let grammar = Grammar::load_validated(&bytes).unwrap();
        let lr = grammar.lr().unwrap().unwrap();
        assert!(lr.allows_conflicts);
        assert!(matches!(lr.action(1, 1), Err(Error::NotSupported(_))));
        assert_eq!(lr.actions(1).unwrap().len(), 2);
    }
}
