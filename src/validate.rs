//! Container, schema, and content validation (spec §4.8): three tiers of increasing cost. The
//! container and schema tiers run unconditionally on every load; content validation is opt-in
//! via [`crate::Grammar::load_validated`] since it walks every row.

use crate::error::{Error, Result};
use crate::grammar::Grammar;
use crate::tables::{TableContext, TableKind, TablesHeader};

/// Tier 2: the declared widths recomputed from row counts must match what the stream actually
/// used to store its rows, and every present table's row count must fit the format's ceilings.
pub(crate) fn validate_schema(header: &TablesHeader, ctx: &TableContext) -> Result<()> {
    if !header.has_table(TableKind::Grammar) || header.row_count(TableKind::Grammar) != 1 {
        return Err(Error::InvalidData(
            "the Grammar table must be present with exactly one row".to_string(),
        ));
    }

    if header.string_width != ctx.string_width || header.blob_width != ctx.blob_width {
        return Err(Error::InvalidData(
            "declared heap-offset width does not match the heap's own size".to_string(),
        ));
    }

    const MAX_ROW_COUNT: u32 = (1 << 24) - 1;
    const MAX_SYMBOL_ROW_COUNT: u32 = (1 << 20) - 1;
    for kind in crate::tables::ALL_TABLE_KINDS {
        let count = header.row_count(kind);
        let max = match kind {
            TableKind::TokenSymbol | TableKind::Nonterminal => MAX_SYMBOL_ROW_COUNT,
            _ => MAX_ROW_COUNT,
        };
        if count > max {
            return Err(Error::InvalidData(format!(
                "table {kind:?} has {count} rows, exceeding its {max}-row ceiling"
            )));
        }
        if header.has_table(kind) && header.row_width(kind) as usize != ctx.row_size(kind) {
            return Err(Error::InvalidData(format!(
                "table {kind:?} declares a row width of {} bytes, but its rows are {} bytes",
                header.row_width(kind),
                ctx.row_size(kind)
            )));
        }
    }

    Ok(())
}

/// Tier 3: every monotonic first-* index is non-decreasing and stays within its pool, and every
/// cross-table reference resolves to a row that exists.
pub(crate) fn validate_content(grammar: &Grammar) -> Result<()> {
    let tables = grammar.tables();

    let member_total = tables.production_members.len() as u32;
    let mut previous_first_member = 0u32;
    for (index, production) in tables.productions.iter().enumerate() {
        check_monotonic_slice(
            "Production.first_member",
            index as u32 + 1,
            production.first_member,
            &mut previous_first_member,
            member_total,
        )?;
    }

    let production_total = tables.productions.len() as u32;
    let mut previous_first_production = 0u32;
    for (index, nonterminal) in tables.nonterminals.iter().enumerate() {
        check_monotonic_slice(
            "Nonterminal.first_production",
            index as u32 + 1,
            nonterminal.first_production,
            &mut previous_first_production,
            production_total,
        )?;
    }

    let nesting_total = tables.group_nestings.len() as u32;
    let mut previous_first_nesting = 0u32;
    for (index, group) in tables.groups.iter().enumerate() {
        check_monotonic_slice(
            "Group.first_nesting",
            index as u32 + 1,
            group.first_nesting,
            &mut previous_first_nesting,
            nesting_total,
        )?;
    }

    for member in tables.production_members {
        check_row_in_range(member.target.table, member.target.row, &tables)?;
    }
    for group in tables.groups {
        check_token_symbol(group.container_token, &tables)?;
        check_token_symbol(group.start_token, &tables)?;
        if group.end_token != 0 {
            check_token_symbol(group.end_token, &tables)?;
        }
    }
    for nesting in tables.group_nestings {
        check_row(
            "GroupNesting.nested_group",
            nesting.nested_group,
            tables.groups.len() as u32,
        )?;
    }
    for special_name in tables.special_names {
        check_token_symbol(special_name.symbol, &tables)?;
    }
    for production in tables.productions {
        check_row(
            "Production.nonterminal",
            production.nonterminal,
            tables.nonterminals.len() as u32,
        )?;
    }

    let start_row = grammar.start_symbol().handle().row();
    check_row("Grammar.start_symbol", start_row, tables.nonterminals.len() as u32)?;

    let token_symbol_count = tables.token_symbols.len() as u32;
    if let Some(dfa) = grammar.dfa()? {
        validate_dfa_edges(&dfa, token_symbol_count)?;
    }
    if let Some(lr) = grammar.lr()? {
        validate_lr_actions(&lr, production_total)?;
    }

    Ok(())
}

fn check_monotonic_slice(
    field: &'static str,
    row: u32,
    first: u32,
    previous_first: &mut u32,
    pool_size: u32,
) -> Result<()> {
    if first != 0 {
        if first < *previous_first {
            return Err(Error::InvalidData(format!(
                "{field} at row {row} is not monotonic non-decreasing"
            )));
        }
        if first > pool_size {
            return Err(Error::InvalidData(format!(
                "{field} at row {row} points past the end of its pool"
            )));
        }
        *previous_first = first;
    }
    Ok(())
}

fn check_row(field: &'static str, row: u32, table_len: u32) -> Result<()> {
    if row == 0 || row > table_len {
        return Err(Error::InvalidData(format!(
            "{field} references row {row}, out of range for a table with {table_len} rows"
        )));
    }
    Ok(())
}

fn check_token_symbol(row: u32, tables: &crate::grammar::GrammarTables<'_>) -> Result<()> {
    check_row("token symbol reference", row, tables.token_symbols.len() as u32)
}

fn check_row_in_range(
    kind: TableKind,
    row: u32,
    tables: &crate::grammar::GrammarTables<'_>,
) -> Result<()> {
    let table_len = match kind {
        TableKind::TokenSymbol => tables.token_symbols.len(),
        TableKind::Nonterminal => tables.nonterminals.len(),
        _ => {
            return Err(Error::InvalidData(format!(
                "a production member may not reference table {kind:?}"
            )));
        }
    } as u32;
    check_row("ProductionMember.target", row, table_len)
}

fn validate_dfa_edges(dfa: &crate::dfa::DfaEngine<'_>, token_symbol_count: u32) -> Result<()> {
    for state in 1..=dfa.state_count() {
        let mut previous_key_to: Option<u32> = None;
        for edge in dfa.edges(state)? {
            if edge.key_from > edge.key_to {
                return Err(Error::InvalidData(format!(
                    "DFA state {state} has an edge with key_from > key_to"
                )));
            }
            if let Some(previous) = previous_key_to {
                if edge.key_from <= previous {
                    return Err(Error::InvalidData(format!(
                        "DFA state {state} has overlapping or out-of-order edges"
                    )));
                }
            }
            previous_key_to = Some(edge.key_to);
        }
        for symbol in dfa.accepts(state)? {
            check_row("DFA accept symbol", symbol, token_symbol_count)?;
        }
    }
    Ok(())
}

/// Checks the terminal ordering within one state's action list and bounds-checks every
/// shift/reduce target. Conflict-free machines require strictly increasing terminals (spec §8's
/// "at most one entry" law); a GLR machine may legitimately repeat a terminal across a genuine
/// conflict, so only out-of-order (not merely repeated) terminals are rejected there.
fn validate_lr_actions(lr: &crate::lr::LrEngine<'_>, production_count: u32) -> Result<()> {
    let state_count = lr.state_count();
    for state in 1..=state_count {
        let mut previous_terminal: Option<u32> = None;
        for (terminal, action) in lr.actions(state)? {
            if let Some(previous) = previous_terminal {
                let out_of_order = if lr.allows_conflicts {
                    terminal < previous
                } else {
                    terminal <= previous
                };
                if out_of_order {
                    return Err(Error::InvalidData(format!(
                        "LR state {state} has an out-of-order action terminal"
                    )));
                }
            }
            previous_terminal = Some(terminal);
            check_lr_action(state, action, production_count, state_count)?;
        }
        for action in lr.eof_actions(state)? {
            check_lr_action(state, action, production_count, state_count)?;
        }
        for (_, target) in lr.gotos(state)? {
            check_row("LR goto target", target, state_count)?;
        }
    }
    Ok(())
}

fn check_lr_action(
    state: u32,
    action: crate::lr::Action,
    production_count: u32,
    state_count: u32,
) -> Result<()> {
    match action {
        crate::lr::Action::Error => Ok(()),
        crate::lr::Action::Shift(target) => {
            check_row("LR shift target", target, state_count)
        }
        crate::lr::Action::Reduce(production) => {
            check_row("LR reduce production", production, production_count)
        }
    }
    .map_err(|_| {
        Error::InvalidData(format!("LR state {state} has an out-of-range action target"))
    })
}
