//! The `#~` table stream: schema, row layouts, and coded references (spec §4.4–§4.7).

mod coded;
mod context;
mod header;
mod kind;
mod rows;

pub use coded::{CodedRef, CodedRefKind};
pub use context::TableContext;
pub use header::TablesHeader;
pub use kind::{ALL_TABLE_KINDS, TableKind};
pub use rows::{
    GrammarRow, GroupNestingRow, GroupRow, NonterminalRow, ProductionMemberRow, ProductionRow,
    SpecialNameRow, StateMachineKind, StateMachineRow, TokenSymbolRow, token_symbol_flags,
};
