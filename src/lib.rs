//! # farkle_grammar
//!
//! A self-describing binary container for context-free grammars: symbols, productions, a
//! lexical DFA, and LR(1)/GLR(1) parser tables, read back without copying the source buffer.
//!
//! ## Example
//!
//! ```ignore
//! use farkle_grammar::Grammar;
//!
//! let grammar = Grammar::load(&bytes)?;
//! println!("grammar: {}", grammar.name());
//! for nonterminal in grammar.nonterminals() {
//!     println!("  {}", nonterminal.name());
//! }
//! ```

pub mod builder;
pub mod container;
pub mod dfa;
pub mod entities;
pub mod error;
pub mod grammar;
pub mod heaps;
pub mod lr;
pub mod reader;
pub mod tables;
mod validate;
pub mod width;
pub mod writer;

pub use builder::GrammarBuilder;
pub use error::{Error, Result};
pub use grammar::Grammar;

pub use entities::{
    AdvanceMode, EndingMode, EntityHandle, Group, Nonterminal, Production, Symbol, TokenSymbol,
};
pub use dfa::{DfaEngine, DfaState, Edge, MatchOutcome};
pub use lr::{Action, LrEngine, LrState};
pub use tables::{CodedRef, CodedRefKind, StateMachineKind, TableKind};
