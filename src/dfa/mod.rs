//! The DFA tokenizer engine (spec §5): a serialized blob describing a lexical automaton,
//! stored in a `StateMachine` row and read back without needing the rest of the container.

mod ascii;
mod engine;

pub use ascii::AsciiTable;
pub use engine::{DfaEngine, DfaState, Edge, MatchOutcome};
