//! The LR(1)/GLR(1) parser engine (spec §6): a serialized blob of per-state action and goto
//! tables, stored in a `StateMachine` row.

mod engine;

pub use engine::{Action, LrEngine, LrState};
