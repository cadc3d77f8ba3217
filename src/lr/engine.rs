//! Parsing and evaluation of a serialized LR(1)/GLR(1) engine (spec §6).
//!
//! Like [`crate::dfa::DfaEngine`], this reads a self-contained blob with its own widths,
//! independent of the grammar's [`crate::tables::TableContext`]. Per-state action and goto
//! lists are stored sorted, so single-state lookups are a binary search; [`LrEngine::prepare_for_parsing`]
//! trades the one-time cost of a hash map for O(1) lookups during an actual parse.

use std::cell::OnceCell;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::width::width_for_count;
use crate::writer::Writer;

const RECORD_SIZE: usize = 24;
const HEADER_SIZE: usize = 21;

/// A decoded LR action: `0` is error, positive is shift, negative is reduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// No valid action; a syntax error at this state/lookahead.
    Error,
    /// Shift and move to the given state.
    Shift(u32),
    /// Reduce by the given production.
    Reduce(u32),
}

impl Action {
    fn decode(value: i32) -> Self {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match value.cmp(&0) {
            Equal => Self::Error,
            Greater => Self::Shift(value as u32),
            Less => Self::Reduce((-value) as u32),
        }
    }

    fn encode(self) -> i32 {
        match self {
            Self::Error => 0,
            Self::Shift(state) => state as i32,
            Self::Reduce(production) => -(production as i32),
        }
    }
}

/// One state's action table, goto table, and end-of-file actions, as materialized for
/// construction.
#[derive(Debug, Clone, Default)]
pub struct LrState {
    /// `(terminal, action)` pairs, sorted and unique by terminal.
    pub actions: Vec<(u32, Action)>,
    /// `(nonterminal, target state)` pairs, sorted and unique by nonterminal.
    pub gotos: Vec<(u32, u32)>,
    /// Actions to take on end-of-file lookahead. At most one unless the engine is a GLR table
    /// with a genuine shift/reduce or reduce/reduce conflict on EOF.
    pub eof_actions: Vec<Action>,
}

/// A parsed LR(1)/GLR(1) engine, borrowing its blob.
#[derive(Debug)]
pub struct LrEngine<'a> {
    data: &'a [u8],
    /// Whether this engine's states may carry more than one action per terminal (GLR(1)). A
    /// conflict-free engine answers single-action queries directly; a conflict-carrying one
    /// rejects them with [`Error::NotSupported`] and must be driven through [`LrEngine::actions`]/
    /// [`LrEngine::eof_actions`]/[`LrEngine::gotos`] instead (spec §4.7, §6).
    pub allows_conflicts: bool,
    terminal_width: u8,
    nonterminal_width: u8,
    state_width: u8,
    action_width: u8,
    state_count: u32,
    action_cache: OnceCell<HashMap<(u32, u32), Action>>,
    goto_cache: OnceCell<HashMap<(u32, u32), u32>>,
}

impl<'a> LrEngine<'a> {
    /// Parse an engine from a blob previously written by [`LrEngine::write_to`].
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let allows_conflicts = reader.read_u8()? != 0;
        let terminal_width = reader.read_u8()?;
        let nonterminal_width = reader.read_u8()?;
        let state_width = reader.read_u8()?;
        let action_width = reader.read_u8()?;
        let state_count = reader.read_u32()?;
        let action_count = reader.read_u32()?;
        let goto_count = reader.read_u32()?;
        let eof_action_count = reader.read_u32()?;

        let states_end = HEADER_SIZE + state_count as usize * RECORD_SIZE;
        let actions_end =
            states_end + action_count as usize * (terminal_width as usize + action_width as usize);
        let gotos_end = actions_end
            + goto_count as usize * (nonterminal_width as usize + state_width as usize);
        let eof_end = gotos_end + eof_action_count as usize * action_width as usize;
        if eof_end > data.len() {
            return Err(Error::MalformedContainer {
                offset: eof_end,
                reason: "LR engine blob is shorter than its own header claims",
            });
        }

        Ok(Self {
            data,
            allows_conflicts,
            terminal_width,
            nonterminal_width,
            state_width,
            action_width,
            state_count,
            action_cache: OnceCell::new(),
            goto_cache: OnceCell::new(),
        })
    }

    /// Number of states, including the start state (state `1`).
    #[must_use]
    pub fn state_count(&self) -> u32 {
        self.state_count
    }

    fn actions_offset(&self) -> usize {
        HEADER_SIZE + self.state_count as usize * RECORD_SIZE
    }

    fn action_entry_size(&self) -> usize {
        self.terminal_width as usize + self.action_width as usize
    }

    fn gotos_offset(&self, action_count: u32) -> usize {
        self.actions_offset() + action_count as usize * self.action_entry_size()
    }

    fn goto_entry_size(&self) -> usize {
        self.nonterminal_width as usize + self.state_width as usize
    }

    fn state_record(&self, state: u32) -> Result<(u32, u32, u32, u32, u32, u32)> {
        if state == 0 || state > self.state_count {
            return Err(Error::InvalidHandle(format!(
                "LR state {state} is out of range"
            )));
        }
        let offset = HEADER_SIZE + (state as usize - 1) * RECORD_SIZE;
        let mut reader = Reader::new(&self.data[offset..]);
        let action_first = reader.read_u32()?;
        let action_len = reader.read_u32()?;
        let goto_first = reader.read_u32()?;
        let goto_len = reader.read_u32()?;
        let eof_first = reader.read_u32()?;
        let eof_len = reader.read_u32()?;
        Ok((action_first, action_len, goto_first, goto_len, eof_first, eof_len))
    }

    fn action_at(&self, global_index: u32) -> Result<(u32, Action)> {
        let offset = self.actions_offset() + global_index as usize * self.action_entry_size();
        let mut reader = Reader::new(&self.data[offset..]);
        let terminal = reader.read_width(self.terminal_width)?;
        let action = reader.read_signed(self.action_width)?;
        Ok((terminal, Action::decode(action)))
    }

    fn goto_at(&self, global_index: u32, action_count: u32) -> Result<(u32, u32)> {
        let offset = self.gotos_offset(action_count) + global_index as usize * self.goto_entry_size();
        let mut reader = Reader::new(&self.data[offset..]);
        let nonterminal = reader.read_width(self.nonterminal_width)?;
        let target = reader.read_width(self.state_width)?;
        Ok((nonterminal, target))
    }

    fn eof_at(&self, global_index: u32, action_count: u32, goto_count: u32) -> Result<Action> {
        let offset = self.gotos_offset(action_count)
            + goto_count as usize * self.goto_entry_size()
            + global_index as usize * self.action_width as usize;
        let mut reader = Reader::new(&self.data[offset..]);
        Ok(Action::decode(reader.read_signed(self.action_width)?))
    }

    fn total_action_count(&self) -> Result<u32> {
        // Every state's action range starts after the previous one's, so the last state's
        // action_first + action_len is the grand total; state 1 always exists in a valid engine.
        let (action_first, action_len, ..) = self.state_record(self.state_count)?;
        Ok(action_first + action_len)
    }

    fn total_goto_count(&self) -> Result<u32> {
        let (_, _, goto_first, goto_len, _, _) = self.state_record(self.state_count)?;
        Ok(goto_first + goto_len)
    }

    /// The action to take in `state` on lookahead `terminal`, found by binary search over the
    /// state's sorted action list (spec §6). Rejected with [`Error::NotSupported`] if this engine
    /// is GLR, since a conflict-carrying state may have more than one valid action.
    pub fn action(&self, state: u32, terminal: u32) -> Result<Action> {
        if self.allows_conflicts {
            return Err(Error::NotSupported(
                "single-action query against a conflict-carrying (GLR) state machine",
            ));
        }
        if let Some(cache) = self.action_cache.get() {
            return Ok(cache.get(&(state, terminal)).copied().unwrap_or(Action::Error));
        }
        let (action_first, action_len, ..) = self.state_record(state)?;
        let mut lo = 0u32;
        let mut hi = action_len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (key, action) = self.action_at(action_first + mid)?;
            if terminal < key {
                hi = mid;
            } else if terminal > key {
                lo = mid + 1;
            } else {
                return Ok(action);
            }
        }
        Ok(Action::Error)
    }

    /// All actions defined for `state`, in terminal order. Used for GLR states where more than
    /// one action may be recorded for the same terminal.
    pub fn actions(&self, state: u32) -> Result<Vec<(u32, Action)>> {
        let (action_first, action_len, ..) = self.state_record(state)?;
        (0..action_len)
            .map(|i| self.action_at(action_first + i))
            .collect()
    }

    /// The goto state for `state` on `nonterminal`, found by binary search.
    pub fn goto(&self, state: u32, nonterminal: u32) -> Result<Option<u32>> {
        if let Some(cache) = self.goto_cache.get() {
            return Ok(cache.get(&(state, nonterminal)).copied());
        }
        let (_, _, goto_first, goto_len, _, _) = self.state_record(state)?;
        let action_count = self.total_action_count()?;
        let mut lo = 0u32;
        let mut hi = goto_len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (key, target) = self.goto_at(goto_first + mid, action_count)?;
            if nonterminal < key {
                hi = mid;
            } else if nonterminal > key {
                lo = mid + 1;
            } else {
                return Ok(Some(target));
            }
        }
        Ok(None)
    }

    /// All gotos defined for `state`, in nonterminal order.
    pub fn gotos(&self, state: u32) -> Result<Vec<(u32, u32)>> {
        let (_, _, goto_first, goto_len, _, _) = self.state_record(state)?;
        let action_count = self.total_action_count()?;
        (0..goto_len)
            .map(|i| self.goto_at(goto_first + i, action_count))
            .collect()
    }

    /// The primary end-of-file action for `state` (the first recorded, if any). Rejected with
    /// [`Error::NotSupported`] if this engine is GLR.
    pub fn eof_action(&self, state: u32) -> Result<Action> {
        if self.allows_conflicts {
            return Err(Error::NotSupported(
                "single-action query against a conflict-carrying (GLR) state machine",
            ));
        }
        let (_, _, _, _, eof_first, eof_len) = self.state_record(state)?;
        if eof_len == 0 {
            return Ok(Action::Error);
        }
        let action_count = self.total_action_count()?;
        let goto_count = self.total_goto_count()?;
        self.eof_at(eof_first, action_count, goto_count)
    }

    /// All end-of-file actions recorded for `state`. More than one only occurs in a GLR table
    /// with a genuine conflict on end-of-file lookahead.
    pub fn eof_actions(&self, state: u32) -> Result<Vec<Action>> {
        let (_, _, _, _, eof_first, eof_len) = self.state_record(state)?;
        let action_count = self.total_action_count()?;
        let goto_count = self.total_goto_count()?;
        (0..eof_len)
            .map(|i| self.eof_at(eof_first + i, action_count, goto_count))
            .collect()
    }

    /// Populate the lazy hash-map caches used by a driving parser for O(1) lookups, replacing
    /// the per-call binary search `action`/`goto` otherwise do. Idempotent; the first call pays
    /// the cost of reading every state once. A no-op for GLR engines, whose `action`/`eof_action`
    /// always reject the single-action query and so never consult this cache; building it would
    /// also silently drop conflicting entries under a single hash-map key.
    pub fn prepare_for_parsing(&self) -> Result<()> {
        if self.allows_conflicts || self.action_cache.get().is_some() {
            return Ok(());
        }
        let mut actions = HashMap::new();
        let mut gotos = HashMap::new();
        let action_count = self.total_action_count()?;
        for state in 1..=self.state_count {
            for (terminal, action) in self.actions(state)? {
                actions.insert((state, terminal), action);
            }
            let (_, _, goto_first, goto_len, _, _) = self.state_record(state)?;
            for i in 0..goto_len {
                let (nonterminal, target) = self.goto_at(goto_first + i, action_count)?;
                gotos.insert((state, nonterminal), target);
            }
        }
        let _ = self.action_cache.set(actions);
        let _ = self.goto_cache.set(gotos);
        Ok(())
    }

    /// Serialize `states` (state `1` is the start state) into a blob [`LrEngine::parse`] can
    /// read back.
    #[must_use]
    pub fn write_to(
        writer: &mut Writer,
        states: &[LrState],
        terminal_count: u32,
        nonterminal_count: u32,
        allows_conflicts: bool,
    ) {
        let state_width = width_for_count(states.len() as u32);
        let terminal_width = width_for_count(terminal_count);
        let nonterminal_width = width_for_count(nonterminal_count);
        let max_magnitude = states
            .iter()
            .flat_map(|s| s.actions.iter().map(|(_, a)| *a).chain(s.eof_actions.iter().copied()))
            .map(|a| a.encode().unsigned_abs())
            .max()
            .unwrap_or(0);
        let action_width = width_for_count(max_magnitude);

        let action_count: u32 = states.iter().map(|s| s.actions.len() as u32).sum();
        let goto_count: u32 = states.iter().map(|s| s.gotos.len() as u32).sum();
        let eof_action_count: u32 = states.iter().map(|s| s.eof_actions.len() as u32).sum();

        writer.write_u8(u8::from(allows_conflicts));
        writer.write_u8(terminal_width);
        writer.write_u8(nonterminal_width);
        writer.write_u8(state_width);
        writer.write_u8(action_width);
        writer.write_u32(states.len() as u32);
        writer.write_u32(action_count);
        writer.write_u32(goto_count);
        writer.write_u32(eof_action_count);

        let mut action_cursor = 0u32;
        let mut goto_cursor = 0u32;
        let mut eof_cursor = 0u32;
        for state in states {
            writer.write_u32(action_cursor);
            writer.write_u32(state.actions.len() as u32);
            writer.write_u32(goto_cursor);
            writer.write_u32(state.gotos.len() as u32);
            writer.write_u32(eof_cursor);
            writer.write_u32(state.eof_actions.len() as u32);
            action_cursor += state.actions.len() as u32;
            goto_cursor += state.gotos.len() as u32;
            eof_cursor += state.eof_actions.len() as u32;
        }
        for state in states {
            for (terminal, action) in &state.actions {
                writer.write_width(*terminal, terminal_width);
                writer.write_signed(action.encode(), action_width);
            }
        }
        for state in states {
            for (nonterminal, target) in &state.gotos {
                writer.write_width(*nonterminal, nonterminal_width);
                writer.write_width(*target, state_width);
            }
        }
        for state in states {
            for action in &state.eof_actions {
                writer.write_signed(action.encode(), action_width);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_state_shift_engine() -> Vec<u8> {
        let states = vec![LrState {
            actions: vec![(1, Action::Shift(2)), (2, Action::Reduce(1))],
            gotos: vec![(1, 3)],
            eof_actions: vec![Action::Reduce(1)],
        }];
        let mut w = Writer::new();
        LrEngine::write_to(&mut w, &states, 2, 1, false);
        w.into_inner()
    }

    fn conflicting_state_engine() -> Vec<u8> {
        let states = vec![LrState {
            actions: vec![(1, Action::Shift(2)), (1, Action::Reduce(1))],
            gotos: vec![(1, 3)],
            eof_actions: vec![Action::Reduce(1), Action::Reduce(2)],
        }];
        let mut w = Writer::new();
        LrEngine::write_to(&mut w, &states, 2, 1, true);
        w.into_inner()
    }

    #[test]
    fn action_lookup_finds_shift_and_reduce() {
        let blob = single_state_shift_engine();
        let engine = LrEngine::parse(&blob).unwrap();
        assert_eq!(engine.action(1, 1).unwrap(), Action::Shift(2));
        assert_eq!(engine.action(1, 2).unwrap(), Action::Reduce(1));
    }

    #[test]
    fn action_lookup_defaults_to_error() {
        let blob = single_state_shift_engine();
        let engine = LrEngine::parse(&blob).unwrap();
        assert_eq!(engine.action(1, 99).unwrap(), Action::Error);
    }

    #[test]
    fn goto_lookup_finds_target() {
        let blob = single_state_shift_engine();
        let engine = LrEngine::parse(&blob).unwrap();
        assert_eq!(engine.goto(1, 1).unwrap(), Some(3));
        assert_eq!(engine.goto(1, 99).unwrap(), None);
    }

    #[test]
    fn eof_action_is_recorded() {
        let blob = single_state_shift_engine();
        let engine = LrEngine::parse(&blob).unwrap();
        assert_eq!(engine.eof_action(1).unwrap(), Action::Reduce(1));
    }

    #[test]
    fn prepare_for_parsing_is_idempotent() {
        let blob = single_state_shift_engine();
        let engine = LrEngine::parse(&blob).unwrap();
        engine.prepare_for_parsing().unwrap();
        engine.prepare_for_parsing().unwrap();
    }

    #[test]
    fn glr_rejects_single_action_queries() {
        let blob = conflicting_state_engine();
        let engine = LrEngine::parse(&blob).unwrap();
        assert!(engine.allows_conflicts);
        assert!(matches!(engine.action(1, 1), Err(Error::NotSupported(_))));
        assert!(matches!(engine.eof_action(1), Err(Error::NotSupported(_))));
    }

    #[test]
    fn glr_enumerable_views_still_work() {
        let blob = conflicting_state_engine();
        let engine = LrEngine::parse(&blob).unwrap();
        assert_eq!(
            engine.actions(1).unwrap(),
            vec![(1, Action::Shift(2)), (1, Action::Reduce(1))]
        );
        assert_eq!(engine.gotos(1).unwrap(), vec![(1, 3)]);
        assert_eq!(
            engine.eof_actions(1).unwrap(),
            vec![Action::Reduce(1), Action::Reduce(2)]
        );
    }

    #[test]
    fn prepare_for_parsing_is_a_no_op_for_glr() {
        let blob = conflicting_state_engine();
        let engine = LrEngine::parse(&blob).unwrap();
        engine.prepare_for_parsing().unwrap();
        assert!(matches!(engine.action(1, 1), Err(Error::NotSupported(_))));
    }
}
