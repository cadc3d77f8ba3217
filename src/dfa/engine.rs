//! Parsing and evaluation of a serialized DFA tokenizer engine (spec §5).
//!
//! The blob is self-contained: a small fixed header, then a states array, an edges array, and
//! an accept-symbol array, each addressed with widths computed for this engine alone (the
//! engine doesn't share the grammar's own [`crate::tables::TableContext`], since it is read back
//! out of a single `#Blob` entry with no access to the rest of the container).

use std::sync::OnceLock;

use crate::dfa::ascii::AsciiTable;
use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::width::width_for_count;
use crate::writer::Writer;

const HEADER_SIZE: usize = 16;

fn state_record_size(state_width: u8) -> usize {
    4 + 4 + state_width as usize + 4 + 4
}

fn edge_record_size(state_width: u8) -> usize {
    4 + 4 + state_width as usize
}

/// One DFA state's definition, as materialized for construction or inspection.
#[derive(Debug, Clone)]
pub struct DfaState {
    /// Outgoing edges, sorted and non-overlapping by `key_from`.
    pub edges: Vec<Edge>,
    /// The state to move to when no edge matches, if any.
    pub default_transition: Option<u32>,
    /// Token symbols this state accepts (at most one unless the engine allows conflicts).
    pub accepts: Vec<u32>,
}

/// One DFA edge: the inclusive `[key_from, key_to]` range of code points it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// First code point covered (inclusive).
    pub key_from: u32,
    /// Last code point covered (inclusive).
    pub key_to: u32,
    /// 1-based target state.
    pub target: u32,
}

/// Outcome of running the engine's longest-match algorithm over some input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A token was recognized, consuming `len` bytes and accepting `symbol`.
    Complete { len: usize, symbol: u32 },
    /// The input was exhausted while still in a state that could extend the match, and the
    /// caller signaled more input may arrive (`is_final` was `false`).
    Incomplete,
    /// No prefix of the input is accepted by this engine.
    NoMatch,
}

/// A parsed DFA tokenizer engine, borrowing its blob.
#[derive(Debug)]
pub struct DfaEngine<'a> {
    data: &'a [u8],
    /// Whether a state may accept more than one token symbol (spec §5: "with conflicts").
    pub allows_conflicts: bool,
    symbol_width: u8,
    state_width: u8,
    state_count: u32,
    edge_count: u32,
    states_offset: usize,
    edges_offset: usize,
    start_ascii: OnceLock<AsciiTable>,
}

impl<'a> DfaEngine<'a> {
    /// Parse an engine from a blob previously written by [`DfaEngine::write_to`].
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let allows_conflicts = reader.read_u8()? != 0;
        let symbol_width = reader.read_u8()?;
        let state_width = reader.read_u8()?;
        let _reserved = reader.read_u8()?;
        let state_count = reader.read_u32()?;
        let edge_count = reader.read_u32()?;
        let _accept_count = reader.read_u32()?;

        let states_offset = HEADER_SIZE;
        let edges_offset = states_offset + state_count as usize * state_record_size(state_width);
        let accepts_end =
            edges_offset + edge_count as usize * edge_record_size(state_width);
        if accepts_end > data.len() {
            return Err(Error::MalformedContainer {
                offset: accepts_end,
                reason: "DFA engine blob is shorter than its own header claims",
            });
        }

        Ok(Self {
            data,
            allows_conflicts,
            symbol_width,
            state_width,
            state_count,
            edge_count,
            states_offset,
            edges_offset,
            start_ascii: OnceLock::new(),
        })
    }

    /// Number of states, including the start state (state `1`).
    #[must_use]
    pub fn state_count(&self) -> u32 {
        self.state_count
    }

    fn state_record(&self, state: u32) -> Result<(u32, u32, Option<u32>, u32, u32)> {
        if state == 0 || state > self.state_count {
            return Err(Error::InvalidHandle(format!(
                "DFA state {state} is out of range"
            )));
        }
        let offset =
            self.states_offset + (state as usize - 1) * state_record_size(self.state_width);
        let mut reader = Reader::new(&self.data[offset..]);
        let edge_first = reader.read_u32()?;
        let edge_len = reader.read_u32()?;
        let default_transition = reader.read_width(self.state_width)?;
        let accept_first = reader.read_u32()?;
        let accept_len = reader.read_u32()?;
        Ok((
            edge_first,
            edge_len,
            (default_transition != 0).then_some(default_transition),
            accept_first,
            accept_len,
        ))
    }

    fn edge_at(&self, edge_index: u32) -> Result<Edge> {
        if edge_index >= self.edge_count {
            return Err(Error::InvalidHandle(format!(
                "DFA edge index {edge_index} is out of range"
            )));
        }
        let offset =
            self.edges_offset + edge_index as usize * edge_record_size(self.state_width);
        let mut reader = Reader::new(&self.data[offset..]);
        let key_from = reader.read_u32()?;
        let key_to = reader.read_u32()?;
        let target = reader.read_width(self.state_width)?;
        Ok(Edge {
            key_from,
            key_to,
            target,
        })
    }

    fn accept_at(&self, index: u32) -> Result<u32> {
        // Accept entries follow immediately after the edges array.
        let accepts_offset =
            self.edges_offset + self.edge_count as usize * edge_record_size(self.state_width);
        let offset = accepts_offset + index as usize * self.symbol_width as usize;
        let mut reader = Reader::new(&self.data[offset..]);
        reader.read_width(self.symbol_width)
    }

    /// The edge whose `[key_from, key_to]` range covers `codepoint`, found by binary search
    /// over the state's sorted, non-overlapping edges.
    pub fn find_edge(&self, state: u32, codepoint: u32) -> Result<Option<u32>> {
        let (edge_first, edge_len, default_transition, _, _) = self.state_record(state)?;
        let mut lo = 0u32;
        let mut hi = edge_len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let edge = self.edge_at(edge_first + mid)?;
            if codepoint < edge.key_from {
                hi = mid;
            } else if codepoint > edge.key_to {
                lo = mid + 1;
            } else {
                return Ok(Some(edge.target));
            }
        }
        Ok(default_transition)
    }

    /// The outgoing edges of `state`, in storage order (sorted, non-overlapping by construction).
    pub fn edges(&self, state: u32) -> Result<Vec<Edge>> {
        let (edge_first, edge_len, _, _, _) = self.state_record(state)?;
        (0..edge_len).map(|i| self.edge_at(edge_first + i)).collect()
    }

    /// The accept symbols for `state`, in storage order.
    pub fn accepts(&self, state: u32) -> Result<Vec<u32>> {
        let (_, _, _, accept_first, accept_len) = self.state_record(state)?;
        (0..accept_len)
            .map(|i| self.accept_at(accept_first + i))
            .collect()
    }

    /// The single accept symbol for `state`, if any. For engines built `allows_conflicts`,
    /// returns the first of possibly several.
    pub fn first_accept(&self, state: u32) -> Result<Option<u32>> {
        let (_, _, _, accept_first, accept_len) = self.state_record(state)?;
        if accept_len == 0 {
            Ok(None)
        } else {
            Ok(Some(self.accept_at(accept_first)?))
        }
    }

    fn step(&self, state: u32, ch: char) -> Result<Option<u32>> {
        if state == 1 && (ch as u32) < 128 {
            let table = self.start_ascii.get_or_init(|| {
                AsciiTable::build(|cp| {
                    self.find_edge(1, cp).ok().flatten().unwrap_or(0)
                })
            });
            if let Some(target) = table.get(ch as u8) {
                return Ok(Some(target));
            }
        }
        self.find_edge(state, ch as u32)
    }

    /// Run the longest-match algorithm over `input`, starting from the start state.
    ///
    /// `is_final` tells the engine whether `input` is truly the end of the source: if the
    /// match is still extendable when `input` runs out and `is_final` is `false`, the result is
    /// [`MatchOutcome::Incomplete`] rather than committing early to a shorter token.
    pub fn run(&self, input: &str, is_final: bool) -> Result<MatchOutcome> {
        let mut state = 1u32;
        let mut best: Option<(usize, u32)> = None;
        let mut byte_pos = 0usize;
        let mut exhausted = true;

        for ch in input.chars() {
            match self.step(state, ch)? {
                Some(next) => {
                    state = next;
                    byte_pos += ch.len_utf8();
                    if let Some(symbol) = self.first_accept(state)? {
                        best = Some((byte_pos, symbol));
                    }
                }
                None => {
                    exhausted = false;
                    break;
                }
            }
        }

        if exhausted && !is_final {
            let (_, edge_len, default_transition, ..) = self.state_record(state)?;
            if edge_len > 0 || default_transition.is_some() {
                return Ok(MatchOutcome::Incomplete);
            }
        }

        match best {
            Some((len, symbol)) => Ok(MatchOutcome::Complete { len, symbol }),
            None => Ok(MatchOutcome::NoMatch),
        }
    }

    /// Serialize `states` (state `1` is the start state) into a blob [`DfaEngine::parse`] can
    /// read back, given widths sized for `token_symbol_count` symbols.
    #[must_use]
    pub fn write_to(
        writer: &mut Writer,
        states: &[DfaState],
        allows_conflicts: bool,
        token_symbol_count: u32,
    ) {
        let state_width = width_for_count(states.len() as u32);
        let symbol_width = width_for_count(token_symbol_count);
        let edge_count: u32 = states.iter().map(|s| s.edges.len() as u32).sum();
        let accept_count: u32 = states.iter().map(|s| s.accepts.len() as u32).sum();

        writer.write_u8(u8::from(allows_conflicts));
        writer.write_u8(symbol_width);
        writer.write_u8(state_width);
        writer.write_u8(0);
        writer.write_u32(states.len() as u32);
        writer.write_u32(edge_count);
        writer.write_u32(accept_count);

        let mut edge_cursor = 0u32;
        let mut accept_cursor = 0u32;
        for state in states {
            writer.write_u32(edge_cursor);
            writer.write_u32(state.edges.len() as u32);
            writer.write_width(state.default_transition.unwrap_or(0), state_width);
            writer.write_u32(accept_cursor);
            writer.write_u32(state.accepts.len() as u32);
            edge_cursor += state.edges.len() as u32;
            accept_cursor += state.accepts.len() as u32;
        }
        for state in states {
            for edge in &state.edges {
                writer.write_u32(edge.key_from);
                writer.write_u32(edge.key_to);
                writer.write_width(edge.target, state_width);
            }
        }
        for state in states {
            for &symbol in &state.accepts {
                writer.write_width(symbol, symbol_width);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identifier_engine() -> Vec<u8> {
        // state 1: [a-z] -> state 2 (no accept)
        // state 2: [a-z] -> state 2 (accept symbol 1), anything else: dead end
        let states = vec![
            DfaState {
                edges: vec![Edge {
                    key_from: b'a' as u32,
                    key_to: b'z' as u32,
                    target: 2,
                }],
                default_transition: None,
                accepts: vec![],
            },
            DfaState {
                edges: vec![Edge {
                    key_from: b'a' as u32,
                    key_to: b'z' as u32,
                    target: 2,
                }],
                default_transition: None,
                accepts: vec![1],
            },
        ];
        let mut w = Writer::new();
        DfaEngine::write_to(&mut w, &states, false, 2);
        w.into_inner()
    }

    #[test]
    fn matches_longest_identifier_at_eof() {
        let blob = identifier_engine();
        let engine = DfaEngine::parse(&blob).unwrap();
        let outcome = engine.run("abc", true).unwrap();
        assert_eq!(
            outcome,
            MatchOutcome::Complete {
                len: 3,
                symbol: 1
            }
        );
    }

    #[test]
    fn withholds_accept_when_not_final_and_still_extendable() {
        let blob = identifier_engine();
        let engine = DfaEngine::parse(&blob).unwrap();
        let outcome = engine.run("abc", false).unwrap();
        assert_eq!(outcome, MatchOutcome::Incomplete);
    }

    #[test]
    fn commits_on_dead_edge_regardless_of_is_final() {
        let blob = identifier_engine();
        let engine = DfaEngine::parse(&blob).unwrap();
        let outcome = engine.run("abc123", false).unwrap();
        assert_eq!(
            outcome,
            MatchOutcome::Complete {
                len: 3,
                symbol: 1
            }
        );
    }

    fn dead_end_accept_engine() -> Vec<u8> {
        // state 1: '"' -> state 2 (no accept); state 2: no edges, no default transition, accepts.
        let states = vec![
            DfaState {
                edges: vec![Edge {
                    key_from: b'"' as u32,
                    key_to: b'"' as u32,
                    target: 2,
                }],
                default_transition: None,
                accepts: vec![],
            },
            DfaState {
                edges: vec![],
                default_transition: None,
                accepts: vec![1],
            },
        ];
        let mut w = Writer::new();
        DfaEngine::write_to(&mut w, &states, false, 1);
        w.into_inner()
    }

    #[test]
    fn commits_at_eof_on_true_dead_end_even_when_not_final() {
        let blob = dead_end_accept_engine();
        let engine = DfaEngine::parse(&blob).unwrap();
        let outcome = engine.run("\"", false).unwrap();
        assert_eq!(outcome, MatchOutcome::Complete { len: 1, symbol: 1 });
    }

    #[test]
    fn no_match_on_unrecognized_input() {
        let blob = identifier_engine();
        let engine = DfaEngine::parse(&blob).unwrap();
        let outcome = engine.run("123", true).unwrap();
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }
}
