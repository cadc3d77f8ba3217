//! Typed view over a `Group` row: a lexical group such as a block comment (spec §4.5).

use crate::entities::handle::EntityHandle;
use crate::entities::symbol::TokenSymbol;
use crate::grammar::Grammar;
use crate::tables::TableKind;

/// How the tokenizer advances while scanning inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceMode {
    /// Consume one character at a time.
    Character,
    /// Consume one token at a time, allowing nested groups to be recognized as whole tokens.
    Token,
}

/// Whether a group's closing token is folded into the group's own token or left standalone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndingMode {
    /// The end token is consumed as part of the group.
    Closed,
    /// The group ends without consuming a terminating token (e.g. end-of-line comments).
    Open,
}

/// A lexical group: a run of input collapsed into a single token (comments, string literals).
#[derive(Debug, Clone, Copy)]
pub struct Group<'g> {
    grammar: &'g Grammar,
    handle: EntityHandle,
}

impl<'g> Group<'g> {
    pub(crate) fn new(grammar: &'g Grammar, row: u32) -> Self {
        Self {
            grammar,
            handle: EntityHandle::new(TableKind::Group, row),
        }
    }

    /// The handle identifying this group.
    #[must_use]
    pub fn handle(self) -> EntityHandle {
        self.handle
    }

    /// The group's name.
    #[must_use]
    pub fn name(self) -> &'g str {
        let row = self.grammar.group_row(self.handle.row());
        self.grammar.resolve_string(row.name)
    }

    /// The token symbol emitted for the group's contents as a whole.
    #[must_use]
    pub fn container_token(self) -> TokenSymbol<'g> {
        let row = self.grammar.group_row(self.handle.row());
        TokenSymbol::new(self.grammar, row.container_token)
    }

    /// The token symbol that opens the group.
    #[must_use]
    pub fn start_token(self) -> TokenSymbol<'g> {
        let row = self.grammar.group_row(self.handle.row());
        TokenSymbol::new(self.grammar, row.start_token)
    }

    /// The token symbol that closes the group, if any (`None` groups close at end-of-line).
    #[must_use]
    pub fn end_token(self) -> Option<TokenSymbol<'g>> {
        let row = self.grammar.group_row(self.handle.row());
        (row.end_token != 0).then(|| TokenSymbol::new(self.grammar, row.end_token))
    }

    /// How the tokenizer advances while inside this group.
    #[must_use]
    pub fn advance_mode(self) -> AdvanceMode {
        match self.grammar.group_row(self.handle.row()).advance_mode {
            1 => AdvanceMode::Token,
            _ => AdvanceMode::Character,
        }
    }

    /// Whether this group's end token is folded into its own token.
    #[must_use]
    pub fn ending_mode(self) -> EndingMode {
        match self.grammar.group_row(self.handle.row()).ending_mode {
            1 => EndingMode::Open,
            _ => EndingMode::Closed,
        }
    }

    /// The 1-based row range `[first, last]` of `GroupNesting` rows belonging to this group,
    /// derived from this group's `first_nesting` and the next group's (spec §4.5, monotonic
    /// slicing, mirroring `Nonterminal::production_range`).
    fn nesting_range(self) -> (u32, u32) {
        let row = self.handle.row();
        let first = self.grammar.group_row(row).first_nesting;
        if first == 0 {
            return (1, 0);
        }
        let total = self.grammar.group_nesting_count();
        let last = if row < self.grammar.group_count() {
            self.grammar.group_row(row + 1).first_nesting - 1
        } else {
            total
        };
        (first, last)
    }

    /// Other groups that may nest within this one (spec §4.5, `GroupNesting`).
    pub fn nested_groups(self) -> impl Iterator<Item = Group<'g>> + 'g {
        let (first, last) = self.nesting_range();
        let grammar = self.grammar;
        (first..=last)
            .map(move |r| grammar.group_nesting_row(r).nested_group)
            .map(move |nested_row| Group::new(grammar, nested_row))
    }
}
