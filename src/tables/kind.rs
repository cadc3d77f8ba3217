//! Table identifiers for the `#~` stream (spec §4.4).

use crate::error::{Error, Result};

/// Which table a row belongs to. The discriminant is also the bit position in the
/// presence bitmap and the byte stored in a coded reference's tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TableKind {
    Grammar = 0,
    TokenSymbol = 1,
    Group = 2,
    GroupNesting = 3,
    Nonterminal = 4,
    Production = 5,
    ProductionMember = 6,
    StateMachine = 7,
    SpecialName = 8,
}

/// All table kinds, in canonical on-disk order.
pub const ALL_TABLE_KINDS: [TableKind; 9] = [
    TableKind::Grammar,
    TableKind::TokenSymbol,
    TableKind::Group,
    TableKind::GroupNesting,
    TableKind::Nonterminal,
    TableKind::Production,
    TableKind::ProductionMember,
    TableKind::StateMachine,
    TableKind::SpecialName,
];

impl TableKind {
    /// Recover a `TableKind` from its bitmap/tag byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        ALL_TABLE_KINDS
            .iter()
            .copied()
            .find(|k| *k as u8 == value)
            .ok_or_else(|| Error::InvalidData(format!("unknown table kind {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_u8_roundtrips_all_kinds() {
        for kind in ALL_TABLE_KINDS {
            assert_eq!(TableKind::from_u8(kind as u8).unwrap(), kind);
        }
    }

    #[test]
    fn from_u8_rejects_unknown() {
        assert!(TableKind::from_u8(200).is_err());
    }
}
