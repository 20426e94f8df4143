use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A single cell value in a dependency grid.
///
/// Mirrors the grid alphabet `{ o, p, s, S, x, <, >, d, n, P }` from the tracker format:
/// `o` is the diagonal ("self"), `p` unknown, `P` a legacy empty marker treated as `o`
/// outside the diagonal, `s`/`S` semantic weak/strong, `x` mutual, `<`/`>` directional,
/// `d` documents, `n` verified-no-relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationChar {
    SelfRef,
    Placeholder,
    Empty,
    SemanticWeak,
    SemanticStrong,
    Mutual,
    DependsRow,
    DependsCol,
    Documents,
    VerifiedNone,
}

impl RelationChar {
    pub const ALPHABET: [RelationChar; 10] = [
        RelationChar::SelfRef,
        RelationChar::Placeholder,
        RelationChar::Empty,
        RelationChar::SemanticWeak,
        RelationChar::SemanticStrong,
        RelationChar::Mutual,
        RelationChar::DependsRow,
        RelationChar::DependsCol,
        RelationChar::Documents,
        RelationChar::VerifiedNone,
    ];

    pub const fn as_char(self) -> char {
        match self {
            RelationChar::SelfRef => 'o',
            RelationChar::Placeholder => 'p',
            RelationChar::Empty => 'P',
            RelationChar::SemanticWeak => 's',
            RelationChar::SemanticStrong => 'S',
            RelationChar::Mutual => 'x',
            RelationChar::DependsRow => '<',
            RelationChar::DependsCol => '>',
            RelationChar::Documents => 'd',
            RelationChar::VerifiedNone => 'n',
        }
    }

    /// `true` for `p` and the legacy `P` marker: positions with no evidence either way.
    pub const fn is_overwritable(self) -> bool {
        matches!(
            self,
            RelationChar::Placeholder | RelationChar::Empty | RelationChar::SemanticWeak | RelationChar::SemanticStrong
        )
    }

    /// `<`, `>`, `x`, `d`: a verified positive relationship, as opposed to `n` (verified
    /// absence) or `s`/`S` (semantic guesses).
    pub const fn is_verified_positive(self) -> bool {
        matches!(
            self,
            RelationChar::DependsRow | RelationChar::DependsCol | RelationChar::Mutual | RelationChar::Documents
        )
    }

    pub const fn is_directional(self) -> bool {
        matches!(self, RelationChar::DependsRow | RelationChar::DependsCol)
    }

    /// The reverse of a directional character: `<` <-> `>`. Non-directional characters
    /// are their own reverse (used when copying a symmetric value into the mirrored cell).
    pub const fn reversed(self) -> RelationChar {
        match self {
            RelationChar::DependsRow => RelationChar::DependsCol,
            RelationChar::DependsCol => RelationChar::DependsRow,
            other => other,
        }
    }
}

impl TryFrom<char> for RelationChar {
    type Error = CoreError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'o' => Ok(RelationChar::SelfRef),
            'p' => Ok(RelationChar::Placeholder),
            'P' => Ok(RelationChar::Empty),
            's' => Ok(RelationChar::SemanticWeak),
            'S' => Ok(RelationChar::SemanticStrong),
            'x' => Ok(RelationChar::Mutual),
            '<' => Ok(RelationChar::DependsRow),
            '>' => Ok(RelationChar::DependsCol),
            'd' => Ok(RelationChar::Documents),
            'n' => Ok(RelationChar::VerifiedNone),
            other => Err(CoreError::InvalidCharacter(other)),
        }
    }
}

impl fmt::Display for RelationChar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_alphabet_char() {
        for r in RelationChar::ALPHABET {
            let c = r.as_char();
            assert_eq!(RelationChar::try_from(c).unwrap(), r);
        }
    }

    #[test]
    fn rejects_unknown_characters() {
        assert!(RelationChar::try_from('z').is_err());
        assert!(RelationChar::try_from('1').is_err());
    }

    #[test]
    fn directional_reversal_is_an_involution() {
        assert_eq!(RelationChar::DependsRow.reversed(), RelationChar::DependsCol);
        assert_eq!(RelationChar::DependsCol.reversed(), RelationChar::DependsRow);
        assert_eq!(RelationChar::Mutual.reversed(), RelationChar::Mutual);
    }
}
