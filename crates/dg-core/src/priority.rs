use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::relation::RelationChar;

/// Total order over [`RelationChar`]. The concrete numeric values are data, not logic:
/// they are loaded from configuration and defaulted here to the order the spec pins down
/// (`n` and the positive characters outrank `p`; `S` outranks `s`; `x` outranks `<`/`>`;
/// `n` outranks `p`, `s`, `S` but not the verified directional characters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityTable {
    order: HashMap<RelationChar, u8>,
}

impl PriorityTable {
    pub fn from_entries(entries: impl IntoIterator<Item = (RelationChar, u8)>) -> Self {
        Self {
            order: entries.into_iter().collect(),
        }
    }

    pub fn priority(&self, c: RelationChar) -> u8 {
        self.order.get(&c).copied().unwrap_or(0)
    }

    /// The higher-priority of the two; ties resolve to `a`.
    pub fn max_of(&self, a: RelationChar, b: RelationChar) -> RelationChar {
        if self.priority(b) > self.priority(a) {
            b
        } else {
            a
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (RelationChar, u8)> + '_ {
        self.order.iter().map(|(&k, &v)| (k, v))
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        use RelationChar::*;
        Self::from_entries([
            (SelfRef, 255),
            (Placeholder, 0),
            (Empty, 0),
            (SemanticWeak, 1),
            (SemanticStrong, 2),
            (VerifiedNone, 3),
            (DependsRow, 4),
            (DependsCol, 4),
            (Documents, 4),
            (Mutual, 5),
        ])
    }
}
