use serde::{Deserialize, Serialize};

/// Everything known about one tracked path at the time its key was assigned.
///
/// `key_string` is a hierarchical label like `1A`, `1A2`, `2Ba3`. `is_directory` is
/// authoritative for what `key_string`'s trailing character only hints at (Invariant K2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub key_string: String,
    pub norm_path: String,
    pub parent_path: Option<String>,
    pub is_directory: bool,
    pub tier: usize,
    pub index: u64,
}

impl KeyInfo {
    pub fn new(
        key_string: impl Into<String>,
        norm_path: impl Into<String>,
        parent_path: Option<String>,
        is_directory: bool,
        tier: usize,
        index: u64,
    ) -> Self {
        Self {
            key_string: key_string.into(),
            norm_path: norm_path.into(),
            parent_path,
            is_directory,
            tier,
            index,
        }
    }
}
