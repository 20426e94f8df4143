use std::cmp::Ordering;

use crate::error::CoreError;

/// One maximal digit or letter run within a hierarchical key, e.g. `1A2` splits into
/// `[Digits(1), Letters("A"), Digits(2)]`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Run {
    Digits(u64),
    Letters(String),
}

impl Run {
    /// Digit runs compare as numbers so `"10"` sorts after `"9"`. Letter runs compare
    /// shortlex (shorter first, then lexicographically) which matches the bijective
    /// base-26 sequence `A..Z, AA..AZ, BA..` the key manager generates.
    fn cmp_same_kind(&self, other: &Run) -> Ordering {
        match (self, other) {
            (Run::Digits(a), Run::Digits(b)) => a.cmp(b),
            (Run::Letters(a), Run::Letters(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            _ => unreachable!("cmp_same_kind called on mismatched run kinds"),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Run::Digits(_) => 0,
            Run::Letters(_) => 1,
        }
    }
}

fn split_runs(key: &str) -> Result<Vec<Run>, CoreError> {
    if key.is_empty() {
        return Err(CoreError::InvalidKey(key.to_string()));
    }

    let mut runs = Vec::new();
    let mut chars = key.chars().peekable();
    let mut expect_digits = true;

    while let Some(&c) = chars.peek() {
        if expect_digits {
            if !c.is_ascii_digit() {
                return Err(CoreError::InvalidKey(key.to_string()));
            }
            let mut run = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    run.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let value: u64 = run
                .parse()
                .map_err(|_| CoreError::InvalidKey(key.to_string()))?;
            runs.push(Run::Digits(value));
        } else {
            if !c.is_ascii_alphabetic() {
                return Err(CoreError::InvalidKey(key.to_string()));
            }
            let mut run = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_alphabetic() {
                    run.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            runs.push(Run::Letters(run));
        }
        expect_digits = !expect_digits;
    }

    Ok(runs)
}

/// Parse/validate/sort hierarchical key strings like `1A`, `1A2`, `2Ba3`.
pub struct KeyCodec;

impl KeyCodec {
    /// `true` iff `s` is a non-empty run of alternating digit/letter groups, starting
    /// with a digit group (the root tier is always digits).
    pub fn validate(s: &str) -> bool {
        split_runs(s).is_ok()
    }

    /// Number of digit/letter runs, i.e. the depth of this key in the tree (root = 1).
    pub fn tier_of(s: &str) -> Result<usize, CoreError> {
        Ok(split_runs(s)?.len())
    }

    /// Total order consistent with directory-listing order at every tier: digit runs
    /// compare numerically, letter runs compare shortlex, and a key that is a strict
    /// run-prefix of another (impossible for siblings, but well-defined regardless)
    /// sorts first.
    pub fn compare(a: &str, b: &str) -> Ordering {
        let ra = split_runs(a).unwrap_or_default();
        let rb = split_runs(b).unwrap_or_default();
        for (x, y) in ra.iter().zip(rb.iter()) {
            let kind = x.kind_rank().cmp(&y.kind_rank());
            if kind != Ordering::Equal {
                return kind;
            }
            let ord = x.cmp_same_kind(y);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        ra.len().cmp(&rb.len()).then_with(|| a.cmp(b))
    }

    /// Stable hierarchical sort used for tracker row/column order.
    pub fn sort_hierarchical(keys: &mut [String]) {
        keys.sort_by(|a, b| KeyCodec::compare(a, b));
    }

    pub fn sort_hierarchical_refs<'a>(keys: &mut Vec<&'a str>) {
        keys.sort_by(|a, b| KeyCodec::compare(a, b));
    }

    /// `true` if the key ends in a digit (file, by convention) rather than a letter
    /// (directory). Only a hint — `KeyInfo::is_directory` is authoritative (Invariant K2).
    pub fn looks_like_file(s: &str) -> bool {
        s.chars().last().is_some_and(|c| c.is_ascii_digit())
    }

    /// The `index`-th (1-based) label in a bijective base-26 letter sequence:
    /// 1 -> "A", 26 -> "Z", 27 -> "AA", 28 -> "AB", ...
    pub fn letters_for_index(mut index: u64) -> String {
        let mut out = Vec::new();
        while index > 0 {
            let rem = ((index - 1) % 26) as u8;
            out.push(b'A' + rem);
            index = (index - 1) / 26;
        }
        out.reverse();
        String::from_utf8(out).expect("ascii letters only")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_alternating_keys() {
        assert!(KeyCodec::validate("1A"));
        assert!(KeyCodec::validate("1A2"));
        assert!(KeyCodec::validate("2Ba3"));
        assert!(KeyCodec::validate("1"));
        assert!(!KeyCodec::validate(""));
        assert!(!KeyCodec::validate("A1"));
        assert!(!KeyCodec::validate("1-A"));
        assert!(!KeyCodec::validate("1AA2a"));
    }

    #[test]
    fn tier_counts_runs() {
        assert_eq!(KeyCodec::tier_of("1").unwrap(), 1);
        assert_eq!(KeyCodec::tier_of("1A").unwrap(), 2);
        assert_eq!(KeyCodec::tier_of("1A2").unwrap(), 3);
    }

    #[test]
    fn sorts_digits_numerically_not_lexically() {
        let mut keys = vec!["10".to_string(), "2".to_string(), "1".to_string()];
        KeyCodec::sort_hierarchical(&mut keys);
        assert_eq!(keys, vec!["1", "2", "10"]);
    }

    #[test]
    fn sorts_letters_shortlex_matching_bijective_base26() {
        let mut keys = vec!["1AA".to_string(), "1Z".to_string(), "1B".to_string()];
        KeyCodec::sort_hierarchical(&mut keys);
        assert_eq!(keys, vec!["1B", "1Z", "1AA"]);
    }

    #[test]
    fn sort_is_total_and_idempotent() {
        let mut keys = vec![
            "2B".to_string(),
            "1A2".to_string(),
            "1A1".to_string(),
            "1B".to_string(),
            "10".to_string(),
        ];
        KeyCodec::sort_hierarchical(&mut keys);
        let once = keys.clone();
        KeyCodec::sort_hierarchical(&mut keys);
        assert_eq!(keys, once);
    }

    #[test]
    fn bijective_letters_extend_past_z() {
        assert_eq!(KeyCodec::letters_for_index(1), "A");
        assert_eq!(KeyCodec::letters_for_index(26), "Z");
        assert_eq!(KeyCodec::letters_for_index(27), "AA");
        assert_eq!(KeyCodec::letters_for_index(28), "AB");
        assert_eq!(KeyCodec::letters_for_index(52), "AZ");
        assert_eq!(KeyCodec::letters_for_index(53), "BA");
    }
}
