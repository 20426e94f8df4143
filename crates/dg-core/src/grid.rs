use crate::error::CoreError;
use crate::relation::RelationChar;

/// RLE compression/decompression and positional access for a single grid row.
///
/// Format: a run of identical characters with count >= 2 is written as `<char><count>`
/// (decimal); a run of length 1 is the bare character. The alphabet never contains
/// digits, so a run's count always starts at the first digit following its character
/// and ends at the next non-digit (or end of string) — decoding is unambiguous.
pub struct GridCodec;

impl GridCodec {
    pub fn compress(raw: &[RelationChar]) -> String {
        let mut out = String::new();
        let mut i = 0;
        while i < raw.len() {
            let c = raw[i];
            let mut run_len = 1;
            while i + run_len < raw.len() && raw[i + run_len] == c {
                run_len += 1;
            }
            out.push(c.as_char());
            if run_len >= 2 {
                out.push_str(&run_len.to_string());
            }
            i += run_len;
        }
        out
    }

    pub fn decompress(rle: &str) -> Result<Vec<RelationChar>, CoreError> {
        let chars: Vec<char> = rle.chars().collect();
        let mut out = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_ascii_digit() {
                return Err(CoreError::MalformedRle {
                    rle: rle.to_string(),
                    offset: i,
                });
            }
            let rc = RelationChar::try_from(c)?;
            i += 1;
            let mut digits = String::new();
            while i < chars.len() && chars[i].is_ascii_digit() {
                digits.push(chars[i]);
                i += 1;
            }
            let count = if digits.is_empty() {
                1
            } else {
                digits
                    .parse::<usize>()
                    .map_err(|_| CoreError::MalformedRle {
                        rle: rle.to_string(),
                        offset: i,
                    })?
            };
            out.extend(std::iter::repeat(rc).take(count));
        }
        Ok(out)
    }

    /// Read the character at raw index `i` without materializing the full row.
    pub fn get_at(rle: &str, i: usize) -> Result<RelationChar, CoreError> {
        let chars: Vec<char> = rle.chars().collect();
        let mut pos = 0usize;
        let mut cursor = 0usize;
        while cursor < chars.len() {
            let c = chars[cursor];
            let rc = RelationChar::try_from(c)?;
            cursor += 1;
            let mut digits = String::new();
            while cursor < chars.len() && chars[cursor].is_ascii_digit() {
                digits.push(chars[cursor]);
                cursor += 1;
            }
            let count = if digits.is_empty() {
                1
            } else {
                digits
                    .parse::<usize>()
                    .map_err(|_| CoreError::MalformedRle {
                        rle: rle.to_string(),
                        offset: cursor,
                    })?
            };
            if i < pos + count {
                return Ok(rc);
            }
            pos += count;
        }
        Err(CoreError::GridShape {
            expected: i + 1,
            actual: pos,
        })
    }

    /// Replace the character at raw index `i`, preserving the row's decompressed length.
    pub fn set_at(rle: &str, i: usize, c: RelationChar) -> Result<String, CoreError> {
        let mut raw = Self::decompress(rle)?;
        if i >= raw.len() {
            return Err(CoreError::GridShape {
                expected: i + 1,
                actual: raw.len(),
            });
        }
        raw[i] = c;
        Ok(Self::compress(&raw))
    }

    /// A length-`n` row with `o` at `diagonal_index` and `p` everywhere else, compressed.
    pub fn create_initial(n: usize, diagonal_index: usize) -> String {
        let raw: Vec<RelationChar> = (0..n)
            .map(|i| {
                if i == diagonal_index {
                    RelationChar::SelfRef
                } else {
                    RelationChar::Placeholder
                }
            })
            .collect();
        Self::compress(&raw)
    }

    /// Check that `rle` decompresses to exactly `n` characters with `o` at
    /// `diagonal_index`. Returns the decoded row on success so callers don't have to
    /// decompress twice.
    pub fn validate_row(rle: &str, n: usize, diagonal_index: usize) -> Result<Vec<RelationChar>, CoreError> {
        let raw = Self::decompress(rle)?;
        if raw.len() != n {
            return Err(CoreError::GridShape {
                expected: n,
                actual: raw.len(),
            });
        }
        if raw[diagonal_index] != RelationChar::SelfRef {
            return Err(CoreError::BadDiagonal(diagonal_index));
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RelationChar::*;

    fn raw(s: &str) -> Vec<RelationChar> {
        s.chars().map(|c| RelationChar::try_from(c).unwrap()).collect()
    }

    #[test]
    fn compresses_the_spec_example() {
        assert_eq!(GridCodec::compress(&raw("oppppppxppn")), "op6xppn");
    }

    #[test]
    fn round_trips_compress_decompress() {
        let original = raw("oppppppppppppx");
        let rle = GridCodec::compress(&original);
        assert_eq!(rle, "op12x");
        assert_eq!(GridCodec::decompress(&rle).unwrap(), original);
    }

    #[test]
    fn round_trips_decompress_compress_when_canonical() {
        let rle = "op12x";
        let raw = GridCodec::decompress(rle).unwrap();
        assert_eq!(GridCodec::compress(&raw), rle);
    }

    #[test]
    fn get_at_matches_decompressed_index() {
        let rle = "op6xppn";
        let full = GridCodec::decompress(rle).unwrap();
        for (i, expected) in full.iter().enumerate() {
            assert_eq!(GridCodec::get_at(rle, i).unwrap(), *expected);
        }
    }

    #[test]
    fn set_at_preserves_length_and_only_touches_target() {
        let rle = "op6xppn";
        let before = GridCodec::decompress(rle).unwrap();
        let updated = GridCodec::set_at(rle, 3, Mutual).unwrap();
        let after = GridCodec::decompress(&updated).unwrap();
        assert_eq!(after.len(), before.len());
        for i in 0..before.len() {
            if i == 3 {
                assert_eq!(after[i], Mutual);
            } else {
                assert_eq!(after[i], before[i]);
            }
        }
    }

    #[test]
    fn create_initial_has_diagonal_and_placeholders() {
        let rle = GridCodec::create_initial(5, 2);
        let row = GridCodec::decompress(&rle).unwrap();
        assert_eq!(row.len(), 5);
        for (i, c) in row.iter().enumerate() {
            if i == 2 {
                assert_eq!(*c, SelfRef);
            } else {
                assert_eq!(*c, Placeholder);
            }
        }
    }

    #[test]
    fn validate_row_rejects_wrong_length_and_bad_diagonal() {
        assert!(GridCodec::validate_row("op6xppn", 11, 0).is_ok());
        assert!(GridCodec::validate_row("op6xpp", 11, 0).is_err());
        assert!(GridCodec::validate_row("op6xppn", 11, 1).is_err());
    }

    #[test]
    fn decompress_rejects_malformed_rle() {
        assert!(GridCodec::decompress("o9").is_ok());
        assert!(GridCodec::decompress("z5").is_err());
    }
}
