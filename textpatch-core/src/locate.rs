/// Heuristics deciding whether a raw match is a real length-prefixed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryRules {
    pub max_length_difference: u8,
    pub letter_like_min: u8,
    pub letter_like_max: u8,
}

impl Default for BoundaryRules {
    fn default() -> Self {
        BoundaryRules {
            max_length_difference: 5,
            letter_like_min: 65,
            letter_like_max: 121,
        }
    }
}

impl BoundaryRules {
    /// Check the byte in front of a raw match at `offset`.
    ///
    /// A match with nothing in front of it has no length prefix and is never
    /// accepted.
    pub fn accepts(&self, buf: &[u8], offset: usize, pattern_len: usize) -> bool {
        if offset == 0 {
            return false;
        }
        let prefix = buf[offset - 1];

        // Text right before the match: probably the tail of a longer string.
        let letter_like = (self.letter_like_min..=self.letter_like_max).contains(&prefix);
        if letter_like && prefix as usize != pattern_len {
            return false;
        }

        (prefix as usize).abs_diff(pattern_len) <= self.max_length_difference as usize
    }
}

/// Naive forward scan for `pattern` starting at `start`.
pub fn find(buf: &[u8], pattern: &[u8], start: usize) -> Option<usize> {
    let (&first, rest) = pattern.split_first()?;
    if buf.len() < pattern.len() {
        return None;
    }
    let last_start = buf.len() - pattern.len();

    let mut i = start;
    while i <= last_start {
        if buf[i] == first && &buf[i + 1..i + pattern.len()] == rest {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Find the first acceptable match of `pattern` at or after `start`.
///
/// With `rules` set, matches that fail the length-prefix heuristics are
/// skipped and scanning resumes one byte further on.
pub fn locate(
    buf: &[u8],
    pattern: &[u8],
    start: usize,
    rules: Option<&BoundaryRules>,
) -> Option<usize> {
    let mut from = start;
    while let Some(offset) = find(buf, pattern, from) {
        match rules {
            Some(rules) if !rules.accepts(buf, offset, pattern.len()) => {
                from = offset + 1;
            }
            _ => return Some(offset),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{find, locate, BoundaryRules};

    #[test]
    fn find_scans_from_start() {
        let buf = b"xxABxxAB";
        assert_eq!(find(buf, b"AB", 0), Some(2));
        assert_eq!(find(buf, b"AB", 3), Some(6));
        assert_eq!(find(buf, b"AB", 7), None);
        assert_eq!(find(buf, b"", 0), None);
        assert_eq!(find(b"A", b"AB", 0), None);
    }

    #[test]
    fn skips_substring_of_longer_string() {
        let mut buf = vec![0x0A];
        buf.extend_from_slice(b"GREATSWORD");
        buf.push(0x00);
        buf.push(0x05);
        buf.extend_from_slice(b"SWORD");
        buf.push(0x00);

        let rules = BoundaryRules::default();
        assert_eq!(find(&buf, b"SWORD", 0), Some(6));
        assert_eq!(locate(&buf, b"SWORD", 0, Some(&rules)), Some(13));
        assert_eq!(locate(&buf, b"SWORD", 0, None), Some(6));
    }

    #[test]
    fn prefix_within_tolerance_is_accepted() {
        let rules = BoundaryRules::default();
        let mut buf = vec![0x00, 7];
        buf.extend_from_slice(b"HELLO");
        assert_eq!(locate(&buf, b"HELLO", 0, Some(&rules)), Some(2));

        let mut far = vec![0x00, 20];
        far.extend_from_slice(b"HELLO");
        assert_eq!(locate(&far, b"HELLO", 0, Some(&rules)), None);
    }

    #[test]
    fn letter_like_prefix_equal_to_length_is_accepted() {
        let rules = BoundaryRules::default();
        let pattern = vec![b'X'; 66];
        let mut buf = vec![66u8];
        buf.extend_from_slice(&pattern);
        assert_eq!(locate(&buf, &pattern, 0, Some(&rules)), Some(1));
    }

    #[test]
    fn match_at_start_of_buffer_has_no_prefix() {
        let rules = BoundaryRules::default();
        assert_eq!(locate(b"HELLO", b"HELLO", 0, Some(&rules)), None);
        assert_eq!(locate(b"HELLO", b"HELLO", 0, None), Some(0));
    }
}
