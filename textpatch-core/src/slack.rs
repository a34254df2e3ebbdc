/// Room available for a replacement written over a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slack {
    /// Bytes that can be written from the match offset without resizing.
    pub available: usize,
    /// The stored length counts one trailing zero terminator; pattern and
    /// replacement must both carry it.
    pub terminator_quirk: bool,
}

pub fn available(buf: &[u8], offset: usize, pattern_len: usize, compressed: bool) -> Slack {
    let end = (offset + pattern_len).min(buf.len());

    if !compressed {
        let zeros = buf[end..].iter().take_while(|&&b| b == 0).count();
        return Slack {
            available: pattern_len + zeros,
            terminator_quirk: false,
        };
    }

    // Zeros after compressed text can be opcodes, so they are never slack.
    let single_zero = buf.get(end) == Some(&0) && buf.get(end + 1) != Some(&0);
    let prefix_counts_terminator =
        offset > 0 && buf[offset - 1] as usize == pattern_len + 1;

    Slack {
        available: pattern_len,
        terminator_quirk: single_zero && prefix_counts_terminator,
    }
}
