//! Packed 6-bit text used by the compressed resource blocks.
//!
//! Four symbols share three bytes. Each symbol is folded into 0x00-0x3F by
//! dropping 0x40 from codes at or above it, so the codec only round-trips the
//! range 0x20-0x5F (and 0x40 itself folds onto the zero sentinel).

const SYMBOL_MASK: u8 = 0x3F;

fn deflate_char(ch: u8) -> u8 {
    let code = if ch >= 0x40 { ch - 0x40 } else { ch };
    code & SYMBOL_MASK
}

fn inflate_char(code: u8) -> char {
    let code = if code <= 0x1F { code + 0x40 } else { code };
    code as char
}

fn emit(code: u8, out: &mut String) {
    if code != 0 {
        out.push(inflate_char(code));
    }
}

/// True when `ch` survives `decode(encode(..))` unchanged.
pub fn is_encodable(ch: u8) -> bool {
    (0x20..=0x5F).contains(&ch) && ch != 0x40
}

/// Pack `text` with the rotating 4-phase bit packer.
///
/// The output is sized to the bits actually written, so a length that is a
/// multiple of four never leaves the trailing zero byte the fixed-size
/// reference packer produced.
pub fn encode(text: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::with_capacity((text.len() * 3 + 3) / 4);

    for (i, &ch) in text.iter().enumerate() {
        let bits = deflate_char(ch);
        match i % 4 {
            0 => out.push(bits << 2),
            1 => {
                if let Some(last) = out.last_mut() {
                    *last |= bits >> 4;
                }
                out.push(bits << 4);
            }
            2 => {
                if let Some(last) = out.last_mut() {
                    *last |= bits >> 2;
                }
                out.push(bits << 6);
            }
            _ => {
                if let Some(last) = out.last_mut() {
                    *last |= bits;
                }
            }
        }
    }

    out
}

#[derive(Copy, Clone)]
enum Phase {
    High,
    Straddle,
    Split,
}

/// Unpack a 6-bit text block. Zero codes mark empty slots and emit nothing.
pub fn decode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4 / 3 + 1);
    let mut phase = Phase::High;
    let mut last = 0u8;

    for &this in data {
        phase = match phase {
            Phase::High => {
                emit((this >> 2) & SYMBOL_MASK, &mut out);
                Phase::Straddle
            }
            Phase::Straddle => {
                emit(((last << 4) | (this >> 4)) & SYMBOL_MASK, &mut out);
                Phase::Split
            }
            Phase::Split => {
                emit(((last << 2) | (this >> 6)) & SYMBOL_MASK, &mut out);
                emit(this & SYMBOL_MASK, &mut out);
                Phase::High
            }
        };
        last = this;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, is_encodable};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn packs_four_symbols_into_three_bytes() {
        assert_eq!(encode(b"ABCD"), vec![0x04, 0x20, 0xC4]);
        assert_eq!(decode(&[0x04, 0x20, 0xC4]), "ABCD");
    }

    #[test]
    fn output_length_tracks_bits_written() {
        assert_eq!(encode(b"").len(), 0);
        assert_eq!(encode(b"A").len(), 1);
        assert_eq!(encode(b"AB").len(), 2);
        assert_eq!(encode(b"ABC").len(), 3);
        assert_eq!(encode(b"ABCD").len(), 3);
        assert_eq!(encode(b"ABCDE").len(), 4);
    }

    #[test]
    fn lowercase_folds_onto_punctuation() {
        // 'a' (0x61) deflates to 0x21, which inflates back as '!'.
        assert_eq!(decode(&encode(b"a")), "!");
        assert!(!is_encodable(b'a'));
    }

    #[test]
    fn zero_code_is_a_sentinel() {
        assert_eq!(decode(&encode(b"A@B")), "AB");
        assert_eq!(decode(&[0x00, 0x00, 0x00]), "");
    }

    #[test]
    fn trailing_symbol_with_zero_low_bits_survives() {
        // '0' packs to a second byte of 0x00; it must not be dropped.
        let packed = encode(b"A0");
        assert_eq!(packed, vec![0x07, 0x00]);
        assert_eq!(decode(&packed), "A0");
    }

    #[test]
    fn random_strings_round_trip() {
        let alphabet: Vec<u8> = (0x20u8..=0x5F).filter(|&c| is_encodable(c)).collect();
        let mut rng = StdRng::seed_from_u64(0x6b1d);

        for _ in 0..500 {
            let len = rng.gen_range(0..48);
            let text: Vec<u8> = (0..len)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();
            let decoded = decode(&encode(&text));
            assert_eq!(decoded.as_bytes(), &text[..]);
        }
    }
}
