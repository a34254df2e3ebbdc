use log::{debug, info, warn};
use std::fmt;

use crate::codec;
use crate::config::{CharMap, PatchConfig};
use crate::directive::Directive;
use crate::locate::locate;
use crate::reloc::{PointerRecord, RelocationTable};
use crate::slack;
use crate::{PatchError, Result};

/// How strings are stored in the target.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Raw bytes in fixed slots; the file never changes size.
    Plain,
    /// 6-bit packed text; the buffer is spliced but must end at its
    /// original size.
    Compressed,
}

/// What happened to a single directive. None of these stop the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replaced { offset: usize, written: usize },
    Truncated { offset: usize, available: usize },
    NotFound,
    /// `ch` has no byte in the active map. In compressed mode a byte the
    /// codec cannot round-trip counts too, so lowercase needs a `char_map`
    /// entry there.
    Unmappable { ch: char },
    Patched { offset: usize },
    Registered { index: usize },
    OutOfRange,
    Ignored,
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            Outcome::Replaced { .. }
                | Outcome::Truncated { .. }
                | Outcome::Patched { .. }
                | Outcome::Registered { .. }
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Replaced { offset, written } => {
                write!(f, "replaced at 0x{offset:X} ({written} bytes)")
            }
            Outcome::Truncated { offset, available } => {
                write!(f, "truncated to {available} bytes at 0x{offset:X}")
            }
            Outcome::NotFound => write!(f, "not found"),
            Outcome::Unmappable { ch } => write!(f, "skipped, unmappable character {ch:?}"),
            Outcome::Patched { offset } => write!(f, "patched at 0x{offset:X}"),
            Outcome::Registered { index } => write!(f, "registered as pointer #{index}"),
            Outcome::OutOfRange => write!(f, "skipped, outside the file"),
            Outcome::Ignored => write!(f, "ignored"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveReport {
    pub label: String,
    pub outcome: Outcome,
}

/// Owns the buffer and everything that has to stay in step with it while
/// directives are applied.
pub struct PatchSession {
    buffer: Vec<u8>,
    original_len: usize,
    relocations: RelocationTable,
    cumulative_delta: isize,
    mode: Mode,
    config: PatchConfig,
    char_map: CharMap,
    raw_map: CharMap,
}

impl PatchSession {
    pub fn new(buffer: Vec<u8>, mode: Mode, config: PatchConfig) -> Result<Self> {
        let char_map = config.char_map()?;
        Ok(PatchSession {
            original_len: buffer.len(),
            buffer,
            relocations: RelocationTable::new(),
            cumulative_delta: 0,
            mode,
            config,
            char_map,
            raw_map: CharMap::default(),
        })
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn relocations(&self) -> &RelocationTable {
        &self.relocations
    }

    pub fn cumulative_delta(&self) -> isize {
        self.cumulative_delta
    }

    pub fn original_len(&self) -> usize {
        self.original_len
    }

    /// Apply every directive in order. The first fatal error aborts the
    /// run and leaves the buffer partially patched.
    pub fn apply_all(&mut self, directives: &[Directive]) -> Result<Vec<DirectiveReport>> {
        let mut reports = Vec::with_capacity(directives.len());
        for directive in directives {
            let outcome = self.apply(directive)?;
            reports.push(DirectiveReport {
                label: directive.label(),
                outcome,
            });
        }
        Ok(reports)
    }

    pub fn apply(&mut self, directive: &Directive) -> Result<Outcome> {
        match directive {
            Directive::Text {
                id,
                from,
                to,
                remap,
            } => self.replace_text(id, from, to, *remap),
            Directive::Patch { offset, bytes } => Ok(self.patch_bytes(*offset, bytes)),
            Directive::Pointer {
                id,
                address,
                destination,
            } => self.register_pointer(id, *address, *destination),
        }
    }

    /// Hand the buffer back, checking the compressed size invariant.
    pub fn finish(self) -> Result<Vec<u8>> {
        if self.mode == Mode::Compressed && self.buffer.len() != self.original_len {
            return Err(PatchError::SizeInvariantViolation {
                expected: self.original_len,
                actual: self.buffer.len(),
            });
        }
        Ok(self.buffer)
    }

    fn patch_bytes(&mut self, offset: usize, bytes: &[u8]) -> Outcome {
        let end = offset.saturating_add(bytes.len());
        if end > self.buffer.len() {
            warn!(
                "Byte patch at 0x{:X} ({} bytes) runs past the end of the {}-byte file. Skipping.",
                offset,
                bytes.len(),
                self.buffer.len()
            );
            return Outcome::OutOfRange;
        }

        self.buffer[offset..end].copy_from_slice(bytes);
        info!("Patched {} bytes at 0x{:X}", bytes.len(), offset);
        Outcome::Patched { offset }
    }

    fn register_pointer(
        &mut self,
        id: &str,
        address: usize,
        destination: Option<usize>,
    ) -> Result<Outcome> {
        if self.mode != Mode::Compressed {
            warn!("Pointer {id} ignored: pointer tables only apply to compressed mode");
            return Ok(Outcome::Ignored);
        }

        let base = self.config.pointer_base;
        let record = match destination {
            Some(dest) => PointerRecord::explicit(&self.buffer, address, dest, base)?,
            None => PointerRecord::from_buffer(&self.buffer, address, base)?,
        };
        let index = self.relocations.register(record);
        debug!(
            "Pointer {} (#{}) at 0x{:X} -> 0x{:X}, word 0x{:04X}",
            id, index, record.address, record.destination, record.word
        );
        Ok(Outcome::Registered { index })
    }

    /// Map `text` to the bytes searched for or written in this mode.
    fn encode_text(&self, text: &str, remap: bool) -> std::result::Result<Vec<u8>, char> {
        let map = if remap { &self.char_map } else { &self.raw_map };
        let symbols = map.map_str(text)?;

        match self.mode {
            Mode::Plain => Ok(symbols),
            Mode::Compressed => {
                // map_str yields one byte per char.
                match text
                    .chars()
                    .zip(&symbols)
                    .find(|&(_, &byte)| !codec::is_encodable(byte))
                {
                    Some((ch, _)) => Err(ch),
                    None => Ok(codec::encode(&symbols)),
                }
            }
        }
    }

    fn replace_text(&mut self, id: &str, from: &str, to: &str, remap: bool) -> Result<Outcome> {
        if from.is_empty() || to.is_empty() {
            return Ok(Outcome::Ignored);
        }

        let (pattern, replacement) =
            match (self.encode_text(from, remap), self.encode_text(to, remap)) {
                (Ok(p), Ok(r)) => (p, r),
                (Err(ch), _) | (_, Err(ch)) => {
                    warn!("[{id}] \"{from}\" -> \"{to}\": no mapping for {ch:?}. Skipping.");
                    return Ok(Outcome::Unmappable { ch });
                }
            };

        let rules = match self.mode {
            Mode::Plain => Some(self.config.boundary_rules()),
            Mode::Compressed => None,
        };
        let offset = match locate(&self.buffer, &pattern, 0, rules.as_ref()) {
            Some(offset) => offset,
            None => {
                info!("[{id}] \"{from}\" not found in binary. Skipping.");
                return Ok(Outcome::NotFound);
            }
        };

        let outcome = match self.mode {
            Mode::Plain => self.write_in_slot(offset, &pattern, replacement),
            Mode::Compressed => self.splice_replacement(offset, pattern, replacement)?,
        };

        match &outcome {
            Outcome::Truncated { available, .. } => warn!(
                "[{id}] truncating \"{to}\": only {available} bytes are available to replace \"{from}\""
            ),
            _ => info!("[{id}] Replaced \"{from}\" with \"{to}\""),
        }
        Ok(outcome)
    }

    /// Plain mode: the slot keeps its size. Long text uses trailing zero
    /// padding or is cut; short text is padded with spaces.
    fn write_in_slot(&mut self, offset: usize, pattern: &[u8], mut data: Vec<u8>) -> Outcome {
        let room = slack::available(&self.buffer, offset, pattern.len(), false).available;
        debug!(
            "match at 0x{:X}, pattern {} bytes, {} available",
            offset,
            pattern.len(),
            room
        );

        let truncated = data.len() > pattern.len() && data.len() > room;
        if truncated {
            data.truncate(room);
        }

        let text_len = data.len();
        if data.len() < pattern.len() {
            data.resize(pattern.len(), b' ');
        }

        self.buffer[offset..offset + data.len()].copy_from_slice(&data);
        self.write_length_prefix(offset, text_len);

        if truncated {
            Outcome::Truncated {
                offset,
                available: room,
            }
        } else {
            Outcome::Replaced {
                offset,
                written: data.len(),
            }
        }
    }

    /// Compressed mode: splice the replacement in place and let the pointer
    /// table follow the bytes that moved.
    fn splice_replacement(
        &mut self,
        offset: usize,
        mut pattern: Vec<u8>,
        mut replacement: Vec<u8>,
    ) -> Result<Outcome> {
        let room = slack::available(&self.buffer, offset, pattern.len(), true);
        if room.terminator_quirk {
            pattern.push(0);
            replacement.push(0);
        }

        let old_len = self.buffer.len();
        let end = offset + pattern.len();
        self.buffer.splice(offset..end, replacement.iter().copied());
        self.write_length_prefix(offset, replacement.len());

        let delta = self.buffer.len() as isize - old_len as isize;
        if delta != 0 {
            let rewritten = self.relocations.shift(
                &mut self.buffer,
                offset,
                delta,
                self.config.destination_marker,
            )?;
            debug!(
                "buffer {} by {} bytes at 0x{:X}; {} pointer words rewritten",
                if delta > 0 { "grew" } else { "shrank" },
                delta.unsigned_abs(),
                offset,
                rewritten
            );
        }
        self.cumulative_delta += delta;

        Ok(Outcome::Replaced {
            offset,
            written: replacement.len(),
        })
    }

    fn write_length_prefix(&mut self, offset: usize, len: usize) {
        if offset == 0 {
            return;
        }
        match u8::try_from(len) {
            Ok(len) => self.buffer[offset - 1] = len,
            Err(_) => warn!(
                "length {} at 0x{:X} does not fit the length prefix; left unchanged",
                len, offset
            ),
        }
    }
}
