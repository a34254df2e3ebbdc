use log::debug;

use crate::{PatchError, Result};

/// One embedded 2-byte little-endian reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerRecord {
    /// Offset of the stored word inside the buffer.
    pub address: usize,
    /// Absolute offset the word resolves to.
    pub destination: usize,
    /// Raw stored value, `destination + base`.
    pub word: u16,
}

impl PointerRecord {
    /// Build a record from the word currently stored at `address`.
    pub fn from_buffer(buf: &[u8], address: usize, base: u16) -> Result<Self> {
        let bytes = word_at(buf, address).ok_or_else(|| outside_buffer(address, buf.len()))?;
        let word = u16::from_le_bytes([bytes[0], bytes[1]]);
        let destination = word.checked_sub(base).ok_or_else(|| {
            malformed(
                None,
                format!(
                    "pointer at 0x{:X} holds 0x{:04X}, below the base 0x{:04X}",
                    address, word, base
                ),
            )
        })?;

        Ok(PointerRecord {
            address,
            destination: destination as usize,
            word,
        })
    }

    /// Build a record from a caller-supplied destination. The address must
    /// still hold a full word inside `buf`.
    pub fn explicit(buf: &[u8], address: usize, destination: usize, base: u16) -> Result<Self> {
        if word_at(buf, address).is_none() {
            return Err(outside_buffer(address, buf.len()));
        }
        let word = u16::try_from(destination)
            .ok()
            .and_then(|d| d.checked_add(base))
            .ok_or_else(|| {
                malformed(
                    None,
                    format!(
                        "destination 0x{:X} does not fit a pointer word with base 0x{:04X}",
                        destination, base
                    ),
                )
            })?;

        Ok(PointerRecord {
            address,
            destination,
            word,
        })
    }
}

fn malformed(index: Option<usize>, detail: String) -> PatchError {
    PatchError::MalformedRelocation { index, detail }
}

fn word_at(buf: &[u8], address: usize) -> Option<&[u8]> {
    address.checked_add(2).and_then(|end| buf.get(address..end))
}

fn outside_buffer(address: usize, len: usize) -> PatchError {
    malformed(
        None,
        format!("pointer at 0x{address:X} lies outside the {len}-byte buffer"),
    )
}

fn offset_by(pos: usize, delta: isize, index: usize, what: &str) -> Result<usize> {
    pos.checked_add_signed(delta).ok_or_else(|| {
        malformed(
            Some(index),
            format!("{what} 0x{pos:X} cannot move by {delta}"),
        )
    })
}

/// Flat list of pointer records kept valid across resizing edits.
#[derive(Debug, Clone, Default)]
pub struct RelocationTable {
    records: Vec<PointerRecord>,
}

impl RelocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of the new record.
    pub fn register(&mut self, record: PointerRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    pub fn records(&self) -> &[PointerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Follow a resize of `delta` bytes made after `edit_pos`.
    ///
    /// `buf` must already hold the resized layout. References stored after
    /// the edit moved with it; targets after the edit get a new word, which
    /// is written back at the reference's current address. Returns the
    /// number of words rewritten.
    pub fn shift(
        &mut self,
        buf: &mut [u8],
        edit_pos: usize,
        delta: isize,
        marker: Option<u8>,
    ) -> Result<usize> {
        if delta == 0 {
            return Ok(0);
        }

        for (index, record) in self.records.iter_mut().enumerate() {
            if record.address > edit_pos {
                record.address = offset_by(record.address, delta, index, "address")?;
            }
        }

        let mut rewritten = 0usize;
        for (index, record) in self.records.iter_mut().enumerate() {
            if record.destination <= edit_pos {
                continue;
            }

            record.destination = offset_by(record.destination, delta, index, "destination")?;
            record.word = i32::from(record.word)
                .checked_add(delta as i32)
                .and_then(|w| u16::try_from(w).ok())
                .ok_or_else(|| {
                    malformed(
                        Some(index),
                        format!(
                            "word 0x{:04X} leaves the 16-bit range when moved by {}",
                            record.word, delta
                        ),
                    )
                })?;

            let address = record.address;
            let slot = address
                .checked_add(2)
                .and_then(|end| buf.get_mut(address..end))
                .ok_or_else(|| {
                    malformed(
                        Some(index),
                        format!("pointer address 0x{address:X} is outside the buffer"),
                    )
                })?;
            slot.copy_from_slice(&record.word.to_le_bytes());

            if let Some(marker) = marker {
                let found = record
                    .destination
                    .checked_sub(1)
                    .and_then(|i| buf.get(i))
                    .copied();
                if found != Some(marker) {
                    return Err(malformed(
                        Some(index),
                        format!(
                            "expected marker 0x{:02X} before destination 0x{:X}, found {}",
                            marker,
                            record.destination,
                            found.map_or_else(|| "nothing".to_string(), |b| format!("0x{b:02X}")),
                        ),
                    ));
                }
            }

            debug!(
                "pointer #{} at 0x{:X} now -> 0x{:X} (word 0x{:04X})",
                index, record.address, record.destination, record.word
            );
            rewritten += 1;
        }

        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::{PointerRecord, RelocationTable};
    use crate::PatchError;

    const BASE: u16 = 0x8000;

    #[test]
    fn reads_word_through_base() {
        let buf = [0x00, 0x34, 0x80, 0x00];
        let record = PointerRecord::from_buffer(&buf, 1, BASE).unwrap();
        assert_eq!(record.destination, 0x34);
        assert_eq!(record.word, 0x8034);
    }

    #[test]
    fn word_below_base_is_malformed() {
        let buf = [0x34, 0x10];
        let err = PointerRecord::from_buffer(&buf, 0, BASE).unwrap_err();
        assert!(matches!(err, PatchError::MalformedRelocation { .. }));
        assert!(PointerRecord::from_buffer(&buf, 1, BASE).is_err());
    }

    #[test]
    fn explicit_record_derives_word() {
        let buf = [0u8; 8];
        let record = PointerRecord::explicit(&buf, 4, 0x120, BASE).unwrap();
        assert_eq!(record.word, 0x8120);
        assert!(PointerRecord::explicit(&buf, 4, 0x9000, BASE).is_err());
    }

    #[test]
    fn address_past_buffer_end_is_malformed() {
        let buf = [0u8; 8];
        for address in [7, 8, usize::MAX - 1, usize::MAX] {
            assert!(matches!(
                PointerRecord::from_buffer(&buf, address, BASE),
                Err(PatchError::MalformedRelocation { index: None, .. })
            ));
            assert!(matches!(
                PointerRecord::explicit(&buf, address, 2, BASE),
                Err(PatchError::MalformedRelocation { index: None, .. })
            ));
        }
        assert!(PointerRecord::explicit(&buf, 6, 2, BASE).is_ok());
    }

    #[test]
    fn shift_rejects_record_outside_buffer() {
        let mut buf = vec![0u8; 16];
        let mut table = RelocationTable::new();
        table.register(PointerRecord {
            address: usize::MAX,
            destination: 10,
            word: 10 + BASE,
        });

        // Lands at usize::MAX - 1, where no full word fits.
        let err = table.shift(&mut buf, 4, -1, None).unwrap_err();
        assert!(matches!(
            err,
            PatchError::MalformedRelocation { index: Some(0), .. }
        ));
    }

    #[test]
    fn reference_before_edit_gets_new_word() {
        // Pointer at 0 targets 20; the edit at 5 grew the buffer by 3.
        let mut buf = vec![0u8; 40];
        buf[0..2].copy_from_slice(&(20u16 + BASE).to_le_bytes());

        let mut table = RelocationTable::new();
        table.register(PointerRecord::from_buffer(&buf, 0, BASE).unwrap());
        buf.splice(5..5, [0xAA; 3]);

        assert_eq!(table.shift(&mut buf, 5, 3, Some(0)).unwrap(), 1);
        let record = table.records()[0];
        assert_eq!(record.address, 0);
        assert_eq!(record.destination, 23);
        assert_eq!(record.word, 23 + BASE);
        assert_eq!(&buf[0..2], &(23u16 + BASE).to_le_bytes());
    }

    #[test]
    fn reference_after_edit_only_moves() {
        // Pointer stored at 30 targets 2, which lies before the edit.
        let mut buf = vec![0u8; 40];
        buf[30..32].copy_from_slice(&(2u16 + BASE).to_le_bytes());

        let mut table = RelocationTable::new();
        table.register(PointerRecord::from_buffer(&buf, 30, BASE).unwrap());
        buf.drain(10..12);

        assert_eq!(table.shift(&mut buf, 8, -2, Some(0)).unwrap(), 0);
        let record = table.records()[0];
        assert_eq!(record.address, 28);
        assert_eq!(record.destination, 2);
        assert_eq!(&buf[28..30], &(2u16 + BASE).to_le_bytes());
    }

    #[test]
    fn both_sides_after_edit() {
        let mut buf = vec![0u8; 64];
        buf[30..32].copy_from_slice(&(50u16 + BASE).to_le_bytes());

        let mut table = RelocationTable::new();
        table.register(PointerRecord::from_buffer(&buf, 30, BASE).unwrap());
        buf.splice(10..10, [0xAA; 4]);

        table.shift(&mut buf, 10, 4, Some(0)).unwrap();
        let record = table.records()[0];
        assert_eq!(record.address, 34);
        assert_eq!(record.destination, 54);
        assert_eq!(&buf[34..36], &(54u16 + BASE).to_le_bytes());
    }

    #[test]
    fn missing_marker_is_fatal() {
        let mut buf = vec![0u8; 40];
        buf[0..2].copy_from_slice(&(20u16 + BASE).to_le_bytes());
        buf[19] = 0x7E;

        let mut table = RelocationTable::new();
        table.register(PointerRecord::from_buffer(&buf, 0, BASE).unwrap());
        buf.splice(5..5, [0xAA; 1]);

        let err = table.shift(&mut buf, 5, 1, Some(0)).unwrap_err();
        assert!(matches!(
            err,
            PatchError::MalformedRelocation { index: Some(0), .. }
        ));
    }

    #[test]
    fn marker_check_can_be_disabled() {
        let mut buf = vec![0u8; 40];
        buf[0..2].copy_from_slice(&(20u16 + BASE).to_le_bytes());
        buf[19] = 0x7E;

        let mut table = RelocationTable::new();
        table.register(PointerRecord::from_buffer(&buf, 0, BASE).unwrap());
        buf.splice(5..5, [0xAA; 1]);

        assert_eq!(table.shift(&mut buf, 5, 1, None).unwrap(), 1);
    }
}
