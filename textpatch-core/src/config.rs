use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::locate::BoundaryRules;
use crate::{PatchError, Result};

/// Tunables for one patching run, loaded from an optional JSON file.
///
/// The boundary heuristics were tuned against one resource format; other
/// formats will likely want different values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Largest distance between a length-prefix byte and the pattern length
    /// that still counts as a length prefix.
    pub max_length_difference: u8,
    pub letter_like_min: u8,
    pub letter_like_max: u8,
    /// Stored pointer words are `destination + pointer_base`.
    pub pointer_base: u16,
    /// Byte expected right before every relocated destination. `null`
    /// disables the check.
    pub destination_marker: Option<u8>,
    /// Single-character keys mapped to the byte written for them.
    pub char_map: BTreeMap<String, u8>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        PatchConfig {
            max_length_difference: 5,
            letter_like_min: 65,
            letter_like_max: 121,
            pointer_base: 0x8000,
            destination_marker: Some(0x00),
            char_map: BTreeMap::new(),
        }
    }
}

impl PatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| match e {
            PatchError::Config(msg) => {
                PatchError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: PatchConfig = serde_json::from_str(text)
            .map_err(|e| PatchError::Config(format!("invalid patch config: {e}")))?;

        if config.letter_like_min > config.letter_like_max {
            return Err(PatchError::Config(format!(
                "letter_like_min ({}) is above letter_like_max ({})",
                config.letter_like_min, config.letter_like_max
            )));
        }

        // Surface bad remap keys at load time rather than mid-run.
        config.char_map()?;
        Ok(config)
    }

    pub fn boundary_rules(&self) -> BoundaryRules {
        BoundaryRules {
            max_length_difference: self.max_length_difference,
            letter_like_min: self.letter_like_min,
            letter_like_max: self.letter_like_max,
        }
    }

    pub fn char_map(&self) -> Result<CharMap> {
        let mut table = HashMap::with_capacity(self.char_map.len());
        for (key, &byte) in &self.char_map {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => {
                    table.insert(ch, byte);
                }
                _ => {
                    return Err(PatchError::Config(format!(
                        "char_map key {key:?} must be exactly one character"
                    )));
                }
            }
        }
        Ok(CharMap { table })
    }
}

/// Character remap table. Unlisted ASCII characters map to themselves.
#[derive(Debug, Clone, Default)]
pub struct CharMap {
    table: HashMap<char, u8>,
}

impl CharMap {
    pub fn map_char(&self, ch: char) -> Option<u8> {
        self.table
            .get(&ch)
            .copied()
            .or_else(|| ch.is_ascii().then_some(ch as u8))
    }

    /// Map every character, or return the first one with no entry.
    pub fn map_str(&self, text: &str) -> std::result::Result<Vec<u8>, char> {
        text.chars().map(|ch| self.map_char(ch).ok_or(ch)).collect()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
