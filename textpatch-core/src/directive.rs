use thiserror::Error;

/// Errors that can occur while reading a directive file.
#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("line {line}: expected {expected} '|'-separated fields, got {got}")]
    MissingField {
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("line {line}: failed to parse hex value '{token}'")]
    ParseHex {
        line: usize,
        token: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("line {line}: byte patch has no bytes")]
    EmptyPatch { line: usize },

    #[error("line {line}: unknown option '{option}'")]
    UnknownOption { line: usize, option: String },
}

/// One parsed instruction, applied in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Replace the first valid occurrence of `from` with `to`.
    Text {
        id: String,
        from: String,
        to: String,
        remap: bool,
    },
    /// Overwrite `bytes` at a fixed offset.
    Patch { offset: usize, bytes: Vec<u8> },
    /// Track the 2-byte pointer stored at `address`. Without an explicit
    /// destination it is derived from the stored word.
    Pointer {
        id: String,
        address: usize,
        destination: Option<usize>,
    },
}

impl Directive {
    pub fn label(&self) -> String {
        match self {
            Directive::Text { id, from, to, .. } => {
                format!("text {id}: \"{from}\" -> \"{to}\"")
            }
            Directive::Patch { offset, bytes } => {
                format!("patch 0x{:X} ({} bytes)", offset, bytes.len())
            }
            Directive::Pointer {
                id,
                address,
                destination,
            } => match destination {
                Some(dest) => format!("pointer {id} at 0x{address:X} -> 0x{dest:X}"),
                None => format!("pointer {id} at 0x{address:X}"),
            },
        }
    }
}

pub const PATCH_MARKER: char = '@';
pub const POINTER_MARKER: char = '*';

fn parse_hex_usize(line: usize, token: &str) -> Result<usize, DirectiveError> {
    let t = token.trim();
    let digits = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);

    usize::from_str_radix(digits, 16).map_err(|e| DirectiveError::ParseHex {
        line,
        token: t.to_string(),
        source: e,
    })
}

fn parse_hex_u8(line: usize, token: &str) -> Result<u8, DirectiveError> {
    let t = token.trim();
    let digits = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);

    u8::from_str_radix(digits, 16).map_err(|e| DirectiveError::ParseHex {
        line,
        token: t.to_string(),
        source: e,
    })
}

/// Parse a directive file.
///
/// Line formats (hex numbers, optional `0x` prefix):
///
/// - `@location|byte|byte...`      absolute byte patch
/// - `*id|address`                 pointer registration, destination read
///                                 from the stored word
/// - `*id|address|destination`     pointer registration, explicit
/// - `id|from|to`                  text replacement
/// - `id|from|to|raw`              text replacement without remapping
///
/// Blank lines and lines starting with `#` or `//` are ignored, as are text
/// lines whose `from` or `to` is blank.
pub fn parse_directives(src: &str) -> Result<Vec<Directive>, DirectiveError> {
    let mut out = Vec::new();

    for (idx, raw_line) in src.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        if let Some(rest) = line.strip_prefix(PATCH_MARKER) {
            let fields: Vec<&str> = rest.split('|').collect();
            let offset = parse_hex_usize(line_no, fields[0])?;
            let bytes = fields[1..]
                .iter()
                .filter(|f| !f.trim().is_empty())
                .map(|f| parse_hex_u8(line_no, f))
                .collect::<Result<Vec<u8>, _>>()?;
            if bytes.is_empty() {
                return Err(DirectiveError::EmptyPatch { line: line_no });
            }
            out.push(Directive::Patch { offset, bytes });
            continue;
        }

        if let Some(rest) = line.strip_prefix(POINTER_MARKER) {
            let fields: Vec<&str> = rest.split('|').collect();
            let (address, destination) = match fields.len() {
                2 => (parse_hex_usize(line_no, fields[1])?, None),
                3 => (
                    parse_hex_usize(line_no, fields[1])?,
                    Some(parse_hex_usize(line_no, fields[2])?),
                ),
                got => {
                    return Err(DirectiveError::MissingField {
                        line: line_no,
                        expected: 2,
                        got,
                    });
                }
            };
            out.push(Directive::Pointer {
                id: fields[0].trim().to_string(),
                address,
                destination,
            });
            continue;
        }

        let fields: Vec<&str> = line.split('|').collect();
        let remap = match fields.len() {
            3 => true,
            4 => {
                let option = fields[3].trim();
                if !option.eq_ignore_ascii_case("raw") {
                    return Err(DirectiveError::UnknownOption {
                        line: line_no,
                        option: option.to_string(),
                    });
                }
                false
            }
            got => {
                return Err(DirectiveError::MissingField {
                    line: line_no,
                    expected: 3,
                    got,
                });
            }
        };

        let from = fields[1].trim();
        let to = fields[2].trim();
        if from.is_empty() || to.is_empty() {
            continue;
        }

        out.push(Directive::Text {
            id: fields[0].trim().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            remap,
        });
    }

    Ok(out)
}
