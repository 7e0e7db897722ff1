use super::area::MemoryArea;
use serde::{Deserialize, Serialize};

/// Maximum bit index inside a 16-bit word.
pub const MAX_BIT_INDEX: u8 = 15;
/// Maximum declarable element length in an address bracket.
pub const MAX_DECLARED_LEN: u16 = 999;

/// Parsed FINS memory address.
///
/// Textual form is `<area><digits>[.bit][ [len] ]`, for example `D100`,
/// `DM20.3`, `CIO5`, `D200[16]`. A bit suffix marks a single-bit address; a
/// length bracket declares the element count for string tags. The two are
/// mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinsAddress {
    /// Target memory area.
    pub area: MemoryArea,
    /// Word index inside the area.
    pub word: u16,
    /// Bit index 0 to 15 when the address names a single bit.
    pub bit: Option<u8>,
    /// Declared element length from the bracket suffix.
    pub length: Option<u16>,
}

impl FinsAddress {
    /// Parse a textual address.
    ///
    /// Syntax errors come back as plain strings; callers wrap them into their
    /// own error type together with the offending input.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("address is empty".to_string());
        }

        let (area, rest) = MemoryArea::strip_prefix(trimmed)
            .ok_or_else(|| format!("unknown area prefix in '{trimmed}'"))?;

        // Peel the optional [len] bracket off the tail first.
        let (rest, length) = match rest.find('[') {
            Some(open) => {
                let close = rest
                    .rfind(']')
                    .ok_or_else(|| format!("unterminated length bracket in '{trimmed}'"))?;
                if close != rest.trim_end().len() - 1 || close < open {
                    return Err(format!("malformed length bracket in '{trimmed}'"));
                }
                let len_str = rest[open + 1..close].trim();
                let len: u16 = len_str
                    .parse()
                    .map_err(|_| format!("invalid length '{len_str}' in '{trimmed}'"))?;
                if len == 0 || len > MAX_DECLARED_LEN {
                    return Err(format!(
                        "length {len} out of range 1..={MAX_DECLARED_LEN} in '{trimmed}'"
                    ));
                }
                (rest[..open].trim_end(), Some(len))
            }
            None => (rest, None),
        };

        // Split the optional .bit suffix.
        let (num_part, bit) = match rest.split_once('.') {
            Some((n, b)) => {
                let b = b.trim();
                if b.is_empty() {
                    return Err(format!("empty bit index in '{trimmed}'"));
                }
                let bit: u8 = b
                    .parse()
                    .map_err(|_| format!("invalid bit index '{b}' in '{trimmed}'"))?;
                if bit > MAX_BIT_INDEX {
                    return Err(format!(
                        "bit index {bit} out of range 0..={MAX_BIT_INDEX} in '{trimmed}'"
                    ));
                }
                (n.trim(), Some(bit))
            }
            None => (rest.trim(), None),
        };

        if bit.is_some() && length.is_some() {
            return Err(format!(
                "bit index and length bracket are mutually exclusive in '{trimmed}'"
            ));
        }

        if num_part.is_empty() {
            return Err(format!("missing word index in '{trimmed}'"));
        }
        let word: u16 = num_part
            .parse()
            .map_err(|_| format!("invalid word index '{num_part}' in '{trimmed}'"))?;

        Ok(FinsAddress {
            area,
            word,
            bit,
            length,
        })
    }
}

impl std::fmt::Display for FinsAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.area, self.word)?;
        if let Some(bit) = self.bit {
            write!(f, ".{bit}")?;
        }
        if let Some(len) = self.length {
            write!(f, "[{len}]")?;
        }
        Ok(())
    }
}
