use serde::{Deserialize, Serialize};

/// Memory areas addressable through memory-area read/write commands.
///
/// Each area carries two wire codes, one for word access and one for bit
/// access. Whether bit access is actually usable depends on the detected
/// controller model and is enforced at the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoryArea {
    /// Data memory (`D` / `DM`).
    DataMemory,
    /// Core I/O (`C` / `CIO`).
    CommonIo,
    /// Work area (`W`).
    Work,
    /// Holding area (`H`).
    Holding,
    /// Auxiliary area (`A`), C-family controllers only.
    Auxiliary,
}

impl MemoryArea {
    /// Wire code for word-wise access.
    pub fn word_code(self) -> u8 {
        match self {
            MemoryArea::DataMemory => 0x82,
            MemoryArea::CommonIo => 0xB0,
            MemoryArea::Work => 0xB1,
            MemoryArea::Holding => 0xB2,
            MemoryArea::Auxiliary => 0xB3,
        }
    }

    /// Wire code for bit-wise access.
    pub fn bit_code(self) -> u8 {
        match self {
            MemoryArea::DataMemory => 0x02,
            MemoryArea::CommonIo => 0x30,
            MemoryArea::Work => 0x31,
            MemoryArea::Holding => 0x32,
            MemoryArea::Auxiliary => 0x33,
        }
    }

    /// Split a textual address into its area prefix and the remainder.
    ///
    /// Prefixes are case-insensitive. Two-letter prefixes win over their
    /// one-letter forms so that `DM100` is not read as `D` + `M100`.
    pub fn strip_prefix(input: &str) -> Option<(MemoryArea, &str)> {
        let upper: Vec<u8> = input
            .bytes()
            .take(3)
            .map(|b| b.to_ascii_uppercase())
            .collect();
        if upper.starts_with(b"CIO") {
            return Some((MemoryArea::CommonIo, &input[3..]));
        }
        if upper.starts_with(b"DM") {
            return Some((MemoryArea::DataMemory, &input[2..]));
        }
        match upper.first() {
            Some(b'D') => Some((MemoryArea::DataMemory, &input[1..])),
            Some(b'C') => Some((MemoryArea::CommonIo, &input[1..])),
            Some(b'W') => Some((MemoryArea::Work, &input[1..])),
            Some(b'H') => Some((MemoryArea::Holding, &input[1..])),
            Some(b'A') => Some((MemoryArea::Auxiliary, &input[1..])),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryArea::DataMemory => write!(f, "D"),
            MemoryArea::CommonIo => write!(f, "CIO"),
            MemoryArea::Work => write!(f, "W"),
            MemoryArea::Holding => write!(f, "H"),
            MemoryArea::Auxiliary => write!(f, "A"),
        }
    }
}
