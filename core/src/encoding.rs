// Legacy text encodings used by on-disk labels and names
// Only decoding is needed; every table covers the upper half of an 8-bit code page.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// KOI8-R, 0x80..=0xFF
const KOI8R_HIGH: &str = concat!(
    "─│┌┐└┘├┤┬┴┼▀▄█▌▐",
    "░▒▓⌠■∙√≈≤≥\u{A0}⌡°²·÷",
    "═║╒ё╓╔╕╖╗╘╙╚╛╜╝╞",
    "╟╠╡Ё╢╣╤╥╦╧╨╩╪╫╬©",
    "юабцдефгхийклмнопярстужвьызшэщчъ",
    "ЮАБЦДЕФГХИЙКЛМНОПЯРСТУЖВЬЫЗШЭЩЧЪ",
);

/// Mac OS Roman, 0x80..=0xFF
const MAC_ROMAN_HIGH: &str = concat!(
    "ÄÅÇÉÑÖÜáàâäãåçéè",
    "êëíìîïñóòôöõúùûü",
    "†°¢£§•¶ß®©™´¨≠ÆØ",
    "∞±≤≥¥µ∂∑∏π∫ªºΩæø",
    "¿¡¬√ƒ≈∆«»…\u{A0}ÀÃÕŒœ",
    "–—“”‘’÷◊ÿŸ⁄€‹›ﬁﬂ",
    "‡·‚„‰ÂÊÁËÈÍÎÏÌÓÔ",
    "\u{F8FF}ÒÚÛÙıˆ˜¯˘˙˚¸˝˛ˇ",
);

/// Text decoding rule for fixed-width on-disk fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    Ascii,
    Latin1,
    Utf8,
    Koi8R,
    MacRoman,
    Utf16Be,
}

impl Encoding {
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::Latin1 => "iso-8859-1",
            Encoding::Utf8 => "utf-8",
            Encoding::Koi8R => "koi8-r",
            Encoding::MacRoman => "macintosh",
            Encoding::Utf16Be => "utf-16be",
        }
    }

    /// Decode raw bytes verbatim, without trimming.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Ascii => bytes
                .iter()
                .map(|&b| if b < 0x80 { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            Encoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Koi8R => decode_high_table(bytes, KOI8R_HIGH),
            Encoding::MacRoman => decode_high_table(bytes, MAC_ROMAN_HIGH),
            Encoding::Utf16Be => {
                let units = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
                char::decode_utf16(units)
                    .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect()
            }
        }
    }

    /// Decode a fixed-width field after stripping trailing NUL/space padding.
    pub fn decode_padded(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Utf16Be => {
                let mut end = bytes.len() & !1;
                while end >= 2 {
                    let unit = u16::from_be_bytes([bytes[end - 2], bytes[end - 1]]);
                    if unit != 0 && unit != 0x20 {
                        break;
                    }
                    end -= 2;
                }
                self.decode(&bytes[..end])
            }
            _ => self.decode(trim_padding(bytes)),
        }
    }

    /// Decode up to the first NUL byte.
    pub fn decode_c_string(&self, bytes: &[u8]) -> String {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.decode(&bytes[..end])
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = crate::RelicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" => Ok(Encoding::Latin1),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "koi8-r" | "koi8r" => Ok(Encoding::Koi8R),
            "macintosh" | "macroman" | "mac-roman" => Ok(Encoding::MacRoman),
            "utf-16be" | "utf16be" => Ok(Encoding::Utf16Be),
            other => Err(crate::RelicError::InvalidArgument(format!("unknown encoding: {}", other))),
        }
    }
}

/// Strip trailing NUL and space padding from a fixed-width field.
pub fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0 && b != b' ')
        .map_or(0, |p| p + 1);
    &bytes[..end]
}

fn decode_high_table(bytes: &[u8], table: &str) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                table.chars().nth((b - 0x80) as usize).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
        })
        .collect()
}
