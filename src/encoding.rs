use std::fmt::Display;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Text encoding of a line file.
///
/// A "character" is always a unicode scalar value (a rust `char`), independent of the
/// encoding. This means the character length of a line and the amount of bytes it occupies
/// on disk differ for everything but ASCII text in UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

/// Result of decoding a single character from the beginning of a byte slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decoded {
    /// A character and the amount of bytes it was encoded with
    Char(char, usize),
    /// More bytes are required to decode the next character
    Incomplete,
    Invalid,
}

impl Encoding {
    /// Returns the amount of bytes `text` takes up in this encoding.
    pub fn byte_len(self, text: &str) -> u64 {
        match self {
            Encoding::Utf8 => text.len() as u64,
            Encoding::Utf16Le | Encoding::Utf16Be => text.encode_utf16().count() as u64 * 2,
        }
    }

    /// Returns the amount of bytes a single character takes up in this encoding.
    #[inline]
    pub fn char_width(self, c: char) -> usize {
        match self {
            Encoding::Utf8 => c.len_utf8(),
            Encoding::Utf16Le | Encoding::Utf16Be => c.len_utf16() * 2,
        }
    }

    /// Encodes `text` into bytes.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Encoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    /// The byte order mark of the encoding. Files are never written with it, but it gets
    /// skipped if a file starts with it.
    pub fn bom(self) -> &'static [u8] {
        match self {
            Encoding::Utf8 => UTF8_BOM,
            Encoding::Utf16Le => UTF16_LE_BOM,
            Encoding::Utf16Be => UTF16_BE_BOM,
        }
    }

    /// Decodes the first character in `bytes`
    pub(crate) fn decode_char(self, bytes: &[u8]) -> Decoded {
        match self {
            Encoding::Utf8 => decode_utf8(bytes),
            Encoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Encoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        }
    }
}

fn decode_utf8(bytes: &[u8]) -> Decoded {
    let first = match bytes.first() {
        Some(first) => *first,
        None => return Decoded::Incomplete,
    };

    let width = match first {
        0x00..=0x7F => return Decoded::Char(first as char, 1),
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return Decoded::Invalid,
    };

    if bytes.len() < width {
        // Reject bad continuation bytes early instead of waiting for more data
        if bytes[1..].iter().any(|b| b & 0xC0 != 0x80) {
            return Decoded::Invalid;
        }
        return Decoded::Incomplete;
    }

    match std::str::from_utf8(&bytes[..width])
        .ok()
        .and_then(|s| s.chars().next())
    {
        Some(c) => Decoded::Char(c, width),
        None => Decoded::Invalid,
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Decoded {
    if bytes.len() < 2 {
        return Decoded::Incomplete;
    }

    let first = unit([bytes[0], bytes[1]]);
    let width = if (0xD800..=0xDBFF).contains(&first) {
        4
    } else {
        2
    };

    if bytes.len() < width {
        return Decoded::Incomplete;
    }

    let second = if width == 4 {
        Some(unit([bytes[2], bytes[3]]))
    } else {
        None
    };

    match char::decode_utf16(std::iter::once(first).chain(second)).next() {
        Some(Ok(c)) => Decoded::Char(c, width),
        _ => Decoded::Invalid,
    }
}

impl Default for Encoding {
    /// UTF-8 without byte order mark
    #[inline]
    fn default() -> Self {
        Encoding::Utf8
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16Be => "UTF-16BE",
        };
        f.write_str(name)
    }
}

/// The line terminator appended to lines written into a file. Scanning accepts all of them
/// regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminator {
    Lf,
    CrLf,
    Cr,
}

impl Terminator {
    /// The newline of the current platform
    #[inline]
    pub fn platform() -> Self {
        if cfg!(windows) {
            Terminator::CrLf
        } else {
            Terminator::Lf
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Terminator::Lf => "\n",
            Terminator::CrLf => "\r\n",
            Terminator::Cr => "\r",
        }
    }
}

impl Default for Terminator {
    #[inline]
    fn default() -> Self {
        Terminator::platform()
    }
}
