use crate::encoding::{Encoding, Terminator};

/// Options used to open a line store.
///
/// ```
/// use line_file::{encoding::{Encoding, Terminator}, Options};
///
/// let options = Options::new()
///     .encoding(Encoding::Utf16Le)
///     .terminator(Terminator::CrLf);
/// assert!(options.create);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Encoding used to decode and encode lines. Defaults to UTF-8 without byte order mark
    pub encoding: Encoding,
    /// Terminator appended to new lines. Defaults to the platforms newline
    pub terminator: Terminator,
    /// Create the file if it doesn't exist. Only used by `LineFile`
    pub create: bool,
}

impl Options {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[inline]
    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    #[inline]
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }
}

impl Default for Options {
    #[inline]
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            terminator: Terminator::default(),
            create: true,
        }
    }
}
