use async_std::io::Cursor;

use crate::{store::Store, Options};

/// A line store held entirely in memory.
pub type MemFile = Store<Cursor<Vec<u8>>>;

impl Store<Cursor<Vec<u8>>> {
    /// Create a new empty `MemFile`
    #[inline]
    pub fn new_empty(options: Options) -> Self {
        Self::from_bytes(Vec::new(), options)
    }

    /// Create a new `MemFile` holding `data`. The returned store still has to be initialized.
    #[inline]
    pub fn from_bytes(data: Vec<u8>, options: Options) -> Self {
        Store::new(Cursor::new(data), options)
    }

    /// Create a new `MemFile` holding `lines`, each followed by the terminator of `options`.
    /// Lines are not checked for duplicates.
    pub fn from_lines<I>(lines: I, options: Options) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let terminator = options.terminator.as_str();
        let mut data = Vec::new();

        for line in lines {
            data.extend(options.encoding.encode(line.as_ref()));
            data.extend(options.encoding.encode(terminator));
        }

        Self::from_bytes(data, options)
    }
}

impl<H> Store<Cursor<Vec<u8>>, H> {
    /// Consumes the `MemFile`, returning all stored bytes
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.into_inner().into_inner()
    }
}
