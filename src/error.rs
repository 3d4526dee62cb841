use thiserror::Error;

use crate::encoding::Encoding;

#[derive(Debug, Error)]
pub enum Error {
    /// A data operation was requested before the initial scan completed
    #[error("store is not initialized")]
    NotInitialized,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes at `offset` can't be decoded using `encoding`
    #[error("invalid {encoding} data at byte offset {offset}")]
    Decode { encoding: Encoding, offset: u64 },

    /// A line record doesn't match the data at its offset anymore, usually because the file
    /// was changed by someone else
    #[error("line at byte offset {offset} holds {found} of {expected} expected characters")]
    EncodingMismatch {
        offset: u64,
        expected: usize,
        found: usize,
    },

    #[error("line content contains an embedded line break")]
    EmbeddedLineBreak,
}
