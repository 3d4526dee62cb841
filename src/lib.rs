//!A library to store distinct lines in large files. Lines are indexed by the hash of their
//!content and read back directly from their byte offset, so the file never has to be loaded
//!into memory.

/// Text encodings and line terminators
pub mod encoding;
pub mod error;
/// A line store backed by a file on disk
pub mod file;
/// The in-memory index of lines
pub mod index;
/// A line store held in memory
pub mod mem_file;
mod options;
/// Splitting streams into lines with offsets
pub mod scanner;
pub mod store;

pub use file::LineFile;
pub use mem_file::MemFile;
pub use options::Options;
pub use store::Store;

use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, error::Error>;

/// The operations a frontend needs to store and show distinct lines.
#[async_trait]
pub trait LineStore {
    /// Builds the index. Has to be called once before any other operation, further calls do
    /// nothing.
    async fn initialize(&self) -> Result<()>;

    /// Appends `content` unless an equal line is stored already. Returns `true` if it was
    /// appended.
    async fn add_distinct(&self, content: &str) -> Result<bool>;

    /// Returns all stored lines in no particular order.
    async fn retrieve_all(&self) -> Result<Vec<String>>;
}
