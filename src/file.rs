use async_std::{fs, path::Path};

use crate::{store::Store, Options, Result};

/// A line store backed by an `async_std::fs::File`.
pub type LineFile = Store<fs::File>;

impl Store<fs::File> {
    /// Open a line file using the default options. The file gets created if it doesn't exist.
    ///
    /// The returned store still has to be initialized.
    #[inline]
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<LineFile> {
        Self::open_with(path, Options::default()).await
    }

    /// Open a line file using custom options.
    pub async fn open_with<P: AsRef<Path>>(path: P, options: Options) -> Result<LineFile> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(options.create)
            .open(path)
            .await?;

        Ok(Store::new(file, options))
    }
}
