use std::{
    collections::hash_map::RandomState,
    hash::BuildHasher,
    sync::atomic::{AtomicBool, Ordering},
};

use async_std::{
    io::{prelude::*, Read, Seek, SeekFrom, Write},
    sync::Mutex,
};
use async_trait::async_trait;
use log::{debug, info};

use crate::{
    encoding::{Decoded, Encoding, Terminator},
    error::Error,
    index::{Index, LineRecord},
    scanner::{Decoder, LineScanner},
    LineStore, Options, Result,
};

/// How the data in the storage ends, which decides whether a new line needs a separating
/// terminator in front of it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    /// Empty or ending with a complete terminator
    Closed,
    /// The last line has no terminator
    Open,
    /// Ends with a single `\r`, which a following `\n` would turn into one `\r\n` terminator
    Cr,
}

impl Tail {
    /// The tail of data ending with `terminator`
    #[inline]
    fn after(terminator: Option<Terminator>) -> Self {
        match terminator {
            None => Tail::Open,
            Some(Terminator::Cr) => Tail::Cr,
            Some(_) => Tail::Closed,
        }
    }
}

/// Storage and index, which always have to be accessed together since reading a line requires
/// seeking the storage first.
#[derive(Debug)]
struct State<S, H> {
    storage: S,
    index: Index<H>,
    tail: Tail,
}

/// A store of distinct lines, backed by a seekable `storage` and an in-memory index pointing to
/// the lines within it.
///
/// Before lines can be added or retrieved, the store has to be initialized by calling
/// `initialize`, which scans the whole storage once. All further reads seek directly to the
/// recorded offsets.
///
/// All operations take `&self` and are serialized internally, so a store can be shared between
/// tasks using an `Arc`.
#[derive(Debug)]
pub struct Store<S, H = RandomState> {
    state: Mutex<State<S, H>>,
    initialized: AtomicBool,
    options: Options,
}

impl<S> Store<S> {
    /// Create a new, uninitialized store reading from and appending to `storage`.
    #[inline]
    pub fn new(storage: S, options: Options) -> Self {
        Self::with_hasher(storage, options, RandomState::new())
    }
}

impl<S, H> Store<S, H> {
    /// Create a new, uninitialized store which uses `hash_builder` to hash line contents.
    pub fn with_hasher(storage: S, options: Options, hash_builder: H) -> Self
    where
        H: BuildHasher + Clone,
    {
        let state = State {
            storage,
            index: Index::with_hasher(hash_builder),
            tail: Tail::Closed,
        };

        Self {
            state: Mutex::new(state),
            initialized: AtomicBool::new(false),
            options,
        }
    }

    /// Returns `true` if the initial scan has completed
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Returns the options the store was created with
    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Consumes the store, returning the underlying storage
    #[inline]
    pub fn into_inner(self) -> S {
        self.state.into_inner().storage
    }

    #[inline]
    fn ensure_initialized(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }
}

impl<S, H> Store<S, H>
where
    S: Read + Write + Seek + Unpin + Send,
    H: BuildHasher + Send,
{
    /// Scans the storage from its current position and builds the index. Does nothing if the
    /// store is already initialized. Concurrent calls wait for the first one, the storage is
    /// only scanned once.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        // Someone else might have finished initializing while we were waiting for the lock
        if self.is_initialized() {
            return Ok(());
        }

        let start = state.storage.seek(SeekFrom::Current(0)).await?;

        if let Err(err) = Self::scan(&mut state, self.options.encoding, start).await {
            state.index.clear();
            state.tail = Tail::Closed;
            state.storage.seek(SeekFrom::Start(start)).await?;
            return Err(err);
        }

        self.initialized.store(true, Ordering::Release);
        info!("Initialized: {} lines", state.index.len());

        Ok(())
    }

    async fn scan(state: &mut State<S, H>, encoding: Encoding, start: u64) -> Result<()> {
        let mut scanner = LineScanner::new(&mut state.storage, encoding, start);

        while let Some(line) = scanner.next_line().await? {
            debug!(
                "Initialize: {:?} | {} | {}",
                line.text, line.char_len, line.offset
            );

            state.tail = Tail::after(line.terminator);
            state.index.insert(&line.text, line.record());
        }

        Ok(())
    }

    /// Appends `content` to the storage if no equal line is stored yet. Trailing line breaks
    /// of `content` are ignored. Returns `true` if the line was added and `false` if it was
    /// already present.
    pub async fn add_distinct(&self, content: &str) -> Result<bool> {
        self.ensure_initialized()?;

        let content = trim_line(content)?;
        let encoding = self.options.encoding;

        let mut state = self.state.lock().await;
        let state = &mut *state;

        let key = state.index.key(content);
        let bucket = state.index.bucket(key);
        if find_line(&mut state.storage, encoding, bucket, content)
            .await?
            .is_some()
        {
            debug!("NOT Added: {:?}", content);
            return Ok(false);
        }

        let record = self.append(state, content).await?;
        state.index.insert_keyed(key, record);

        debug!(
            "Added: {:?} | {} | {}",
            content,
            record.length(),
            record.offset()
        );

        Ok(true)
    }

    /// Writes `content` followed by a terminator to the end of the storage and returns a record
    /// pointing to it.
    async fn append(&self, state: &mut State<S, H>, content: &str) -> Result<LineRecord> {
        let encoding = self.options.encoding;
        let terminator = encoding.encode(self.options.terminator.as_str());

        let mut offset = state.storage.seek(SeekFrom::End(0)).await?;

        let mut line = encoding.encode(content);
        line.extend_from_slice(&terminator);

        // Don't glue the new line to the last one
        let separate = match state.tail {
            Tail::Closed => false,
            Tail::Open => true,
            Tail::Cr => matches!(encoding.decode_char(&line), Decoded::Char('\n', _)),
        };

        let mut data = Vec::with_capacity(line.len() + terminator.len());
        if separate {
            data.extend_from_slice(&terminator);
            offset += terminator.len() as u64;
        }
        data.extend(line);

        state.storage.write_all(&data).await?;
        state.storage.flush().await?;
        state.tail = Tail::after(Some(self.options.terminator));

        Ok(LineRecord::new(offset, content.chars().count()))
    }

    /// Returns `true` if a line equal to `content` is stored. Trailing line breaks of `content`
    /// are ignored.
    pub async fn contains(&self, content: &str) -> Result<bool> {
        self.ensure_initialized()?;

        let content = trim_line(content)?;

        let mut state = self.state.lock().await;
        let state = &mut *state;

        let bucket = state.index.bucket(state.index.key(content));
        let found = find_line(&mut state.storage, self.options.encoding, bucket, content).await?;
        Ok(found.is_some())
    }

    /// Reads all stored lines.
    ///
    /// The lines are returned bucket by bucket, which means the order is arbitrary and not
    /// the order of the lines in the file. Use `retrieve_in_file_order` if the position matters.
    pub async fn retrieve_all(&self) -> Result<Vec<String>> {
        self.ensure_initialized()?;

        let mut state = self.state.lock().await;
        let state = &mut *state;

        let mut lines = Vec::with_capacity(state.index.len());
        for record in state.index.records() {
            let line = read_at(&mut state.storage, self.options.encoding, *record).await?;
            debug!(
                "Retrieve: {:?} | {} | {}",
                line,
                record.length(),
                record.offset()
            );
            lines.push(line);
        }

        Ok(lines)
    }

    /// Reads all stored lines in the order they appear in the file.
    pub async fn retrieve_in_file_order(&self) -> Result<Vec<String>> {
        self.ensure_initialized()?;

        let mut state = self.state.lock().await;
        let state = &mut *state;

        let mut lines = Vec::with_capacity(state.index.len());
        for record in state.index.sorted_records() {
            lines.push(read_at(&mut state.storage, self.options.encoding, record).await?);
        }

        Ok(lines)
    }

    /// Returns the amount of stored lines
    pub async fn len(&self) -> Result<usize> {
        self.ensure_initialized()?;
        Ok(self.state.lock().await.index.len())
    }

    /// Returns `true` if no lines are stored
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl<S, H> LineStore for Store<S, H>
where
    S: Read + Write + Seek + Unpin + Send,
    H: BuildHasher + Send,
{
    #[inline]
    async fn initialize(&self) -> Result<()> {
        Store::initialize(self).await
    }

    #[inline]
    async fn add_distinct(&self, content: &str) -> Result<bool> {
        Store::add_distinct(self, content).await
    }

    #[inline]
    async fn retrieve_all(&self) -> Result<Vec<String>> {
        Store::retrieve_all(self).await
    }
}

/// Strips trailing line breaks and rejects lines with line breaks within them
fn trim_line(content: &str) -> Result<&str> {
    let content = content.trim_end_matches(|c: char| c == '\r' || c == '\n');
    if content.contains(|c: char| c == '\r' || c == '\n') {
        return Err(Error::EmbeddedLineBreak);
    }
    Ok(content)
}

/// Returns the first record in `bucket` whose line equals `content`
async fn find_line<S>(
    storage: &mut S,
    encoding: Encoding,
    bucket: &[LineRecord],
    content: &str,
) -> Result<Option<LineRecord>>
where
    S: Read + Seek + Unpin,
{
    let char_len = content.chars().count();

    for record in bucket {
        // Lines of different length can't be equal
        if record.length() != char_len {
            continue;
        }

        if read_at(storage, encoding, *record).await? == content {
            return Ok(Some(*record));
        }
    }

    Ok(None)
}

/// Reads the line `record` is pointing to.
async fn read_at<S>(storage: &mut S, encoding: Encoding, record: LineRecord) -> Result<String>
where
    S: Read + Seek + Unpin,
{
    storage.seek(SeekFrom::Start(record.offset())).await?;

    // A fresh decoder for each read, so no buffered data of a previous read can leak into this
    // one. Everything read ahead gets dropped together with the decoder.
    let chunk_size = record.length().saturating_mul(4);
    let mut decoder = Decoder::with_chunk_size(storage, encoding, record.offset(), chunk_size);

    let mut line = String::with_capacity(record.length());
    for found in 0..record.length() {
        match decoder.next_char().await? {
            Some(c) => line.push(c),
            None => {
                return Err(Error::EncodingMismatch {
                    offset: record.offset(),
                    expected: record.length(),
                    found,
                })
            }
        }
    }

    Ok(line)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        io,
        pin::Pin,
        sync::{atomic::AtomicUsize, Arc},
        task::{Context, Poll},
    };

    use async_std::{io::Cursor, task};

    use super::*;
    use crate::{
        encoding::{Encoding, Terminator},
        index::tests::CollideState,
        MemFile,
    };

    fn lf() -> Options {
        Options::new().terminator(Terminator::Lf)
    }

    async fn initialized(data: &[u8], options: Options) -> MemFile {
        let store = MemFile::from_bytes(data.to_vec(), options);
        store.initialize().await.unwrap();
        store
    }

    fn sorted(mut lines: Vec<String>) -> Vec<String> {
        lines.sort();
        lines
    }

    /// In-memory storage counting how often a read hit the end of the data. Every scan ends with
    /// exactly one such read. Every other read returns `Pending` first so concurrent tasks get to
    /// run in between.
    #[derive(Debug)]
    struct CountingStorage {
        inner: Cursor<Vec<u8>>,
        eof_reads: Arc<AtomicUsize>,
        yielded: bool,
    }

    impl CountingStorage {
        fn new(data: Vec<u8>) -> (Self, Arc<AtomicUsize>) {
            let eof_reads = Arc::new(AtomicUsize::new(0));
            let storage = Self {
                inner: Cursor::new(data),
                eof_reads: Arc::clone(&eof_reads),
                yielded: false,
            };
            (storage, eof_reads)
        }
    }

    impl Read for CountingStorage {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut [u8],
        ) -> Poll<io::Result<usize>> {
            if !self.yielded {
                self.yielded = true;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            self.yielded = false;

            let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
            if let Poll::Ready(Ok(0)) = poll {
                self.eof_reads.fetch_add(1, Ordering::SeqCst);
            }
            poll
        }
    }

    impl Write for CountingStorage {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_close(cx)
        }
    }

    impl Seek for CountingStorage {
        fn poll_seek(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            pos: SeekFrom,
        ) -> Poll<io::Result<u64>> {
            Pin::new(&mut self.inner).poll_seek(cx, pos)
        }
    }

    fn numbered_lines(count: usize) -> Vec<u8> {
        (0..count)
            .map(|i| format!("line number {}\n", i))
            .collect::<String>()
            .into_bytes()
    }

    #[async_std::test]
    async fn test_not_initialized() {
        let store = MemFile::from_bytes(b"one\ntwo".to_vec(), lf());

        assert!(!store.is_initialized());
        assert!(matches!(
            store.add_distinct("x").await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(
            store.retrieve_all().await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(
            store.retrieve_in_file_order().await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(store.contains("x").await, Err(Error::NotInitialized)));
        assert!(matches!(store.len().await, Err(Error::NotInitialized)));

        // Nothing was written
        assert_eq!(store.into_bytes(), b"one\ntwo");
    }

    #[async_std::test]
    async fn test_empty_then_add() {
        let store = initialized(b"", lf()).await;
        assert!(store.retrieve_all().await.unwrap().is_empty());

        assert!(store.add_distinct("alpha").await.unwrap());
        assert!(store.add_distinct("beta").await.unwrap());
        assert!(!store.add_distinct("alpha").await.unwrap());

        assert_eq!(
            sorted(store.retrieve_all().await.unwrap()),
            vec!["alpha", "beta"]
        );
        assert_eq!(store.len().await.unwrap(), 2);
        assert_eq!(store.into_bytes(), b"alpha\nbeta\n");
    }

    #[async_std::test]
    async fn test_prepopulated() {
        let store = initialized(b"one\ntwo\r\nthree", lf()).await;

        assert_eq!(
            sorted(store.retrieve_all().await.unwrap()),
            vec!["one", "three", "two"]
        );
        assert_eq!(
            store.retrieve_in_file_order().await.unwrap(),
            vec!["one", "two", "three"]
        );
    }

    #[async_std::test]
    async fn test_initialize_idempotent() {
        let (storage, eof_reads) = CountingStorage::new(b"a\nb\n".to_vec());
        let store = Store::new(storage, lf());

        for _ in 0..3 {
            store.initialize().await.unwrap();
        }

        assert_eq!(eof_reads.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[async_std::test]
    async fn test_concurrent_initialize() {
        let (storage, eof_reads) = CountingStorage::new(numbered_lines(2000));
        let store = Arc::new(Store::new(storage, lf()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                task::spawn(async move { store.initialize().await })
            })
            .collect();

        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(eof_reads.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await.unwrap(), 2000);
    }

    #[async_std::test]
    async fn test_duplicate_grows_once() {
        let store = initialized(b"", lf()).await;

        store.add_distinct("X").await.unwrap();
        store.add_distinct("X").await.unwrap();
        store.add_distinct("X\r\n").await.unwrap();

        assert_eq!(store.retrieve_all().await.unwrap(), vec!["X"]);
        assert_eq!(store.into_bytes(), b"X\n");
    }

    #[async_std::test]
    async fn test_existing_lines_are_duplicates() {
        let store = initialized("音楽好き\r\nthis is a text\n".as_bytes(), lf()).await;

        assert!(!store.add_distinct("音楽好き").await.unwrap());
        assert!(!store.add_distinct("this is a text\n").await.unwrap());
        assert!(store.contains("音楽好き").await.unwrap());
        assert!(!store.contains("音楽").await.unwrap());
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[async_std::test]
    async fn test_trailing_line_breaks_stripped() {
        let store = initialized(b"", lf()).await;

        assert!(store.add_distinct("line\r\n\n\r").await.unwrap());
        assert!(!store.add_distinct("line").await.unwrap());
        assert_eq!(store.retrieve_all().await.unwrap(), vec!["line"]);
    }

    #[async_std::test]
    async fn test_embedded_line_break() {
        let store = initialized(b"", lf()).await;

        assert!(matches!(
            store.add_distinct("two\nlines").await,
            Err(Error::EmbeddedLineBreak)
        ));
        assert!(matches!(
            store.add_distinct("two\rlines").await,
            Err(Error::EmbeddedLineBreak)
        ));
        assert!(store.is_empty().await.unwrap());
    }

    #[async_std::test]
    async fn test_empty_line() {
        let store = initialized(b"", lf()).await;

        assert!(store.add_distinct("").await.unwrap());
        assert!(!store.add_distinct("\n").await.unwrap());
        assert!(store.add_distinct("after").await.unwrap());

        assert_eq!(
            store.retrieve_in_file_order().await.unwrap(),
            vec!["", "after"]
        );

        let bytes = store.into_bytes();
        let reloaded = initialized(&bytes, lf()).await;
        assert_eq!(
            reloaded.retrieve_in_file_order().await.unwrap(),
            vec!["", "after"]
        );
    }

    #[async_std::test]
    async fn test_unterminated_tail() {
        let store = initialized(b"one\ntwo\r\nthree", lf()).await;

        assert!(store.add_distinct("four").await.unwrap());
        assert!(store.add_distinct("five").await.unwrap());

        let bytes = store.into_bytes();
        assert_eq!(bytes, b"one\ntwo\r\nthree\nfour\nfive\n");

        let reloaded = initialized(&bytes, lf()).await;
        assert_eq!(
            reloaded.retrieve_in_file_order().await.unwrap(),
            vec!["one", "two", "three", "four", "five"]
        );
    }

    #[async_std::test]
    async fn test_empty_line_after_cr() {
        let store = initialized(b"a\r", lf()).await;
        assert!(store.add_distinct("").await.unwrap());

        let before = store.retrieve_in_file_order().await.unwrap();
        assert_eq!(before, vec!["a", ""]);

        let bytes = store.into_bytes();
        assert_eq!(bytes, b"a\r\n\n");

        let reloaded = initialized(&bytes, lf()).await;
        assert_eq!(reloaded.retrieve_in_file_order().await.unwrap(), before);
    }

    #[async_std::test]
    async fn test_line_after_cr() {
        // Only a leading \n merges with the \r, everything else is written as is
        let store = initialized(b"a\r", lf()).await;
        assert!(store.add_distinct("b").await.unwrap());
        assert!(store.add_distinct("").await.unwrap());
        assert_eq!(store.into_bytes(), b"a\rb\n\n");

        let cr = Options::new().terminator(Terminator::Cr);
        let store = initialized(b"", cr).await;
        assert!(store.add_distinct("x").await.unwrap());
        assert!(store.add_distinct("").await.unwrap());

        let bytes = store.into_bytes();
        assert_eq!(bytes, b"x\r\r");
        let reloaded = initialized(&bytes, cr).await;
        assert_eq!(
            reloaded.retrieve_in_file_order().await.unwrap(),
            vec!["x", ""]
        );
    }

    #[async_std::test]
    async fn test_collisions() {
        let storage = Cursor::new(b"alpha\nbeta\n".to_vec());
        let store = Store::with_hasher(storage, lf(), CollideState::default());
        store.initialize().await.unwrap();

        assert!(store.add_distinct("gamma").await.unwrap());
        // Same length as alpha and beta, still distinct
        assert!(store.add_distinct("delta").await.unwrap());
        assert!(store.add_distinct("bet").await.unwrap());

        for existing in &["alpha", "beta", "gamma", "delta", "bet"] {
            assert!(!store.add_distinct(existing).await.unwrap());
        }

        assert_eq!(
            store.retrieve_all().await.unwrap(),
            vec!["alpha", "beta", "gamma", "delta", "bet"]
        );
    }

    #[async_std::test]
    async fn test_offsets() {
        let options = lf();
        let store = initialized("🦀\n昨日のコーヒー飲んじゃった\n".as_bytes(), options).await;
        store.add_distinct("俺はプログラミングできねええ").await.unwrap();
        store.add_distinct("plain").await.unwrap();

        let mut state = store.state.lock().await;
        let state = &mut *state;
        let records = state.index.sorted_records();
        let mut expected_offset = 0;

        for record in records {
            assert_eq!(record.offset(), expected_offset);
            let line = read_at(&mut state.storage, options.encoding, record)
                .await
                .unwrap();
            assert_eq!(line.chars().count(), record.length());
            expected_offset += options.encoding.byte_len(&line) + 1;
        }
    }

    #[async_std::test]
    async fn test_utf16() {
        let options = Options::new()
            .encoding(Encoding::Utf16Le)
            .terminator(Terminator::CrLf);

        let mut data = Encoding::Utf16Le.bom().to_vec();
        data.extend(Encoding::Utf16Le.encode("音楽好き\r\n🦀\n"));

        let store = initialized(&data, options).await;
        assert!(!store.add_distinct("🦀").await.unwrap());
        assert!(store.add_distinct("emoji 🦀 crab").await.unwrap());

        let bytes = store.into_bytes();
        let reloaded = initialized(&bytes, options).await;
        assert_eq!(
            reloaded.retrieve_in_file_order().await.unwrap(),
            vec!["音楽好き", "🦀", "emoji 🦀 crab"]
        );
    }

    #[async_std::test]
    async fn test_failed_initialize() {
        let store = MemFile::from_bytes(b"fine\n\xFF\n".to_vec(), lf());

        assert!(matches!(
            store.initialize().await,
            Err(Error::Decode { offset: 5, .. })
        ));
        assert!(!store.is_initialized());
        assert!(store.state.lock().await.index.is_empty());
    }

    #[async_std::test]
    async fn test_truncated_record() {
        let store = initialized(b"", lf()).await;
        store.add_distinct("long line").await.unwrap();

        // Simulate someone truncating the file behind our back
        store.state.lock().await.storage.get_mut().truncate(4);

        assert!(matches!(
            store.retrieve_all().await,
            Err(Error::EncodingMismatch {
                offset: 0,
                expected: 9,
                found: 4
            })
        ));
    }

    #[async_std::test]
    async fn test_round_trip() {
        let store = initialized(b"", lf()).await;
        let words = ["a", "b", "c", "a", "dd", "b", "音", "音", "", "c"];

        let mut expected = HashSet::new();
        for word in words.iter() {
            let added = store.add_distinct(word).await.unwrap();
            assert_eq!(added, expected.insert(word.to_string()));
        }

        let all = store.retrieve_all().await.unwrap();
        assert_eq!(all.len(), expected.len());
        assert_eq!(all.into_iter().collect::<HashSet<_>>(), expected);
    }
}
