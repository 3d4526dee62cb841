use std::{
    collections::{hash_map::RandomState, HashMap},
    hash::{BuildHasher, Hash, Hasher},
};

use itertools::Itertools;

/// Position of a single line within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRecord {
    offset: u64,
    length: usize,
}

impl LineRecord {
    #[inline]
    pub fn new(offset: u64, length: usize) -> Self {
        Self { offset, length }
    }

    /// Byte offset at which the line starts
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the line in characters, not bytes
    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }
}

/// Contains an in-memory index of lines, grouped in buckets by the hash of their content.
///
/// Equal hashes don't imply equal content. Records found in a bucket always have to be
/// compared to the actual line content.
#[derive(Debug, Clone)]
pub struct Index<H = RandomState> {
    buckets: HashMap<u64, Vec<LineRecord>, H>,
    hash_builder: H,
    len: usize,
    /// Offset of the most recently inserted record
    last_offset: Option<u64>,
}

impl Index {
    /// Create a new empty Index
    #[inline]
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<H: BuildHasher + Clone> Index<H> {
    /// Create a new empty Index which uses `hash_builder` to hash line contents.
    pub fn with_hasher(hash_builder: H) -> Self {
        Self {
            buckets: HashMap::with_hasher(hash_builder.clone()),
            hash_builder,
            len: 0,
            last_offset: None,
        }
    }
}

impl<H: BuildHasher> Index<H> {
    /// Returns the bucket key for `content`
    pub fn key(&self, content: &str) -> u64 {
        let mut hasher = self.hash_builder.build_hasher();
        content.hash(&mut hasher);
        hasher.finish()
    }

    /// Inserts a record for a line with the content `content`
    #[inline]
    pub fn insert(&mut self, content: &str, record: LineRecord) {
        let key = self.key(content);
        self.insert_keyed(key, record);
    }

    /// Inserts a record into the bucket `key`. Records have to be inserted in the order they
    /// appear in the file.
    pub fn insert_keyed(&mut self, key: u64, record: LineRecord) {
        debug_assert!(
            self.last_offset.map_or(true, |last| record.offset > last),
            "records must be inserted with increasing offsets"
        );

        self.buckets.entry(key).or_default().push(record);
        self.last_offset = Some(record.offset);
        self.len += 1;
    }

    /// Returns all records within the bucket `key` in the order they were inserted
    #[inline]
    pub fn bucket(&self, key: u64) -> &[LineRecord] {
        self.buckets.get(&key).map(|i| i.as_slice()).unwrap_or(&[])
    }

    /// Returns an iterator over all records, bucket by bucket. The order of the buckets is
    /// arbitrary and has nothing to do with the position of the lines in the file.
    pub fn records(&self) -> impl Iterator<Item = &LineRecord> {
        self.buckets.values().flatten()
    }

    /// Returns all records ordered by their offset
    pub fn sorted_records(&self) -> Vec<LineRecord> {
        self.records()
            .copied()
            .sorted_by_key(|i| i.offset)
            .collect_vec()
    }

    /// Returns the amount of records in the index
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the index is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes all records
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
        self.last_offset = None;
    }
}

impl Default for Index {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
