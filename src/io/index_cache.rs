use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use super::range_reader::{read_u40_be, RangeReader};
use crate::error::FormatError;
use crate::format::{SubFileParameter, BYTES_PER_INDEX_ENTRY};

/// Number of index entries fetched with a single read.
pub const INDEX_ENTRIES_PER_BLOCK: u64 = 128;

/// Size of a full index block in bytes.
const SIZE_OF_INDEX_BLOCK: u64 = INDEX_ENTRIES_PER_BLOCK * BYTES_PER_INDEX_ENTRY;

/// Default cache capacity in number of index blocks.
pub const DEFAULT_INDEX_CACHE_CAPACITY: usize = 64;

/// Bit flagging a block that is entirely covered by water.
const BITMASK_INDEX_WATER: u64 = 0x80_0000_0000;

/// Bits holding the block offset.
const BITMASK_INDEX_OFFSET: u64 = 0x7F_FFFF_FFFF;

/// A decoded entry of a sub-file block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Whether the block contains only water
    pub is_water: bool,

    /// Offset of the block relative to the sub-file start address
    pub block_offset: u64,
}

impl IndexEntry {
    /// Decode a raw 40-bit index entry.
    pub fn from_raw(raw: u64) -> Self {
        Self {
            is_water: raw & BITMASK_INDEX_WATER != 0,
            block_offset: raw & BITMASK_INDEX_OFFSET,
        }
    }
}

/// Cache key: sub-file (identified by its start address) + index block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct IndexBlockKey {
    sub_file_start: u64,
    index_block: u64,
}

/// LRU cache of sub-file index blocks over any [`RangeReader`].
///
/// Looking up the blocks of a tile touches neighbouring index entries, so
/// entries are fetched 128 at a time and kept in memory:
/// - Fixed-size index blocks (640 bytes, shorter for the last block)
/// - LRU eviction when the cache reaches capacity
/// - Lookups outside the sub-file grid are rejected before any read
pub struct IndexCache<R> {
    /// The underlying reader
    reader: Arc<R>,
    /// Cached index blocks
    cache: Mutex<LruCache<IndexBlockKey, Bytes>>,
}

impl<R: RangeReader> IndexCache<R> {
    /// Create a new index cache holding at most `capacity` blocks.
    pub fn new(reader: Arc<R>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            reader,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get the index entry of a block in a sub-file.
    pub fn get_index_entry(
        &self,
        sub_file: &SubFileParameter,
        block_number: u64,
    ) -> Result<IndexEntry, FormatError> {
        if block_number >= sub_file.number_of_blocks {
            return Err(FormatError::InvalidBlockNumber {
                block: block_number,
                blocks: sub_file.number_of_blocks,
            });
        }

        let key = IndexBlockKey {
            sub_file_start: sub_file.start_address,
            index_block: block_number / INDEX_ENTRIES_PER_BLOCK,
        };

        let block = self.get_block(sub_file, key)?;
        let entry_in_block = (block_number % INDEX_ENTRIES_PER_BLOCK) * BYTES_PER_INDEX_ENTRY;
        let start = entry_in_block as usize;
        let raw = read_u40_be(&block[start..start + BYTES_PER_INDEX_ENTRY as usize]);
        Ok(IndexEntry::from_raw(raw))
    }

    /// Drop all cached blocks.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Check if no block is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    fn get_block(
        &self,
        sub_file: &SubFileParameter,
        key: IndexBlockKey,
    ) -> Result<Bytes, FormatError> {
        if let Some(block) = self.cache.lock().get(&key) {
            return Ok(block.clone());
        }

        // Read outside the lock; two threads may race on the same block,
        // which costs a duplicate read but never a wrong result.
        let position = sub_file.index_start_address + key.index_block * SIZE_OF_INDEX_BLOCK;
        let remaining = sub_file.index_end_address.saturating_sub(position);
        let len = std::cmp::min(SIZE_OF_INDEX_BLOCK, remaining) as usize;

        trace!(
            identifier = self.reader.identifier(),
            position,
            len,
            "reading index block"
        );
        let block = self.reader.read_exact_at(position, len)?;

        self.cache.lock().put(key, block.clone());
        Ok(block)
    }
}
