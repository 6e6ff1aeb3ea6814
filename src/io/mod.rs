mod index_cache;
mod range_reader;
mod read_buffer;

pub use index_cache::{
    IndexCache, IndexEntry, DEFAULT_INDEX_CACHE_CAPACITY, INDEX_ENTRIES_PER_BLOCK,
};
pub use range_reader::{
    read_u16_be, read_u32_be, read_u40_be, read_u64_be, FileRangeReader, MemoryRangeReader,
    RangeReader,
};
pub use read_buffer::ReadBuffer;
