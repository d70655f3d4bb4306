pub mod arena;
pub mod memtable;
pub mod skiplist;
