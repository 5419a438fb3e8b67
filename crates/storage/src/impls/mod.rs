#[cfg(feature = "leveldb")]
pub(crate) mod leveldb;
pub(crate) mod memory;
