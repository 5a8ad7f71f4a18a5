pub mod codec;
pub mod kv;
pub mod meta;
pub mod repository;

pub use codec::Schema;
pub use kv::{FileKvStore, KvStore, MemoryKvStore};
pub use meta::SyncMeta;
pub use repository::LocalRepository;
