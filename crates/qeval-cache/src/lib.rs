pub mod slot;
pub mod sqlite_slot;
pub mod store;

pub use slot::{KvSlot, MemorySlot, SlotError, SlotResult};
pub use sqlite_slot::SqliteSlot;
pub use store::{CacheStore, Namespace};
