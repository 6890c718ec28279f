//! TTL-bounded key-value caching: the storage trait, the active-timer
//! snapshot cache, and the identity record cache.

pub mod store;
pub mod timers;
pub mod users;

pub use store::{KvStore, SqliteStore};
pub use timers::{TimerCache, WriteStats};
pub use users::UserCache;
