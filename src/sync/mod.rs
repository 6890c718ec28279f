//! The sync pipeline: credential exchange, timer fetch, author resolution,
//! snapshot writes — plus the stop-side invalidation path that races with it.

pub mod invalidate;
pub mod pipeline;
pub mod resolver;

pub use invalidate::stop_and_invalidate;
pub use pipeline::{SyncPipeline, TimerProvider};
pub use resolver::{AuthorResolver, UserDirectory};
