//! # pulsedeck-core
//!
//! Storage abstraction and caching layer for the Pulsedeck monitoring client.
//!
//! The cache in this crate implements stale-while-revalidate semantics over a
//! pluggable flat key/value namespace: reads serve the most recently known
//! value immediately (even past its TTL) while a background refresh corrects
//! it, so a consuming view never blocks on a slow upstream fetch when it has
//! anything at all to show.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pulsedeck_core::cache::SwrCache;
//! use pulsedeck_core::storage::MemoryBackend;
//!
//! let cache = SwrCache::new(Arc::new(MemoryBackend::new()));
//! let overview = cache
//!     .fetch("dashboard:overview", Duration::from_secs(300), || async {
//!         api.system_overview().await.map_err(Into::into)
//!     })
//!     .await?;
//! ```

pub mod cache;
pub mod clock;
pub mod error;
pub mod storage;

pub use cache::{CacheConfig, CacheStats, EntryStats, SwrCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApiError, CacheError, ChannelError, StorageError};
pub use storage::{FileBackend, KvBackend, MemoryBackend};
