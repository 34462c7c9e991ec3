//! # pulsedeck
//!
//! Client core for a system-monitoring dashboard.
//!
//! The backend exposes two surfaces: a request/response metrics API and a
//! push endpoint streaming per-host updates. This crate composes the pieces
//! from the workspace into the flow a dashboard view actually runs:
//!
//! 1. Ask the cache-backed API for data — served instantly (possibly stale)
//!    while a background refresh corrects it
//! 2. Subscribe to the real-time channel for push updates
//! 3. Merge incoming messages into in-memory per-host state, invalidating
//!    cache entries the server names
//!
//! ## Example
//!
//! ```rust,ignore
//! use pulsedeck::prelude::*;
//!
//! let cache = SwrCache::new(Arc::new(MemoryBackend::new()));
//! let api = ApiClient::new(ApiConfig::new("https://metrics.example.com"))?;
//! let cached = CachedApi::new(api, cache);
//! let state = Arc::new(DashboardState::new());
//!
//! let channel = Channel::new(ChannelConfig::new(ws_endpoint(
//!     "https://metrics.example.com",
//!     "ws/dashboard/",
//! )?));
//! let view_state = state.clone();
//! channel.on("message", move |msg| {
//!     view_state.apply(msg);
//! });
//! channel.connect().await?;
//!
//! let overview = cached.system_overview().await?;
//! ```

pub mod cached;
pub mod dashboard;

pub use cached::CachedApi;
pub use dashboard::{DashboardState, DashboardSummary, HostState};

pub mod prelude {
    pub use crate::cached::CachedApi;
    pub use crate::dashboard::{DashboardState, DashboardSummary, HostState};
    pub use pulsedeck_client::{
        ws_endpoint, ApiClient, ApiConfig, Channel, ChannelConfig, ChannelState,
    };
    pub use pulsedeck_core::{
        CacheConfig, Clock, KvBackend, ManualClock, MemoryBackend, SwrCache, SystemClock,
    };
    pub use pulsedeck_types::{
        ClientMessage, HostMetrics, HostSummary, ServerMessage, SystemMetrics, SystemOverview,
    };
}
