//! # pulsedeck-client
//!
//! Client library for the Pulsedeck monitoring backend.
//!
//! This crate provides the two ways metrics reach a consumer:
//! - A resilient real-time update [`Channel`]: one WebSocket stream per
//!   subscription target, reconnecting with bounded exponential backoff on
//!   unclean closes, with periodic liveness pings and per-type event fan-out
//! - An [`ApiClient`] for the request/response metrics API, with bounded
//!   retries on transport failure
//!
//! ## Example
//!
//! ```rust,ignore
//! use pulsedeck_client::{Channel, ChannelConfig};
//!
//! let config = ChannelConfig::new(pulsedeck_client::ws_endpoint(
//!     "https://metrics.example.com",
//!     "ws/dashboard/",
//! )?);
//! let channel = Channel::new(config);
//! channel.on("metrics_update", |msg| {
//!     println!("update: {msg:?}");
//! });
//! channel.connect().await?;
//! ```

pub mod api;
pub mod backoff;
pub mod channel;
pub mod dispatch;

pub use api::{ApiClient, ApiConfig};
pub use backoff::Backoff;
pub use channel::{ws_endpoint, Channel, ChannelConfig, ChannelState};
pub use dispatch::{Dispatcher, HandlerId};
