//! # pulsedeck-types
//!
//! Core domain types shared across all Pulsedeck crates.
//!
//! This crate provides the foundational types for the monitoring client:
//! - Push-channel wire protocol messages
//! - System metrics payloads returned by the data API
//!
//! ## Design Philosophy
//!
//! This crate intentionally has minimal dependencies to:
//! 1. Enable lightweight client libraries
//! 2. Allow mock implementations for testing
//! 3. Provide clear separation between domain types and implementation

pub mod message;
pub mod metrics;

// Re-exports for convenience
pub use message::{ClientMessage, ServerMessage, EVENT_MESSAGE};
pub use metrics::{HostMetrics, HostSummary, SystemMetrics, SystemOverview, TimelinePoint};
