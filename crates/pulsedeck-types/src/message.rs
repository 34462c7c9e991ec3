//! Wire protocol for the real-time update channel.
//!
//! All messages are JSON text frames carrying a `type` discriminator.
//! Inbound frames deserialize into [`ServerMessage`]; types the client does
//! not recognize are preserved as [`ServerMessage::Unknown`] rather than
//! silently dropped, so consumers can still observe and log them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metrics::SystemMetrics;

/// Event name fired for every inbound message, regardless of its type.
pub const EVENT_MESSAGE: &str = "message";

/// Messages pushed by the server over the update channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent by the server right after the connection is accepted.
    ConnectionEstablished {
        #[serde(default)]
        message: String,
    },
    /// Acknowledges the client's subscribe handshake.
    SubscriptionConfirmed {
        #[serde(default)]
        scope: String,
    },
    /// Reply to an outbound liveness ping.
    Pong {
        #[serde(default)]
        timestamp: Option<u64>,
    },
    /// Fresh metrics sample for a single host.
    MetricsUpdate {
        hostname: String,
        metrics: SystemMetrics,
        timestamp: f64,
    },
    /// A host stopped reporting and is considered offline.
    HostOffline {
        hostname: String,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    /// Server-side data changed; the named cache entries are stale.
    CacheInvalidation {
        #[serde(default)]
        hostname: Option<String>,
        #[serde(default)]
        cache_keys: Vec<String>,
    },
    /// Any message with a `type` the client does not recognize.
    #[serde(skip)]
    Unknown { message_type: String, payload: Value },
}

impl ServerMessage {
    /// Parse a raw text frame into a message.
    ///
    /// Frames with an unrecognized `type` (or no `type` at all) become
    /// [`ServerMessage::Unknown`]. Only frames that are not valid JSON fail.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<Self>(text) {
            Ok(msg) => Ok(msg),
            Err(_) => {
                let payload: Value = serde_json::from_str(text)?;
                let message_type = payload
                    .get("type")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::Unknown {
                    message_type,
                    payload,
                })
            }
        }
    }

    /// The event name this message fires, matching its wire `type` field.
    ///
    /// Empty for unknown messages that carried no `type` field.
    pub fn event_name(&self) -> &str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::SubscriptionConfirmed { .. } => "subscription_confirmed",
            Self::Pong { .. } => "pong",
            Self::MetricsUpdate { .. } => "metrics_update",
            Self::HostOffline { .. } => "host_offline",
            Self::CacheInvalidation { .. } => "cache_invalidation",
            Self::Unknown { message_type, .. } => message_type,
        }
    }
}

/// Messages the client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Handshake sent immediately after the transport opens.
    SubscribeAll,
    /// Periodic liveness ping with the client's epoch-millisecond clock.
    Ping { timestamp: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_update_parsing() {
        let json = r#"{"type":"metrics_update","hostname":"web-01","metrics":{"cpu_percent":42.5,"memory_percent":61.0,"memory_available_mb":3120.0,"memory_used_mb":4880.0},"timestamp":1700000000.5}"#;
        let msg = ServerMessage::parse(json).unwrap();

        match msg {
            ServerMessage::MetricsUpdate {
                hostname, metrics, ..
            } => {
                assert_eq!(hostname, "web-01");
                assert!((metrics.cpu_percent - 42.5).abs() < f64::EPSILON);
            }
            other => panic!("expected MetricsUpdate, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let json = r#"{"type":"deploy_started","release":"v1.2.3"}"#;
        let msg = ServerMessage::parse(json).unwrap();

        match &msg {
            ServerMessage::Unknown {
                message_type,
                payload,
            } => {
                assert_eq!(message_type, "deploy_started");
                assert_eq!(payload["release"], "v1.2.3");
            }
            other => panic!("expected Unknown, got {other:?}"),
        }
        assert_eq!(msg.event_name(), "deploy_started");
    }

    #[test]
    fn test_missing_type_field() {
        let msg = ServerMessage::parse(r#"{"data":1}"#).unwrap();
        assert_eq!(msg.event_name(), "");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(ServerMessage::parse("not json").is_err());
    }

    #[test]
    fn test_client_message_wire_shape() {
        let subscribe = serde_json::to_string(&ClientMessage::SubscribeAll).unwrap();
        assert_eq!(subscribe, r#"{"type":"subscribe_all"}"#);

        let ping = serde_json::to_string(&ClientMessage::Ping { timestamp: 1700 }).unwrap();
        assert_eq!(ping, r#"{"type":"ping","timestamp":1700}"#);
    }

    #[test]
    fn test_cache_invalidation_defaults() {
        let msg = ServerMessage::parse(r#"{"type":"cache_invalidation"}"#).unwrap();
        match msg {
            ServerMessage::CacheInvalidation {
                hostname,
                cache_keys,
            } => {
                assert!(hostname.is_none());
                assert!(cache_keys.is_empty());
            }
            other => panic!("expected CacheInvalidation, got {other:?}"),
        }
    }
}
