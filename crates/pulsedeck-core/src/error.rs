use thiserror::Error;

/// Storage-backend errors.
///
/// These never escape the cache layer: the cache absorbs them and degrades to
/// a miss, so callers only ever see them when talking to a backend directly.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum StorageError {
    #[error("Failed to access underlying store: {0}")]
    Backend(String),

    #[error("Failed to serialize data: {0}")]
    Serialization(String),

    #[error("Failed to deserialize data: {0}")]
    Deserialization(String),
}

/// Cache-layer errors surfaced to callers.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The loader failed and there was no cached value to fall back to.
    #[error("Loader failed with no cached fallback: {0}")]
    Load(#[source] anyhow::Error),
}

/// Update-channel errors.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ChannelError {
    #[error("Failed to open transport: {0}")]
    Connect(String),

    #[error("Endpoint is not an http(s) or ws(s) URL: {0}")]
    InvalidEndpoint(String),
}

/// Data-API client errors.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Http(String),

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}
