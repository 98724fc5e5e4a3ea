use async_trait::async_trait;
use url::Url;

use crate::error::FeedError;

mod http;
pub mod trading_config;
pub mod types;

pub use http::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
}

/// Request target relative to the service base, query included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
}

impl Endpoint {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
        }
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            path: path.into(),
        }
    }
}

/// Percent-encode `raw` as a single path segment. Space becomes `%20` and
/// `/` becomes `%2F`, so an id can never add path levels.
pub(crate) fn encode_segment(raw: &str) -> String {
    let Ok(mut scratch) = Url::parse("http://localhost/") else {
        return raw.to_string();
    };
    if let Ok(mut segments) = scratch.path_segments_mut() {
        segments.clear().push(raw);
    }
    scratch.path().trim_start_matches('/').to_string()
}

/// Read side of the trading service as the poller sees it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Body of a successful GET; non-success statuses are protocol failures.
    async fn get(&self, path: &str) -> Result<String, FeedError>;
    /// Succeeds only on a success status.
    async fn head(&self, path: &str) -> Result<(), FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_encoding_uses_path_rules() {
        assert_eq!(encode_segment("inst-1"), "inst-1");
        assert_eq!(encode_segment("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_segment("50%?#"), "50%25%3F%23");
        assert_eq!(encode_segment("a+b"), "a+b");
    }
}
