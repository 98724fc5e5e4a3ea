use std::fmt;

/// Failure of a single feed tick. Caught at the feed boundary; never
/// propagates to other feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Request rejected before a status arrived, or the probe deadline passed.
    Network(String),
    /// Non-success HTTP status.
    Protocol { status: u16, body: String },
    /// Payload did not match the expected shape.
    Decode(String),
}

impl FeedError {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Network(_) => "network",
            FeedError::Protocol { .. } => "protocol",
            FeedError::Decode(_) => "decode",
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            FeedError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FeedError::Protocol {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            FeedError::Network(err.to_string())
        }
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Network(msg) => write!(f, "network failure: {}", msg),
            FeedError::Protocol { status, body } if body.is_empty() => {
                write!(f, "protocol failure: status {}", status)
            }
            FeedError::Protocol { status, body } => {
                write!(f, "protocol failure: status {}: {}", status, body)
            }
            FeedError::Decode(msg) => write!(f, "decode failure: {}", msg),
        }
    }
}

impl std::error::Error for FeedError {}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}
