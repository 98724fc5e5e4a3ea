use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::api::Transport;
use crate::error::FeedError;

pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| anyhow!("invalid base url {}: {}", base, e))?;
        if base.cannot_be_a_base() {
            return Err(anyhow!("base url {} cannot carry paths", base));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Append `path` (which may carry a query) to the base path.
    pub fn url_for(&self, path: &str) -> Result<Url, FeedError> {
        let joined = format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| FeedError::Network(format!("bad url {}: {}", joined, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<String, FeedError> {
        let url = self.url_for(path)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::from_reqwest(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Protocol {
                status: status.as_u16(),
                body,
            });
        }
        resp.text().await.map_err(|e| FeedError::from_reqwest(&e))
    }

    async fn head(&self, path: &str) -> Result<(), FeedError> {
        let url = self.url_for(path)?;
        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| FeedError::from_reqwest(&e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(FeedError::Protocol {
                status: resp.status().as_u16(),
                body: String::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_keeps_base_path_and_query() {
        let t = HttpTransport::new("http://localhost:8001/api/v1/trading/").unwrap();
        let url = t.url_for("/instance/abc/decisions?limit=50").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8001/api/v1/trading/instance/abc/decisions?limit=50"
        );
    }

    #[test]
    fn test_rejects_garbage_base() {
        assert!(HttpTransport::new("not a url").is_err());
        assert!(HttpTransport::new("mailto:ops@example.com").is_err());
    }
}
