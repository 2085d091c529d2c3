use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{HttpClient, fetch_bytes};
use crate::feeds::FeedEndpoint;

/// Produces the raw payload of one endpoint.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, endpoint: &FeedEndpoint) -> Result<Vec<u8>>;
}

/// Fetches `http(s)` endpoints over the wrapped client and reads anything
/// else as a local file, which is handy for replaying captured payloads.
pub struct HttpFeedSource<C> {
    client: C,
}

impl<C: HttpClient> HttpFeedSource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for HttpFeedSource<C> {
    #[tracing::instrument(skip_all, fields(source = %endpoint.url))]
    async fn fetch(&self, endpoint: &FeedEndpoint) -> Result<Vec<u8>> {
        if endpoint.url.starts_with("http") {
            fetch_bytes(&self.client, &endpoint.url).await
        } else {
            tokio::fs::read(&endpoint.url)
                .await
                .with_context(|| format!("reading {}", endpoint.url))
        }
    }
}
