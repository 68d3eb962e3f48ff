use async_trait::async_trait;
use std::time::Duration;

use crate::Result;

/// Fetches the body of a referenced article page. Used by the expansion
/// engine; failures are ordinary errors the caller catches per URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String>;
}
