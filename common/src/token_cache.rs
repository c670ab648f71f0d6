use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::cache::Cache;
use crate::campay::{PaymentProvider, ProviderError};

pub const TOKEN_KEY: &str = "campay_token";
pub const TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Provider bearer token, cached under [`TOKEN_KEY`].
pub struct TokenCache {
    cache: Arc<dyn Cache>,
    provider: Arc<dyn PaymentProvider>,
    refresh: Mutex<()>,
}

impl TokenCache {
    pub fn new(cache: Arc<dyn Cache>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self {
            cache,
            provider,
            refresh: Mutex::new(()),
        }
    }

    /// Returns the cached token, fetching and caching a new one on a miss.
    pub async fn get_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.cached().await {
            log::debug!("Returning cached provider token");
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // another caller may have refreshed while we waited
        if let Some(token) = self.cached().await {
            return Ok(token);
        }

        log::info!("Fetching new provider token");
        let token = self.provider.request_token().await?;
        if let Err(e) = self.cache.set_ex(TOKEN_KEY, &token, TOKEN_TTL).await {
            log::error!("Failed to cache provider token: {:#}", e);
        }
        Ok(token)
    }

    pub async fn invalidate(&self) {
        if let Err(e) = self.cache.delete(TOKEN_KEY).await {
            log::error!("Failed to drop cached provider token: {:#}", e);
        }
    }

    async fn cached(&self) -> Option<String> {
        match self.cache.get(TOKEN_KEY).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                log::warn!("Token cache read failed, falling back to provider: {:#}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::testing::MockProvider;

    #[tokio::test]
    async fn cached_token_skips_the_provider() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set_ex(TOKEN_KEY, "cached-token", TOKEN_TTL)
            .await
            .unwrap();
        let provider = Arc::new(MockProvider::default());
        let tokens = TokenCache::new(cache, provider.clone());

        assert_eq!(tokens.get_token().await.unwrap(), "cached-token");
        assert_eq!(provider.token_calls(), 0);
    }

    #[tokio::test]
    async fn miss_fetches_once_and_caches() {
        let cache = Arc::new(MemoryCache::new());
        let provider = Arc::new(MockProvider::default());
        let tokens = TokenCache::new(cache.clone(), provider.clone());

        let first = tokens.get_token().await.unwrap();
        let second = tokens.get_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.token_calls(), 1);
        assert_eq!(cache.get(TOKEN_KEY).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_request() {
        let cache = Arc::new(MemoryCache::new());
        let provider = Arc::new(MockProvider::default());
        let tokens = Arc::new(TokenCache::new(cache, provider.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokens = tokens.clone();
                tokio::spawn(async move { tokens.get_token().await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(provider.token_calls(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refresh() {
        let cache = Arc::new(MemoryCache::new());
        let provider = Arc::new(MockProvider::default());
        let tokens = TokenCache::new(cache, provider.clone());

        tokens.get_token().await.unwrap();
        tokens.invalidate().await;
        tokens.get_token().await.unwrap();

        assert_eq!(provider.token_calls(), 2);
    }

    #[tokio::test]
    async fn provider_failure_surfaces() {
        let cache = Arc::new(MemoryCache::new());
        let provider = Arc::new(MockProvider::failing_token());
        let tokens = TokenCache::new(cache, provider);

        let err = tokens.get_token().await.unwrap_err();
        assert_eq!(err.status(), 500);
    }
}
