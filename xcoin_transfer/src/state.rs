use std::sync::Arc;

use common::{
    Database,
    cache::Cache,
    campay::PaymentProvider,
    payments::PaymentService,
    rates::{RateCache, RateSource},
    signup::SignupTokens,
    token_cache::TokenCache,
    transfers::TransferService,
    webhook::WebhookVerifier,
};

pub struct AppState {
    pub db: Database,
    pub cache: Arc<dyn Cache>,
    pub payments: PaymentService,
    pub transfers: TransferService,
    pub rates: RateCache,
    pub webhook: WebhookVerifier,
    pub signup: SignupTokens,
    pub app_url: String,
}

impl AppState {
    pub fn new(
        db: Database,
        cache: Arc<dyn Cache>,
        provider: Arc<dyn PaymentProvider>,
        fx: Arc<dyn RateSource>,
        jwt_secret: &str,
        webhook_key: &str,
        app_url: &str,
    ) -> Self {
        let tokens = TokenCache::new(cache.clone(), provider.clone());
        AppState {
            payments: PaymentService::new(db.clone(), provider, tokens),
            transfers: TransferService::new(db.clone()),
            rates: RateCache::new(cache.clone(), fx),
            webhook: WebhookVerifier::new(webhook_key),
            signup: SignupTokens::new(jwt_secret),
            app_url: app_url.trim_end_matches('/').to_string(),
            db,
            cache,
        }
    }

    /// Releases the cache connection and the database pool.
    pub async fn close(&self) {
        if let Err(e) = self.cache.close().await {
            log::error!("Failed to close cache: {:#}", e);
        }
        self.db.close().await;
        log::info!("App state closed");
    }
}
