use std::sync::Arc;

use anyhow::Context;
use common::{
    Database,
    cache::{Cache, MemoryCache, RedisCache},
    campay::CampayClient,
    rates::ExchangeRateApi,
};

use crate::state::AppState;

pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub campay_base_url: String,
    pub campay_username: String,
    pub campay_password: String,
    pub campay_webhook_key: String,
    pub redis_url: Option<String>,
    pub exchange_api_url: String,
    pub app_url: String,
    pub bind_addr: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let campay_base_url =
            std::env::var("CAMPAY_BASE_URL").context("CAMPAY_BASE_URL must be set")?;

        let campay_username =
            std::env::var("CAMPAY_APP_USERNAME").context("CAMPAY_APP_USERNAME must be set")?;

        let campay_password =
            std::env::var("CAMPAY_APP_PASSWORD").context("CAMPAY_APP_PASSWORD must be set")?;

        let campay_webhook_key =
            std::env::var("CAMPAY_WEBHOOK_KEY").context("CAMPAY_WEBHOOK_KEY must be set")?;

        let redis_url = std::env::var("REDIS_URL").ok().filter(|u| !u.is_empty());

        let exchange_api_url = std::env::var("EXCHANGE_API_URL")
            .unwrap_or_else(|_| "https://api.exchangerate-api.com".to_string());

        let app_url =
            std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = match std::env::var("PORT") {
            Ok(port) => port.parse().context("PORT must be a number")?,
            Err(_) => 3000,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            campay_base_url,
            campay_username,
            campay_password,
            campay_webhook_key,
            redis_url,
            exchange_api_url,
            app_url,
            bind_addr,
            port,
        })
    }

    pub async fn create_app_state(&self) -> anyhow::Result<AppState> {
        let db = Database::new(&self.database_url)
            .await
            .context("Failed to initialize database")?;
        log::info!("Database initialized successfully!");

        let cache: Arc<dyn Cache> = match &self.redis_url {
            Some(url) => Arc::new(RedisCache::connect(url).await?),
            None => {
                log::warn!("REDIS_URL not set, caching in process memory");
                Arc::new(MemoryCache::new())
            }
        };

        let provider = Arc::new(CampayClient::new(
            &self.campay_base_url,
            &self.campay_username,
            &self.campay_password,
        ));
        let fx = Arc::new(ExchangeRateApi::new(&self.exchange_api_url));

        Ok(AppState::new(
            db,
            cache,
            provider,
            fx,
            &self.jwt_secret,
            &self.campay_webhook_key,
            &self.app_url,
        ))
    }
}
