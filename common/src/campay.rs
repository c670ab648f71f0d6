//! Client for the Campay mobile-money API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status. `body` is its raw payload.
    #[error("payment provider returned {status}: {body}")]
    Rejected { status: u16, body: Value },
    #[error("payment provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ProviderError {
    pub fn status(&self) -> u16 {
        match self {
            ProviderError::Rejected { status, .. } => *status,
            ProviderError::Transport(_) => 500,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Rejected { status: 401, .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectRequest {
    pub amount: String,
    pub from: String,
    pub description: String,
    pub currency: String,
    pub external_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectResponse {
    pub reference: String,
    #[serde(default)]
    pub ussd_code: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentLinkRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub currency: String,
    pub description: String,
    pub external_reference: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentLinkResponse {
    pub link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawRequest {
    pub amount: u64,
    pub to: String,
    pub description: String,
    pub external_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawResponse {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderTransaction {
    pub reference: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub operator_reference: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

/// Operations the backend needs from a mobile-money provider.
/// Every call except `request_token` is authenticated with a bearer token.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn request_token(&self) -> Result<String, ProviderError>;

    async fn collect(
        &self,
        token: &str,
        request: &CollectRequest,
    ) -> Result<CollectResponse, ProviderError>;

    async fn payment_link(
        &self,
        token: &str,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLinkResponse, ProviderError>;

    async fn withdraw(
        &self,
        token: &str,
        request: &WithdrawRequest,
    ) -> Result<WithdrawResponse, ProviderError>;

    async fn transaction_status(
        &self,
        token: &str,
        reference: &str,
    ) -> Result<ProviderTransaction, ProviderError>;
}

pub struct CampayClient {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

impl CampayClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn post<B, R>(&self, path: &str, token: Option<&str>, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let url = self.url(path);
        log::debug!("POST {}", url);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = token {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Token {}", token));
        }
        Self::read(request.send().await?).await
    }

    async fn read<R>(response: reqwest::Response) -> Result<R, ProviderError>
    where
        R: serde::de::DeserializeOwned,
    {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            log::warn!("Campay rejected request with {}: {}", status, body);
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentProvider for CampayClient {
    async fn request_token(&self) -> Result<String, ProviderError> {
        let body = TokenRequest {
            username: &self.username,
            password: &self.password,
        };
        let response: TokenResponse = self.post("token/", None, &body).await?;
        Ok(response.token)
    }

    async fn collect(
        &self,
        token: &str,
        request: &CollectRequest,
    ) -> Result<CollectResponse, ProviderError> {
        self.post("collect/", Some(token), request).await
    }

    async fn payment_link(
        &self,
        token: &str,
        request: &PaymentLinkRequest,
    ) -> Result<PaymentLinkResponse, ProviderError> {
        self.post("get_payment_link/", Some(token), request).await
    }

    async fn withdraw(
        &self,
        token: &str,
        request: &WithdrawRequest,
    ) -> Result<WithdrawResponse, ProviderError> {
        self.post("withdraw/", Some(token), request).await
    }

    async fn transaction_status(
        &self,
        token: &str,
        reference: &str,
    ) -> Result<ProviderTransaction, ProviderError> {
        let url = self.url(&format!("transaction/{}/", reference));
        log::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", token))
            .send()
            .await?;
        Self::read(response).await
    }
}
