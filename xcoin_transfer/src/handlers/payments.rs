use actix_web::{Error, HttpResponse, get, http::StatusCode, post, web};
use common::{
    SessionUser,
    campay::CollectResponse,
    payments::{CollectInput, PaymentError, PaymentLinkInput, WithdrawInput},
    webhook::CallbackQuery,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{json_error, payment_error};
use crate::state::AppState;

/// Amounts arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    fn value(&self) -> Option<f64> {
        match self {
            Amount::Number(n) => Some(*n),
            Amount::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Phone numbers too: `237670000000` or `"237670000000"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Phone {
    Number(u64),
    Text(String),
}

impl Phone {
    fn into_string(self) -> String {
        match self {
            Phone::Number(n) => n.to_string(),
            Phone::Text(s) => s,
        }
    }
}

fn require_amount(amount: Option<&Amount>) -> Result<f64, Error> {
    amount
        .and_then(Amount::value)
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Invalid amount."))
}

#[derive(Debug, Deserialize)]
pub struct PayData {
    pub amount: Option<Amount>,
    pub from: Option<Phone>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PayResponse {
    #[serde(flatten)]
    pub provider: CollectResponse,
    /// Local transaction id, polled later through `/status/{reference}`.
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentLinkData {
    pub amount: Option<Amount>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawData {
    pub amount: Option<Amount>,
    pub to: Option<Phone>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "transactionId")]
    pub transaction_id: Option<String>,
}

#[post("/token")]
pub async fn get_token(
    _session: SessionUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let token = app_state
        .payments
        .tokens()
        .get_token()
        .await
        .map_err(|e| payment_error(PaymentError::Provider(e)))?;
    Ok(HttpResponse::Ok().json(json!({ "token": token })))
}

#[post("/pay")]
pub async fn pay(
    session: SessionUser,
    data: web::Json<PayData>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let data = data.into_inner();
    let input = CollectInput {
        amount: require_amount(data.amount.as_ref())?,
        phone: data.from.map(Phone::into_string).unwrap_or_default(),
        description: data.description.unwrap_or_default(),
    };

    let outcome = app_state
        .payments
        .collect(&session.id, input)
        .await
        .map_err(payment_error)?;

    Ok(HttpResponse::Ok().json(PayResponse {
        provider: outcome.provider,
        id: outcome.transaction.id,
    }))
}

#[post("/payment-link")]
pub async fn payment_link(
    session: SessionUser,
    data: web::Json<PaymentLinkData>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let data = data.into_inner();
    let amount = match &data.amount {
        Some(amount) => Some(require_amount(Some(amount))?),
        None => None,
    };
    let input = PaymentLinkInput {
        amount,
        currency: data.currency,
        description: data.description,
        redirect_url: data.redirect_url,
    };

    let (link, transaction) = app_state
        .payments
        .payment_link(&session.id, input)
        .await
        .map_err(payment_error)?;

    Ok(HttpResponse::Ok().json(json!({ "link": link, "transaction": transaction })))
}

#[post("/campay/withdraw")]
pub async fn withdraw(
    session: SessionUser,
    data: web::Json<WithdrawData>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let data = data.into_inner();
    let input = WithdrawInput {
        amount: require_amount(data.amount.as_ref())?,
        to: data.to.map(Phone::into_string).unwrap_or_default(),
        description: data.description.unwrap_or_default(),
    };

    let outcome = app_state
        .payments
        .withdraw(&session.id, input)
        .await
        .map_err(payment_error)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Withdrawal initiated",
        "data": outcome,
    })))
}

#[get("/status/{reference}")]
pub async fn payment_status(
    session: SessionUser,
    reference: web::Path<String>,
    query: web::Query<StatusQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let transaction_id = query
        .transaction_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "transactionId is required"))?;

    let status = app_state
        .payments
        .check_status(&session.id, transaction_id, &reference)
        .await
        .map_err(payment_error)?;

    Ok(HttpResponse::Ok().json(status))
}

#[get("/api/payments/callback")]
pub async fn payment_callback(
    query: web::Query<CallbackQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let notification = app_state
        .webhook
        .verify(query.into_inner())
        .map_err(|e| {
            log::warn!("Rejected payment callback: {}", e);
            let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::BAD_REQUEST);
            json_error(status, e.to_string())
        })?;

    log::info!(
        "Payment callback: {} {} {} for reference {}",
        notification.status,
        notification.amount,
        notification.currency,
        notification.reference
    );
    log::debug!("Callback payload: {:?}", notification);

    Ok(HttpResponse::Ok().json(json!({ "message": "Webhook received successfully" })))
}

#[get("/data/rates")]
pub async fn exchange_rates(
    _session: SessionUser,
    app_state: web::Data<AppState>,
) -> HttpResponse {
    match app_state.rates.rates().await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to fetch exchange rates",
            "rates": e.fallback.rates,
            "lastUpdated": e.fallback.last_updated,
        })),
    }
}

#[get("/{id}")]
pub async fn get_payment(
    session: SessionUser,
    id: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let transaction = app_state
        .db
        .get_user_transaction(&id, &session.id)
        .await
        .map_err(|e| {
            log::error!("Failed to get payment {}: {:#}", id, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Payment not found"))?;

    Ok(HttpResponse::Ok().json(transaction))
}
