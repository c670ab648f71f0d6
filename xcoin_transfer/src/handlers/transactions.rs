use actix_web::{Error, HttpResponse, get, http::StatusCode, post, web};
use common::{SessionUser, TransactionStatus};
use serde::Deserialize;
use serde_json::json;

use super::{json_error, payment_error};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertData {
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

/// Parses the optional `status` filter shared by the listing endpoints.
pub(crate) fn status_filter(status: Option<&str>) -> Result<Option<TransactionStatus>, Error> {
    match status {
        None | Some("") => Ok(None),
        Some(status) => TransactionStatus::parse(status).map(Some).ok_or_else(|| {
            json_error(
                StatusCode::BAD_REQUEST,
                "Transaction status must be either 'pending', 'successful' or 'failed'.",
            )
        }),
    }
}

#[get("")]
pub async fn get_transactions(
    session: SessionUser,
    query: web::Query<TransactionQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let status = status_filter(query.status.as_deref())?;

    let transactions = app_state
        .db
        .get_user_transactions(&session.id, status)
        .await
        .map_err(|e| {
            log::error!("Failed to get transactions: {:#}", e);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get transactions. Please try again later.",
            )
        })?;

    Ok(HttpResponse::Ok().json(transactions))
}

#[get("/{id}")]
pub async fn get_transaction(
    session: SessionUser,
    id: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let transaction = app_state
        .db
        .get_user_transaction(&id, &session.id)
        .await
        .map_err(|e| {
            log::error!("Failed to get transaction {}: {:#}", id, e);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get transaction. Please try again later.",
            )
        })?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Transaction not found"))?;

    Ok(HttpResponse::Ok().json(transaction))
}

#[post("/convert")]
pub async fn convert(
    session: SessionUser,
    data: web::Json<ConvertData>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (Some(amount), Some(currency)) = (data.amount, data.currency.as_deref()) else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Amount and currency are required",
        ));
    };

    let rates = match app_state.rates.rates().await {
        Ok(report) => report.rates.xcoin,
        Err(e) => e.fallback.rates.xcoin,
    };

    let transaction = app_state
        .transfers
        .request_conversion(&session.id, amount, currency, &rates)
        .await
        .map_err(payment_error)?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Transfer request submitted",
        "transaction": transaction,
    })))
}
