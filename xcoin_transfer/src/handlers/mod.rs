mod admin;
mod auth;
mod payments;
mod subscriptions;
mod transactions;

pub use admin::*;
pub use auth::*;
pub use payments::*;
pub use subscriptions::*;
pub use transactions::*;

use actix_web::{
    Error, HttpResponse, Responder, error::InternalError, get, http::StatusCode, web,
};
use common::{campay::ProviderError, payments::PaymentError};
use serde_json::json;

#[get("/api")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({ "message": "Welcome to the XCoin Transfer API" }))
}

/// Error with a `{"error": message}` body.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Error {
    let message = message.into();
    let response = HttpResponse::build(status).json(json!({ "error": message }));
    InternalError::from_response(message, response).into()
}

/// Maps a payment failure to its status. Provider rejections keep the
/// provider's status and raw body.
pub fn payment_error(err: PaymentError) -> Error {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match err {
        PaymentError::Provider(ProviderError::Rejected { body, .. }) => {
            log::error!("Payment provider rejected the request: {}", body);
            let response = HttpResponse::build(status).json(json!({
                "error": "Payment provider rejected the request",
                "details": body,
            }));
            InternalError::from_response("provider rejection", response).into()
        }
        PaymentError::Provider(e) => {
            log::error!("Payment provider error: {}", e);
            json_error(status, "Payment provider unavailable")
        }
        PaymentError::Internal(e) => {
            log::error!("Payment processing failed: {:#}", e);
            json_error(status, "Internal server error")
        }
        other => json_error(status, other.to_string()),
    }
}

/// JSON body errors answer 400 in the same shape as everything else.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        json_error(StatusCode::BAD_REQUEST, message)
    })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        json_error(StatusCode::BAD_REQUEST, message)
    })
}
