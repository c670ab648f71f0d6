use actix_web::{Error, HttpResponse, get, http::StatusCode, post, web};
use common::SessionUser;
use serde::Deserialize;

use super::{json_error, payment_error, transactions::status_filter};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TransferQuery {
    #[serde(default)]
    status: Option<String>,
}

#[get("/transfers")]
pub async fn get_transfers(
    query: web::Query<TransferQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let status = status_filter(query.status.as_deref())?;

    let transfers = app_state.transfers.list(status).await.map_err(|e| {
        log::error!("Failed to get transfers: {}", e);
        json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to get transfers. Please try again later.",
        )
    })?;

    Ok(HttpResponse::Ok().json(transfers))
}

#[post("/transfers/{id}/approve")]
pub async fn approve_transfer(
    admin: SessionUser,
    id: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let transfer = app_state
        .transfers
        .review(&id, true)
        .await
        .map_err(payment_error)?;
    log::info!("Transfer {} approved by {}", transfer.id, admin.email);
    Ok(HttpResponse::Ok().json(transfer))
}

#[post("/transfers/{id}/decline")]
pub async fn decline_transfer(
    admin: SessionUser,
    id: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let transfer = app_state
        .transfers
        .review(&id, false)
        .await
        .map_err(payment_error)?;
    log::info!("Transfer {} declined by {}", transfer.id, admin.email);
    Ok(HttpResponse::Ok().json(transfer))
}
