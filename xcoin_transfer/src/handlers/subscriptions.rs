use actix_web::{Error, HttpResponse, get, http::StatusCode, put, web};
use common::{Plan, SessionUser};
use serde::Deserialize;
use serde_json::json;

use super::json_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlanData {
    pub plan: Option<String>,
}

#[get("")]
pub async fn get_subscription(
    session: SessionUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let subscription = app_state
        .db
        .get_subscription(&session.id)
        .await
        .map_err(|e| {
            log::error!("Failed to get subscription of {}: {:#}", session.id, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Subscription not found"))?;

    Ok(HttpResponse::Ok().json(subscription))
}

#[put("/plan")]
pub async fn update_plan(
    session: SessionUser,
    data: web::Json<PlanData>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let plan = match data.plan.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("free") => Plan::Free,
        Some("standard") => Plan::Standard,
        Some("premium") => Plan::Premium,
        _ => {
            return Err(json_error(
                StatusCode::BAD_REQUEST,
                "Plan must be one of 'free', 'standard' or 'premium'.",
            ));
        }
    };

    let updated = app_state
        .db
        .update_plan(&session.id, plan)
        .await
        .map_err(|e| {
            log::error!("Failed to update plan of {}: {:#}", session.id, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?;
    if !updated {
        return Err(json_error(StatusCode::NOT_FOUND, "Subscription not found"));
    }

    log::info!("User {} switched to {:?} plan", session.email, plan);
    Ok(HttpResponse::Ok().json(json!({ "message": "Plan updated", "plan": plan })))
}
