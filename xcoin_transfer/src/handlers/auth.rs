use std::collections::BTreeMap;

use actix_jwt_auth_middleware::TokenSigner;
use actix_web::{
    Error, HttpRequest, HttpResponse, HttpResponseBuilder, cookie::Cookie, get,
    http::StatusCode, post, web,
};
use common::{LoginAttempt, LoginStatus, PendingUser, Role, SessionUser, User, normalize_email};
use jwt_compact::alg::Ed25519;
use serde::Deserialize;
use serde_json::json;

use super::json_error;
use crate::state::AppState;

const ACCESS_COOKIE: &str = "access_token";
const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterData {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub dob: Option<String>,
    pub gender: Option<String>,
    pub occupation: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[post("/api/auth/register")]
pub async fn register(
    data: web::Json<RegisterData>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let data = data.into_inner();
    let fields = [
        ("fullName", &data.full_name),
        ("email", &data.email),
        ("password", &data.password),
        ("dob", &data.dob),
        ("gender", &data.gender),
        ("occupation", &data.occupation),
        ("country", &data.country),
    ];
    let errors: BTreeMap<&str, String> = fields
        .iter()
        .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| (*name, format!("{} is required", name)))
        .collect();
    if !errors.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({ "errors": errors })));
    }

    let field = |value: &Option<String>| value.clone().unwrap_or_default();
    let email = normalize_email(&field(&data.email));

    let existing = app_state.db.get_user_by_email(&email).await.map_err(|e| {
        log::error!("Failed to look up {}: {:#}", email, e);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    })?;
    if existing.is_some() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Email already registered"));
    }

    let pending = PendingUser::new(
        &field(&data.full_name),
        &email,
        &field(&data.password),
        &field(&data.dob),
        &field(&data.gender),
        &field(&data.occupation),
        &field(&data.country),
    )
    .map_err(|e| json_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let token = app_state.signup.issue(&pending).map_err(|e| {
        log::error!("Failed to issue verification token: {:#}", e);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    })?;

    log::info!(
        "Verification link for {}: {}/verify-email?token={}",
        pending.email,
        app_state.app_url,
        token
    );

    Ok(HttpResponse::Created().json(json!({
        "message": "Registration received. Check your email to verify your account."
    })))
}

#[get("/api/auth/verify-email")]
pub async fn verify_email(
    query: web::Query<VerifyEmailQuery>,
    app_state: web::Data<AppState>,
    cookie_signer: web::Data<TokenSigner<SessionUser, Ed25519>>,
) -> Result<HttpResponse, Error> {
    let token = query
        .token
        .as_deref()
        .ok_or_else(|| json_error(StatusCode::BAD_REQUEST, "Verification token is required"))?;

    let pending = app_state.signup.verify(token).map_err(|e| {
        log::warn!("Rejected verification token: {:#}", e);
        json_error(StatusCode::BAD_REQUEST, "Invalid or expired verification token")
    })?;

    let existing = app_state
        .db
        .get_user_by_email(&pending.email)
        .await
        .map_err(|e| {
            log::error!("Failed to look up {}: {:#}", pending.email, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?;
    if existing.is_some() {
        return Err(json_error(StatusCode::CONFLICT, "Email already verified"));
    }

    let user = User::from_pending(pending, Role::Client);
    app_state
        .db
        .create_user_with_subscription(&user)
        .await
        .map_err(|e| {
            log::error!("Failed to create user {}: {:#}", user.email, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?;
    log::info!("User {} verified their email", user.email);

    let mut response = HttpResponse::Ok();
    with_session(&mut response, &cookie_signer, &user.session())?;
    Ok(response.json(json!({ "message": "Email verified successfully", "user": user })))
}

#[post("/api/auth/login")]
pub async fn login(
    req: HttpRequest,
    login_data: web::Json<LoginData>,
    app_state: web::Data<AppState>,
    cookie_signer: web::Data<TokenSigner<SessionUser, Ed25519>>,
) -> Result<HttpResponse, Error> {
    let (Some(email), Some(password)) = (
        login_data.email.as_deref().filter(|e| !e.trim().is_empty()),
        login_data.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Email and password are required",
        ));
    };
    let email = normalize_email(email);
    let ip_address = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    let user = app_state
        .db
        .get_user_by_email(&email)
        .await
        .map_err(|e| {
            log::error!("Failed to look up {}: {:#}", email, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?
        .filter(|u| u.is_verified)
        .ok_or_else(|| {
            log::warn!("Login for unknown or unverified user {}", email);
            json_error(StatusCode::BAD_REQUEST, "Invalid email or password")
        })?;

    if let Err(err) = user.verify_password(password) {
        log::warn!("Invalid password for user {}: {:?}", email, err);
        record_attempt(&app_state, &email, &ip_address, LoginStatus::Failed).await;
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Invalid email or password",
        ));
    }

    record_attempt(&app_state, &email, &ip_address, LoginStatus::Success).await;
    if let Err(e) = app_state.db.touch_last_login(&user.id).await {
        log::error!("Failed to update last login of {}: {:#}", email, e);
    }

    let mut response = HttpResponse::Ok();
    with_session(&mut response, &cookie_signer, &user.session())?;
    Ok(response.json(json!({ "message": "Login successful", "user": user })))
}

#[get("/profile")]
pub async fn profile(
    session: SessionUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let user = app_state
        .db
        .get_user(&session.id)
        .await
        .map_err(|e| {
            log::error!("Failed to load profile of {}: {:#}", session.id, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })?
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "User not found"))?;

    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}

#[get("/verify")]
pub async fn verify_session(session: SessionUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "valid": true, "user": session }))
}

#[post("/logout")]
pub async fn logout(session: SessionUser) -> HttpResponse {
    log::info!("User {} logged out", session.email);
    let mut response = HttpResponse::Ok();
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        let mut cookie = Cookie::new(name, "");
        cookie.make_removal();
        response.cookie(cookie);
    }
    response.json(json!({ "message": "Logged out successfully" }))
}

fn with_session(
    response: &mut HttpResponseBuilder,
    cookie_signer: &TokenSigner<SessionUser, Ed25519>,
    session: &SessionUser,
) -> Result<(), Error> {
    let access_cookie = cookie_signer.create_access_cookie(session).map_err(|err| {
        log::error!("Failed to create access token: {:?}", err);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Token error")
    })?;

    let refresh_cookie = cookie_signer.create_refresh_cookie(session).map_err(|err| {
        log::error!("Failed to create refresh token: {:?}", err);
        json_error(StatusCode::INTERNAL_SERVER_ERROR, "Token error")
    })?;

    response.cookie(access_cookie).cookie(refresh_cookie);
    Ok(())
}

async fn record_attempt(app_state: &AppState, email: &str, ip_address: &str, status: LoginStatus) {
    let attempt = LoginAttempt::new(email, ip_address, status);
    if let Err(e) = app_state.db.save_login_attempt(&attempt).await {
        log::error!("Failed to record login attempt for {}: {:#}", email, e);
    }
}
