use actix_jwt_auth_middleware::{Authority, TokenSigner, use_jwt::UseJWTOnApp};
use actix_state_guards::UseStateGuardOnScope;
use actix_web::{
    App, HttpResponse,
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    error::InternalError,
    http::StatusCode,
    middleware::Logger,
    web,
};
use common::{Role, SessionUser};
use ed25519_compact::{PublicKey, SecretKey};
use jwt_compact::alg::Ed25519;
use serde_json::json;

use crate::state::AppState;

pub mod config;
pub mod handlers;
pub mod state;

/// The full route tree: public auth and webhook routes, the session-protected
/// `/api` scope and the admin scope inside it.
pub fn build_app(
    data: web::Data<AppState>,
    public_key: PublicKey,
    secret_key: SecretKey,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let authority = Authority::<SessionUser, Ed25519, _, _>::new()
        .refresh_authorizer(|| async move { Ok(()) })
        .token_signer(Some(
            TokenSigner::new()
                .signing_key(secret_key)
                .algorithm(Ed25519)
                .build()
                .expect("Failed to generate TokenSigner"),
        ))
        .verifying_key(public_key)
        .build()
        .expect("Failed to create Authority");

    App::new()
        .app_data(data)
        .app_data(handlers::json_config())
        .app_data(handlers::query_config())
        .wrap(Logger::new("%a %t %r %s  %{Referer}i %Dms"))
        .service(handlers::index)
        .service(handlers::register)
        .service(handlers::verify_email)
        .service(handlers::login)
        .service(handlers::payment_callback)
        .use_jwt(
            authority,
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .service(handlers::profile)
                        .service(handlers::verify_session)
                        .service(handlers::logout),
                )
                .service(
                    web::scope("/transactions")
                        .service(handlers::get_transactions)
                        .service(handlers::convert)
                        .service(handlers::get_transaction),
                )
                .service(
                    web::scope("/subscriptions")
                        .service(handlers::get_subscription)
                        .service(handlers::update_plan),
                )
                .service(
                    web::scope("/payments")
                        .service(handlers::get_token)
                        .service(handlers::payment_link)
                        .service(handlers::pay)
                        .service(handlers::withdraw)
                        .service(handlers::payment_status)
                        .service(handlers::exchange_rates)
                        .service(handlers::get_payment),
                )
                .use_state_guard(
                    |user: SessionUser| async move {
                        if user.role == Role::Admin {
                            Ok(())
                        } else {
                            Err(InternalError::from_response(
                                "You are not an Admin",
                                HttpResponse::build(StatusCode::UNAUTHORIZED)
                                    .json(json!({ "error": "You are not an Admin" })),
                            ))
                        }
                    },
                    web::scope("/admin")
                        .service(handlers::get_transfers)
                        .service(handlers::approve_transfer)
                        .service(handlers::decline_transfer),
                ),
        )
}
