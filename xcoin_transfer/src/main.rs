use actix_web::{HttpServer, web};
use dotenv::dotenv;
use ed25519_compact::KeyPair;
use pretty_env_logger::env_logger::{Builder, Env};

use xcoin_transfer::{build_app, config::AppConfig};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let logger_env = Env::default().default_filter_or("debug");
    let mut logger_builder = Builder::from_env(logger_env);
    logger_builder.init();

    if cli::run_cli().await {
        return Ok(());
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Application initialization failed: {:#}", e);
        std::io::Error::other(e.to_string())
    })?;

    let state = config.create_app_state().await.map_err(|e| {
        log::error!("Application initialization failed: {:#}", e);
        std::io::Error::other(e.to_string())
    })?;

    log::info!("App state initialized successfully");

    let data = web::Data::new(state);

    // Session keys live for the process; a restart logs everyone out.
    let KeyPair {
        pk: public_key,
        sk: secret_key,
    } = KeyPair::generate();

    let server_data = data.clone();
    let server = HttpServer::new(move || {
        build_app(server_data.clone(), public_key, secret_key.clone())
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run();

    log::info!("Listening on {}:{}", config.bind_addr, config.port);
    let result = server.await;

    data.close().await;
    result
}
