use std::env;
use std::sync::Arc;

use actix_web::HttpServer;
use dotenv::dotenv;

use api::{
    create_app,
    service::{auth::AuthService, mail::SmtpMailer},
    AppState,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    if let Err(message) = api::config::validate() {
        log::error!("{}", message);
        std::process::exit(1);
    }

    let mongo_uri = env::var("MONGOURI").unwrap();
    let state = AppState::mongo(&mongo_uri, Arc::new(SmtpMailer)).await;

    let auth = AuthService::new(
        state.users.clone(),
        state.mailer.clone(),
        state.limiter.clone(),
    );
    if let Err(err) = auth.ensure_admin_account().await {
        log::warn!("Admin bootstrap failed: {}", err);
    }

    let port = env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(5000u16);

    log::info!("Server läuft auf Port {}", port);
    HttpServer::new(move || create_app(state.clone()))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
