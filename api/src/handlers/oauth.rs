use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use common::{
    api::oauth::{self, OAuthProfile, OAuthProvider},
    auth::create_token,
    entities::user::PublicUser,
    error::{self, AddCode},
};

use crate::{
    config,
    repositories::user::UserRepository,
    service::{mail::MailerObject, oauth::OAuthService},
};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
}

fn callback_url(provider: OAuthProvider) -> String {
    format!(
        "{}/api/oauth/{}/callback",
        config::backend_url(),
        provider.as_str()
    )
}

fn frontend_redirect(path_and_query: String) -> HttpResponse {
    HttpResponse::Found()
        .append_header(("Location", format!("{}{}", config::frontend_url(), path_and_query)))
        .finish()
}

/// Finishes a provider login: token plus user as a frontend redirect.
/// Errors also land on the frontend, on the oauth-error page.
async fn complete_login(
    users: &UserRepository,
    mailer: &MailerObject,
    profile: OAuthProfile,
) -> error::Result<String> {
    let service = OAuthService::new(users.clone(), mailer.clone());
    let (user, _created) = service.resolve(&profile).await?;
    let token = create_token(&user)?;
    let user_json = serde_json::to_string(&PublicUser::from(user))?;
    Ok(format!(
        "/oauth-success?token={}&user={}",
        urlencoding::encode(&token),
        urlencoding::encode(&user_json)
    ))
}

fn error_redirect(err: &common::error::ServiceError) -> HttpResponse {
    log::error!("OAuth login failed: {}", err);
    frontend_redirect(format!(
        "/oauth-error?message={}",
        urlencoding::encode(&err.to_string())
    ))
}

#[get("/api/oauth/status")]
pub async fn status() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "google": config::google().is_some(),
        "github": config::github().is_some(),
        "frontendUrl": config::frontend_url(),
    }))
}

#[get("/api/oauth/google")]
pub async fn google_redirect() -> error::Result<HttpResponse> {
    let Some(cfg) = config::google() else {
        return Err(anyhow::anyhow!("Google OAuth ist nicht konfiguriert").code(503));
    };
    let url = format!(
        "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope={}",
        urlencoding::encode(&cfg.client_id),
        urlencoding::encode(&callback_url(OAuthProvider::Google)),
        urlencoding::encode("openid email profile"),
    );
    Ok(HttpResponse::Found()
        .append_header(("Location", url))
        .finish())
}

#[get("/api/oauth/google/callback")]
pub async fn google_callback(
    query: web::Query<CallbackQuery>,
    users: web::Data<UserRepository>,
    mailer: web::Data<MailerObject>,
) -> HttpResponse {
    let result = async {
        let Some(cfg) = config::google() else {
            return Err(anyhow::anyhow!("Google OAuth ist nicht konfiguriert").code(503));
        };
        let profile = oauth::fetch_google_profile(
            &query.code,
            &cfg.client_id,
            &cfg.client_secret,
            &callback_url(OAuthProvider::Google),
        )
        .await?;
        complete_login(&users, &mailer, profile).await
    }
    .await;

    match result {
        Ok(path) => frontend_redirect(path),
        Err(err) => error_redirect(&err),
    }
}

#[get("/api/oauth/github")]
pub async fn github_redirect() -> error::Result<HttpResponse> {
    let Some(cfg) = config::github() else {
        return Err(anyhow::anyhow!("GitHub OAuth ist nicht konfiguriert").code(503));
    };
    let url = format!(
        "https://github.com/login/oauth/authorize?client_id={}&redirect_uri={}&scope={}",
        urlencoding::encode(&cfg.client_id),
        urlencoding::encode(&callback_url(OAuthProvider::GitHub)),
        urlencoding::encode("user:email"),
    );
    Ok(HttpResponse::Found()
        .append_header(("Location", url))
        .finish())
}

#[get("/api/oauth/github/callback")]
pub async fn github_callback(
    query: web::Query<CallbackQuery>,
    users: web::Data<UserRepository>,
    mailer: web::Data<MailerObject>,
) -> HttpResponse {
    let result = async {
        let Some(cfg) = config::github() else {
            return Err(anyhow::anyhow!("GitHub OAuth ist nicht konfiguriert").code(503));
        };
        let profile =
            oauth::fetch_github_profile(&query.code, &cfg.client_id, &cfg.client_secret).await?;
        complete_login(&users, &mailer, profile).await
    }
    .await;

    match result {
        Ok(path) => frontend_redirect(path),
        Err(err) => error_redirect(&err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::repository::test_repository::TestRepository;

    use super::*;
    use crate::service::mail::TestMailer;

    fn profile(email: &str) -> OAuthProfile {
        OAuthProfile {
            provider: OAuthProvider::Google,
            provider_id: "g-123".to_string(),
            email: email.to_string(),
            name: Some("Max".to_string()),
            avatar: Some("https://example.com/a.png".to_string()),
        }
    }

    #[actix_web::test]
    async fn oauth_login_creates_account_with_welcome_mail() {
        std::env::set_var("JWT_SECRET", "test-secret");
        let users = UserRepository::new(Arc::new(TestRepository::new()));
        let mailer = Arc::new(TestMailer::new());
        let mailer_obj: MailerObject = mailer.clone();

        let path = complete_login(&users, &mailer_obj, profile("neu@example.com"))
            .await
            .unwrap();
        assert!(path.starts_with("/oauth-success?token="));
        assert!(path.contains("&user="));

        let user = users.find_by_email("neu@example.com").await.unwrap().unwrap();
        assert_eq!(user.google_id.as_deref(), Some("g-123"));
        assert!(user.is_email_verified);
        assert_eq!(mailer.sent_count(), 1);
    }

    #[actix_web::test]
    async fn oauth_login_backfills_existing_account() {
        std::env::set_var("JWT_SECRET", "test-secret");
        let users = UserRepository::new(Arc::new(TestRepository::new()));
        let mailer = Arc::new(TestMailer::new());
        let mailer_obj: MailerObject = mailer.clone();

        let existing = common::entities::user::User::empty("alt@example.com");
        users.create(&existing).await.unwrap();

        complete_login(&users, &mailer_obj, profile("alt@example.com"))
            .await
            .unwrap();

        let user = users.find_by_email("alt@example.com").await.unwrap().unwrap();
        assert_eq!(user.id, existing.id);
        assert_eq!(user.google_id.as_deref(), Some("g-123"));
        // No welcome mail for accounts that already existed.
        assert_eq!(mailer.sent_count(), 0);
    }

    #[actix_web::test]
    async fn welcome_mail_failure_does_not_break_the_login() {
        std::env::set_var("JWT_SECRET", "test-secret");
        let users = UserRepository::new(Arc::new(TestRepository::new()));
        let mailer = Arc::new(TestMailer::new());
        mailer.fail_address("neu@example.com");
        let mailer_obj: MailerObject = mailer.clone();

        let path = complete_login(&users, &mailer_obj, profile("neu@example.com"))
            .await
            .unwrap();
        assert!(path.starts_with("/oauth-success"));
        assert!(users.find_by_email("neu@example.com").await.unwrap().is_some());
    }
}
