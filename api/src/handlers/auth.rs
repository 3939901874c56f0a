use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde_json::json;

use common::{entities::user::PublicUser, error};

use crate::{
    extractors::{client_ip, AuthUser},
    rate_limit::RateLimiter,
    repositories::user::UserRepository,
    service::{
        auth::{AuthService, LoginOutcome, LoginRequest},
        mail::MailerObject,
    },
};

use super::ApiResponse;

#[post("/api/auth/login")]
pub async fn login(
    req: HttpRequest,
    data: web::Json<LoginRequest>,
    users: web::Data<UserRepository>,
    mailer: web::Data<MailerObject>,
    limiter: web::Data<RateLimiter>,
) -> error::Result<HttpResponse> {
    let ip = client_ip(&req).unwrap_or_else(|| "unknown".to_string());
    let service = AuthService::new(
        users.get_ref().clone(),
        mailer.get_ref().clone(),
        limiter.get_ref().clone(),
    );

    let response = match service.login(&data, &ip).await? {
        LoginOutcome::RequiresConfirmation { email } => HttpResponse::Ok().json(json!({
            "success": true,
            "requiresConfirmation": true,
            "email": email,
            "message": "Kein Konto gefunden. Soll ein neues Konto erstellt werden?",
        })),
        LoginOutcome::AccountCreated { email, email_sent } => {
            let body = json!({
                "success": email_sent,
                "accountCreated": true,
                "emailSent": email_sent,
                "email": email,
                "message": if email_sent {
                    "Konto erstellt. Die Zugangsdaten wurden per E-Mail versendet."
                } else {
                    "Konto erstellt, aber die E-Mail konnte nicht versendet werden."
                },
            });
            if email_sent {
                HttpResponse::Ok().json(body)
            } else {
                HttpResponse::InternalServerError().json(body)
            }
        }
        LoginOutcome::LoggedIn { token, user } => HttpResponse::Ok().json(json!({
            "success": true,
            "token": token,
            "user": user,
            "message": "Login erfolgreich",
        })),
    };
    Ok(response)
}

#[get("/api/auth/profile")]
pub async fn profile(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(PublicUser::from(user.0)))
}

#[post("/api/auth/logout")]
pub async fn logout(_user: AuthUser) -> HttpResponse {
    // Tokens are stateless, the client just drops its copy.
    HttpResponse::Ok().json(ApiResponse::message("Erfolgreich abgemeldet"))
}

#[cfg(test)]
mod tests {
    use actix_web::test::{call_service, init_service, read_body_json, TestRequest};
    use serde_json::Value;

    use common::entities::user::Role;

    use super::*;
    use crate::{create_app, test_state};

    #[actix_web::test]
    async fn unknown_email_asks_for_confirmation() {
        let (state, _mailer) = test_state();
        let app = init_service(create_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "neu@example.com", "password": "pw"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["requiresConfirmation"], true);

        // No account yet.
        assert!(state
            .users
            .find_by_email("neu@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[actix_web::test]
    async fn confirmed_flag_provisions_account_and_mails_credentials() {
        let (state, mailer) = test_state();
        let app = init_service(create_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({
                "email": "neu@example.com",
                "password": "egal",
                "confirmAccountCreation": true,
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["accountCreated"], true);
        assert_eq!(body["emailSent"], true);

        let user = state
            .users
            .find_by_email("neu@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role, Role::Customer);
        assert!(!user.password.is_empty());

        let letters = mailer.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].email, "neu@example.com");
        assert!(letters[0].html.contains("Passwort"));
    }

    #[actix_web::test]
    async fn provisioned_customer_gets_the_oldest_admin() {
        let (state, _mailer) = test_state();
        let mut first = common::entities::user::User::empty("first@example.com");
        first.role = Role::Admin;
        first.created_at = chrono::Utc::now() - chrono::Duration::days(10);
        state.users.create(&first).await.unwrap();
        let mut second = common::entities::user::User::empty("second@example.com");
        second.role = Role::Admin;
        state.users.create(&second).await.unwrap();

        let app = init_service(create_app(state.clone())).await;
        let req = TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({
                "email": "neu@example.com",
                "password": "egal",
                "confirmAccountCreation": true,
            }))
            .to_request();
        call_service(&app, req).await;

        let user = state
            .users
            .find_by_email("neu@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.assigned_admin, Some(first.id));
    }

    #[actix_web::test]
    async fn wrong_password_is_rejected_and_profile_needs_token() {
        let (state, _mailer) = test_state();
        let salt = "salz";
        let mut user = common::entities::user::User::empty("kunde@example.com");
        user.password = crate::service::auth::AuthService::hash_password("richtig", salt);
        user.salt = salt.to_string();
        state.users.create(&user).await.unwrap();

        let app = init_service(create_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "kunde@example.com", "password": "falsch"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = TestRequest::get().uri("/api/auth/profile").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn successful_login_token_opens_the_profile() {
        let (state, _mailer) = test_state();
        let salt = "salz";
        let mut user = common::entities::user::User::empty("kunde@example.com");
        user.password = crate::service::auth::AuthService::hash_password("geheim", salt);
        user.salt = salt.to_string();
        state.users.create(&user).await.unwrap();

        let app = init_service(create_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "kunde@example.com", "password": "geheim"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = read_body_json(resp).await;
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(body["user"]["email"], "kunde@example.com");
        assert!(body["user"]["password"].is_null());

        let req = TestRequest::get()
            .uri("/api/auth/profile")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["data"]["email"], "kunde@example.com");
    }

    #[actix_web::test]
    async fn eleventh_login_attempt_is_throttled() {
        let (state, _mailer) = test_state();
        let app = init_service(create_app(state.clone())).await;

        for _ in 0..10 {
            let req = TestRequest::post()
                .uri("/api/auth/login")
                .peer_addr("9.9.9.9:443".parse().unwrap())
                .set_json(json!({"email": "wer@example.com", "password": "pw"}))
                .to_request();
            call_service(&app, req).await;
        }
        let req = TestRequest::post()
            .uri("/api/auth/login")
            .peer_addr("9.9.9.9:443".parse().unwrap())
            .set_json(json!({"email": "wer@example.com", "password": "pw"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 429);

        state.limiter.reset();
        let req = TestRequest::post()
            .uri("/api/auth/login")
            .peer_addr("9.9.9.9:443".parse().unwrap())
            .set_json(json!({"email": "wer@example.com", "password": "pw"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn fourth_account_creation_from_one_ip_is_blocked() {
        let (state, _mailer) = test_state();
        let app = init_service(create_app(state.clone())).await;

        for i in 0..3 {
            let req = TestRequest::post()
                .uri("/api/auth/login")
                .peer_addr("10.0.0.1:443".parse().unwrap())
                .set_json(json!({
                    "email": format!("neu{}@example.com", i),
                    "password": "egal",
                    "confirmAccountCreation": true,
                }))
                .to_request();
            let resp = call_service(&app, req).await;
            assert_eq!(resp.status(), 200);
        }

        let req = TestRequest::post()
            .uri("/api/auth/login")
            .peer_addr("10.0.0.1:443".parse().unwrap())
            .set_json(json!({
                "email": "neu3@example.com",
                "password": "egal",
                "confirmAccountCreation": true,
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 429);
    }
}
