use actix_web::{get, post, put, web, HttpRequest, HttpResponse};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;

use common::{
    entities::{contact::ContactStatus, newsletter::SubscriberSource},
    error::{self, AddCode},
};

use crate::{
    extractors::{client_ip, require_admin, user_agent, AuthUser},
    rate_limit::RateLimiter,
    repositories::{
        contact::ContactRepository,
        newsletter::{SendLogRepository, SubscriberRepository, TemplateRepository},
    },
    service::{
        contact::{ContactRequest, ContactService},
        mail::MailerObject,
        newsletter::NewsletterService,
    },
};

use super::ApiResponse;

fn service(
    contacts: &web::Data<ContactRepository>,
    mailer: &web::Data<MailerObject>,
    limiter: &web::Data<RateLimiter>,
) -> ContactService {
    ContactService::new(
        contacts.get_ref().clone(),
        mailer.get_ref().clone(),
        limiter.get_ref().clone(),
    )
}

#[post("/api/contact")]
pub async fn submit(
    req: HttpRequest,
    data: web::Json<ContactRequest>,
    contacts: web::Data<ContactRepository>,
    mailer: web::Data<MailerObject>,
    limiter: web::Data<RateLimiter>,
) -> error::Result<HttpResponse> {
    let contact = service(&contacts, &mailer, &limiter)
        .submit(data.into_inner(), client_ip(&req), user_agent(&req))
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok_with_message(
        "Vielen Dank für Ihre Anfrage! Wir melden uns innerhalb von 24 Stunden.",
        json!({ "id": contact.id.to_hex() }),
    )))
}

#[derive(Debug, Deserialize)]
pub struct NewsletterSignup {
    pub email: String,
    pub name: Option<String>,
}

/// Newsletter opt-in from the contact page. Records the contact and kicks
/// off the regular double-opt-in flow.
#[post("/api/contact/newsletter")]
pub async fn newsletter_signup(
    req: HttpRequest,
    data: web::Json<NewsletterSignup>,
    contacts: web::Data<ContactRepository>,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
    send_logs: web::Data<SendLogRepository>,
    mailer: web::Data<MailerObject>,
    limiter: web::Data<RateLimiter>,
) -> error::Result<HttpResponse> {
    let data = data.into_inner();
    service(&contacts, &mailer, &limiter)
        .newsletter_signup(
            data.name.clone(),
            &data.email,
            client_ip(&req),
            user_agent(&req),
        )
        .await?;

    NewsletterService::new(
        subscribers.get_ref().clone(),
        templates.get_ref().clone(),
        send_logs.get_ref().clone(),
        mailer.get_ref().clone(),
    )
    .subscribe(
        &data.email.trim().to_lowercase(),
        data.name,
        None,
        SubscriberSource::ContactForm,
        client_ip(&req),
        user_agent(&req),
    )
    .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::message(
        "Fast geschafft! Bitte bestätigen Sie Ihre Anmeldung über den Link in der E-Mail.",
    )))
}

#[derive(Debug, Deserialize)]
pub struct ContactListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<ContactStatus>,
    pub search: Option<String>,
}

#[get("/api/contact")]
pub async fn list(
    user: AuthUser,
    query: web::Query<ContactListQuery>,
    contacts: web::Data<ContactRepository>,
    mailer: web::Data<MailerObject>,
    limiter: web::Data<RateLimiter>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20);
    let (contacts, total) = service(&contacts, &mailer, &limiter)
        .list(query.status, query.search.as_deref(), page, limit)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": contacts,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
        },
    })))
}

#[put("/api/contact/{id}/reply")]
pub async fn mark_replied(
    user: AuthUser,
    path: web::Path<String>,
    contacts: web::Data<ContactRepository>,
    mailer: web::Data<MailerObject>,
    limiter: web::Data<RateLimiter>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let id = ObjectId::parse_str(path.as_str())
        .map_err(|_| anyhow::anyhow!("Ungültige Kontakt-ID").code(400))?;
    let contact = service(&contacts, &mailer, &limiter)
        .mark_replied(&id, user.0.id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(contact)))
}

#[get("/api/contact/statistics")]
pub async fn statistics(
    user: AuthUser,
    contacts: web::Data<ContactRepository>,
    mailer: web::Data<MailerObject>,
    limiter: web::Data<RateLimiter>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let stats = service(&contacts, &mailer, &limiter).statistics().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(stats)))
}

#[cfg(test)]
mod tests {
    use actix_web::test::{call_service, init_service, read_body_json, TestRequest};
    use serde_json::Value;

    use common::{
        auth::create_token,
        entities::user::{Role, User},
    };

    use super::*;
    use crate::{create_app, test_state};

    #[actix_web::test]
    async fn minimal_form_submission_is_accepted() {
        let (state, mailer) = test_state();
        let app = init_service(create_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/contact")
            .set_json(json!({
                "name": "Max",
                "email": "max@example.com",
                "message": "Hallo!",
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["success"], true);

        let (stored, total) = state.contacts.list(None, None, 0, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(stored[0].email, "max@example.com");
        assert!(!stored[0].newsletter);
        assert_eq!(mailer.sent_count(), 2);
    }

    #[actix_web::test]
    async fn inbox_is_admin_only() {
        let (state, _mailer) = test_state();
        let app = init_service(create_app(state.clone())).await;

        let customer = User::empty("kunde@example.com");
        state.users.create(&customer).await.unwrap();
        let token = create_token(&customer).unwrap();

        let req = TestRequest::get()
            .uri("/api/contact")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 403);

        let mut admin = User::empty("admin@example.com");
        admin.role = Role::Admin;
        state.users.create(&admin).await.unwrap();
        let token = create_token(&admin).unwrap();

        let req = TestRequest::get()
            .uri("/api/contact?status=new")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["pagination"]["total"], 0);
    }
}
