use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;

use common::{
    entities::newsletter::{
        NewsletterSubscriber, NewsletterTemplate, SubscriberSource, TemplateContent,
        TemplateImage, TemplateStatus, UnsubscribeReason,
    },
    error::{self, AddCode},
};

use crate::{
    config,
    extractors::{client_ip, require_admin, user_agent, AuthUser},
    repositories::newsletter::{SendLogRepository, SubscriberRepository, TemplateRepository},
    service::{
        mail::{strip_tags, MailerObject},
        newsletter::{NewsletterService, SubscribeOutcome},
    },
};

use super::ApiResponse;

fn parse_id(raw: &str) -> error::Result<ObjectId> {
    ObjectId::parse_str(raw).map_err(|_| anyhow::anyhow!("Ungültige ID").code(400))
}

fn service(
    subscribers: &web::Data<SubscriberRepository>,
    templates: &web::Data<TemplateRepository>,
    send_logs: &web::Data<SendLogRepository>,
    mailer: &web::Data<MailerObject>,
) -> NewsletterService {
    NewsletterService::new(
        subscribers.get_ref().clone(),
        templates.get_ref().clone(),
        send_logs.get_ref().clone(),
        mailer.get_ref().clone(),
    )
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
}

#[post("/api/newsletter/subscribe")]
pub async fn subscribe(
    req: HttpRequest,
    data: web::Json<SubscribeRequest>,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
    send_logs: web::Data<SendLogRepository>,
    mailer: web::Data<MailerObject>,
) -> error::Result<HttpResponse> {
    let email = data.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(anyhow::anyhow!("Gültige E-Mail-Adresse erforderlich").code(400));
    }

    let outcome = service(&subscribers, &templates, &send_logs, &mailer)
        .subscribe(
            &email,
            data.first_name.clone(),
            data.last_name.clone(),
            SubscriberSource::NewsletterSignup,
            client_ip(&req),
            user_agent(&req),
        )
        .await?;

    let message = match outcome {
        SubscribeOutcome::AlreadySubscribed => "Diese Adresse ist bereits angemeldet.",
        SubscribeOutcome::ConfirmationResent | SubscribeOutcome::ConfirmationSent => {
            "Fast geschafft! Bitte bestätigen Sie Ihre Anmeldung über den Link in der E-Mail."
        }
    };
    Ok(HttpResponse::Ok().json(ApiResponse::message(message)))
}

#[get("/api/newsletter/confirm/{token}")]
pub async fn confirm(
    path: web::Path<String>,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
    send_logs: web::Data<SendLogRepository>,
    mailer: web::Data<MailerObject>,
) -> error::Result<HttpResponse> {
    service(&subscribers, &templates, &send_logs, &mailer)
        .confirm(&path)
        .await?;
    Ok(HttpResponse::Found()
        .append_header((
            "Location",
            format!("{}/newsletter-bestaetigt", config::frontend_url()),
        ))
        .finish())
}

#[get("/api/newsletter/unsubscribe/{token}")]
pub async fn unsubscribe(
    path: web::Path<String>,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
    send_logs: web::Data<SendLogRepository>,
    mailer: web::Data<MailerObject>,
) -> error::Result<HttpResponse> {
    service(&subscribers, &templates, &send_logs, &mailer)
        .unsubscribe(&path, UnsubscribeReason::UserRequest)
        .await?;
    Ok(HttpResponse::Found()
        .append_header((
            "Location",
            format!("{}/newsletter-abgemeldet", config::frontend_url()),
        ))
        .finish())
}

#[derive(Debug, Deserialize)]
pub struct SubscriberQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub confirmed: Option<bool>,
    pub search: Option<String>,
}

#[get("/api/newsletter/subscribers")]
pub async fn list_subscribers(
    user: AuthUser,
    query: web::Query<SubscriberQuery>,
    subscribers: web::Data<SubscriberRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let mut all = subscribers.all().await?;
    if let Some(confirmed) = query.confirmed {
        all.retain(|s| s.is_confirmed == confirmed);
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        all.retain(|s| s.email.contains(&needle) || s.full_name().to_lowercase().contains(&needle));
    }
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = all.len();
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let page = query.page.unwrap_or(1).max(1);
    let items: Vec<_> = all
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": items,
        "pagination": { "page": page, "limit": limit, "total": total },
    })))
}

#[derive(Debug, Deserialize)]
pub struct AddSubscriber {
    pub email: String,
    #[serde(rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName")]
    pub last_name: Option<String>,
}

/// Manual import. Skips the double opt-in, the admin vouches for consent.
#[post("/api/newsletter/subscribers")]
pub async fn add_subscriber(
    user: AuthUser,
    data: web::Json<AddSubscriber>,
    subscribers: web::Data<SubscriberRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let email = data.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(anyhow::anyhow!("Gültige E-Mail-Adresse erforderlich").code(400));
    }
    if subscribers.find_by_email(&email).await?.is_some() {
        return Err(anyhow::anyhow!("Diese Adresse ist bereits vorhanden").code(400));
    }

    let mut subscriber = NewsletterSubscriber::new(&email, SubscriberSource::ManualImport);
    subscriber.first_name = data.first_name.clone();
    subscriber.last_name = data.last_name.clone();
    subscriber.confirm();
    subscribers.create(&subscriber).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(subscriber)))
}

#[delete("/api/newsletter/subscribers/{id}")]
pub async fn remove_subscriber(
    user: AuthUser,
    path: web::Path<String>,
    subscribers: web::Data<SubscriberRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let id = parse_id(&path)?;
    let Some(mut subscriber) = subscribers.find(&id).await? else {
        return Err(anyhow::anyhow!("Abonnent nicht gefunden").code(404));
    };
    subscriber.unsubscribe(UnsubscribeReason::AdminAction);
    subscribers.update(&subscriber).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("Abonnent abgemeldet")))
}

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    pub subject: String,
    pub preheader: Option<String>,
    pub html: String,
    pub text: Option<String>,
    pub json: Option<serde_json::Value>,
    #[serde(default)]
    pub images: Vec<TemplateImage>,
    #[serde(rename = "scheduledDate")]
    pub scheduled_date: Option<chrono::DateTime<chrono::Utc>>,
}

#[post("/api/newsletter/templates")]
pub async fn create_template(
    user: AuthUser,
    data: web::Json<TemplateRequest>,
    templates: web::Data<TemplateRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let data = data.into_inner();
    if data.name.trim().is_empty() || data.subject.trim().is_empty() {
        return Err(anyhow::anyhow!("Name und Betreff sind erforderlich").code(400));
    }

    let content = TemplateContent {
        text: data.text.unwrap_or_else(|| strip_tags(&data.html)),
        html: data.html,
        json: data.json,
    };
    let mut template =
        NewsletterTemplate::new(data.name, data.subject, content, user.0.id);
    template.preheader = data.preheader;
    template.images = data.images;
    if let Some(scheduled_date) = data.scheduled_date {
        template.is_scheduled = true;
        template.scheduled_date = Some(scheduled_date);
        template.status = TemplateStatus::Scheduled;
    }

    templates.create(&template).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(template)))
}

#[get("/api/newsletter/templates")]
pub async fn list_templates(
    user: AuthUser,
    templates: web::Data<TemplateRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let list = templates.all().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(list)))
}

#[get("/api/newsletter/templates/{id}")]
pub async fn get_template(
    user: AuthUser,
    path: web::Path<String>,
    templates: web::Data<TemplateRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let id = parse_id(&path)?;
    let Some(template) = templates.find(&id).await? else {
        return Err(anyhow::anyhow!("Vorlage nicht gefunden").code(404));
    };
    Ok(HttpResponse::Ok().json(ApiResponse::ok(template)))
}

#[put("/api/newsletter/templates/{id}")]
pub async fn update_template(
    user: AuthUser,
    path: web::Path<String>,
    data: web::Json<TemplateRequest>,
    templates: web::Data<TemplateRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let id = parse_id(&path)?;
    let Some(mut template) = templates.find(&id).await? else {
        return Err(anyhow::anyhow!("Vorlage nicht gefunden").code(404));
    };
    if template.status == TemplateStatus::Sent {
        return Err(anyhow::anyhow!("Versendete Newsletter können nicht bearbeitet werden").code(400));
    }

    let data = data.into_inner();
    template.name = data.name;
    template.subject = data.subject;
    template.preheader = data.preheader;
    template.content = TemplateContent {
        text: data.text.unwrap_or_else(|| strip_tags(&data.html)),
        html: data.html,
        json: data.json,
    };
    template.images = data.images;
    match data.scheduled_date {
        Some(scheduled_date) => {
            template.is_scheduled = true;
            template.scheduled_date = Some(scheduled_date);
            template.status = TemplateStatus::Scheduled;
        }
        None => {
            template.is_scheduled = false;
            template.scheduled_date = None;
            template.status = TemplateStatus::Draft;
        }
    }
    template.updated_at = chrono::Utc::now();

    templates.update(&template).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(template)))
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub email: Option<String>,
}

/// Test mail to the admin, no counters or logs touched.
#[post("/api/newsletter/templates/{id}/preview")]
pub async fn preview_template(
    user: AuthUser,
    path: web::Path<String>,
    data: web::Json<PreviewRequest>,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
    send_logs: web::Data<SendLogRepository>,
    mailer: web::Data<MailerObject>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let id = parse_id(&path)?;
    let recipient = data
        .into_inner()
        .email
        .unwrap_or_else(|| user.0.email.clone());
    service(&subscribers, &templates, &send_logs, &mailer)
        .send_preview(id, &recipient)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message(format!(
        "Vorschau an {} gesendet",
        recipient
    ))))
}

#[delete("/api/newsletter/templates/{id}")]
pub async fn delete_template(
    user: AuthUser,
    path: web::Path<String>,
    templates: web::Data<TemplateRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let id = parse_id(&path)?;
    if templates.delete(&id).await?.is_none() {
        return Err(anyhow::anyhow!("Vorlage nicht gefunden").code(404));
    }
    Ok(HttpResponse::Ok().json(ApiResponse::message("Vorlage gelöscht")))
}

#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub confirm: bool,
}

/// Two-phase send: without `confirm` the endpoint only reports how many
/// recipients the dispatch would reach.
#[post("/api/newsletter/templates/{id}/send")]
pub async fn send_template(
    user: AuthUser,
    path: web::Path<String>,
    data: web::Json<SendRequest>,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
    send_logs: web::Data<SendLogRepository>,
    mailer: web::Data<MailerObject>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let id = parse_id(&path)?;

    if !data.confirm {
        let Some(template) = templates.find(&id).await? else {
            return Err(anyhow::anyhow!("Vorlage nicht gefunden").code(404));
        };
        if template.status == TemplateStatus::Sent {
            return Err(anyhow::anyhow!("Dieser Newsletter wurde bereits versendet").code(400));
        }
        let audience = subscribers.confirmed_active().await?;
        return Ok(HttpResponse::Ok().json(json!({
            "success": false,
            "requiresConfirmation": true,
            "data": { "subscriberCount": audience.len() },
            "message": format!(
                "Der Newsletter würde an {} Abonnenten gesendet. Zum Bestätigen erneut mit confirm=true senden.",
                audience.len()
            ),
        })));
    }

    let report = service(&subscribers, &templates, &send_logs, &mailer)
        .send_newsletter(id)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok_with_message("Newsletter versendet", report)))
}

/// Manual trigger for due scheduled templates.
#[post("/api/newsletter/process-scheduled")]
pub async fn process_scheduled(
    user: AuthUser,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
    send_logs: web::Data<SendLogRepository>,
    mailer: web::Data<MailerObject>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let reports = service(&subscribers, &templates, &send_logs, &mailer)
        .process_scheduled()
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(reports)))
}

#[get("/api/newsletter/stats")]
pub async fn stats(
    user: AuthUser,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
) -> error::Result<HttpResponse> {
    require_admin(&user.0)?;
    let all = subscribers.all().await?;
    let confirmed = all.iter().filter(|s| s.is_confirmed && s.is_active).count();
    let pending = all.iter().filter(|s| !s.is_confirmed && s.is_active).count();
    let unsubscribed = all.iter().filter(|s| !s.is_active).count();

    let sent_templates = templates
        .all()
        .await?
        .into_iter()
        .filter(|t| t.status == TemplateStatus::Sent)
        .count();

    Ok(HttpResponse::Ok().json(ApiResponse::ok(json!({
        "subscribers": {
            "total": all.len(),
            "confirmed": confirmed,
            "pending": pending,
            "unsubscribed": unsubscribed,
        },
        "newslettersSent": sent_templates,
    }))))
}

#[cfg(test)]
mod tests {
    use actix_web::test::{call_service, init_service, read_body_json, TestRequest};
    use serde_json::Value;

    use common::{
        auth::create_token,
        entities::{
            newsletter::NewsletterSubscriber,
            user::{Role, User},
        },
    };

    use super::*;
    use crate::{create_app, test_state, AppState};

    async fn admin_token(state: &AppState) -> String {
        let mut admin = User::empty("admin@example.com");
        admin.role = Role::Admin;
        state.users.create(&admin).await.unwrap();
        create_token(&admin).unwrap()
    }

    #[actix_web::test]
    async fn signup_confirm_roundtrip_over_http() {
        let (state, mailer) = test_state();
        let app = init_service(create_app(state.clone())).await;

        let req = TestRequest::post()
            .uri("/api/newsletter/subscribe")
            .set_json(json!({"email": "Neu@Example.com"}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(mailer.sent_count(), 1);

        let subscriber = state
            .subscribers
            .find_by_email("neu@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(!subscriber.is_confirmed);
        let token = subscriber.confirmation_token.clone().unwrap();
        assert!(mailer.letters()[0].html.contains(&token));

        let req = TestRequest::get()
            .uri(&format!("/api/newsletter/confirm/{}", token))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 302);

        let subscriber = state
            .subscribers
            .find_by_email("neu@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(subscriber.is_confirmed);

        // The link is spent now.
        let req = TestRequest::get()
            .uri(&format!("/api/newsletter/confirm/{}", token))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn send_requires_an_explicit_confirmation_step() {
        let (state, mailer) = test_state();
        let app = init_service(create_app(state.clone())).await;
        let token = admin_token(&state).await;

        let mut subscriber = NewsletterSubscriber::new(
            "s@example.com",
            common::entities::newsletter::SubscriberSource::Api,
        );
        subscriber.confirm();
        state.subscribers.create(&subscriber).await.unwrap();

        let req = TestRequest::post()
            .uri("/api/newsletter/templates")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({
                "name": "August",
                "subject": "Neues im August",
                "html": "<p>Hallo {{firstName}}!</p>",
            }))
            .to_request();
        let body: Value = read_body_json(call_service(&app, req).await).await;
        let template_id = body["data"]["id"]["$oid"].as_str().unwrap().to_string();

        // First call only previews.
        let req = TestRequest::post()
            .uri(&format!("/api/newsletter/templates/{}/send", template_id))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["requiresConfirmation"], true);
        assert_eq!(body["data"]["subscriberCount"], 1);
        assert_eq!(mailer.sent_count(), 0);

        // Second call dispatches.
        let req = TestRequest::post()
            .uri(&format!("/api/newsletter/templates/{}/send", template_id))
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({"confirm": true}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["data"]["sent_count"], 1);
        assert_eq!(mailer.sent_count(), 1);
    }

    #[actix_web::test]
    async fn subscriber_admin_surface_is_locked_down() {
        let (state, _mailer) = test_state();
        let app = init_service(create_app(state.clone())).await;

        let req = TestRequest::get()
            .uri("/api/newsletter/subscribers")
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), 401);

        let customer = User::empty("kunde@example.com");
        state.users.create(&customer).await.unwrap();
        let customer_token = create_token(&customer).unwrap();
        let req = TestRequest::get()
            .uri("/api/newsletter/subscribers")
            .insert_header(("Authorization", format!("Bearer {}", customer_token)))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), 403);

        let token = admin_token(&state).await;
        let req = TestRequest::get()
            .uri("/api/newsletter/subscribers?confirmed=true")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = read_body_json(resp).await;
        assert_eq!(body["pagination"]["total"], 0);
    }
}
