use actix_web::{get, web, HttpResponse};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;

use common::error;

use crate::{
    config,
    repositories::newsletter::{SendLogRepository, SubscriberRepository, TemplateRepository},
    service::{mail::MailerObject, newsletter::NewsletterService},
};

/// 1x1 transparent PNG, served for every open-pixel request.
const PIXEL: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x62, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

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

/// Always answers with the pixel, even for garbage ids. Mail clients
/// retry broken images, an error page would leak tracking internals.
#[get("/api/newsletter/track/open/{subscriber_id}/{newsletter_id}")]
pub async fn track_open(
    path: web::Path<(String, String)>,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
    send_logs: web::Data<SendLogRepository>,
    mailer: web::Data<MailerObject>,
) -> error::Result<HttpResponse> {
    let (subscriber_id, newsletter_id) = path.into_inner();
    if let (Ok(subscriber_id), Ok(newsletter_id)) = (
        ObjectId::parse_str(&subscriber_id),
        ObjectId::parse_str(&newsletter_id),
    ) {
        if let Err(err) = service(&subscribers, &templates, &send_logs, &mailer)
            .track_open(subscriber_id, newsletter_id)
            .await
        {
            log::error!("Open tracking failed: {}", err);
        }
    }

    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .append_header(("Cache-Control", "no-store"))
        .body(PIXEL))
}

#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub url: Option<String>,
}

#[get("/api/newsletter/track/click/{subscriber_id}/{newsletter_id}")]
pub async fn track_click(
    path: web::Path<(String, String)>,
    query: web::Query<ClickQuery>,
    subscribers: web::Data<SubscriberRepository>,
    templates: web::Data<TemplateRepository>,
    send_logs: web::Data<SendLogRepository>,
    mailer: web::Data<MailerObject>,
) -> error::Result<HttpResponse> {
    let (subscriber_id, newsletter_id) = path.into_inner();
    if let (Ok(subscriber_id), Ok(newsletter_id)) = (
        ObjectId::parse_str(&subscriber_id),
        ObjectId::parse_str(&newsletter_id),
    ) {
        if let Err(err) = service(&subscribers, &templates, &send_logs, &mailer)
            .track_click(subscriber_id, newsletter_id)
            .await
        {
            log::error!("Click tracking failed: {}", err);
        }
    }

    let target = query
        .into_inner()
        .url
        .unwrap_or_else(config::frontend_url);
    Ok(HttpResponse::Found()
        .append_header(("Location", target))
        .finish())
}
