use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::repository::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberSource {
    ContactForm,
    NewsletterSignup,
    ManualImport,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsubscribeReason {
    UserRequest,
    Bounce,
    SpamComplaint,
    AdminAction,
}

fn random_token() -> String {
    hex::encode(rand::thread_rng().gen::<[u8; 32]>())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterSubscriber {
    pub id: ObjectId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_confirmed: bool,
    pub confirmation_token: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub unsubscribe_token: String,
    pub is_active: bool,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub unsubscribe_reason: Option<UnsubscribeReason>,
    pub source: SubscriberSource,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub total_emails_received: u32,
    pub total_emails_opened: u32,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub total_links_clicked: u32,
    pub last_clicked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewsletterSubscriber {
    pub fn new(email: &str, source: SubscriberSource) -> Self {
        Self {
            id: ObjectId::new(),
            email: email.to_lowercase(),
            first_name: None,
            last_name: None,
            is_confirmed: false,
            confirmation_token: Some(random_token()),
            confirmed_at: None,
            unsubscribe_token: random_token(),
            is_active: true,
            unsubscribed_at: None,
            unsubscribe_reason: None,
            source,
            ip_address: None,
            user_agent: None,
            total_emails_received: 0,
            total_emails_opened: 0,
            last_opened_at: None,
            total_links_clicked: 0,
            last_clicked_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn regenerate_confirmation_token(&mut self) -> String {
        let token = random_token();
        self.confirmation_token = Some(token.clone());
        token
    }

    /// Confirming consumes the token so the link only works once.
    pub fn confirm(&mut self) {
        self.is_confirmed = true;
        self.confirmed_at = Some(Utc::now());
        self.confirmation_token = None;
    }

    pub fn unsubscribe(&mut self, reason: UnsubscribeReason) {
        self.is_active = false;
        self.unsubscribed_at = Some(Utc::now());
        self.unsubscribe_reason = Some(reason);
    }

    /// Re-opting in after an unsubscribe restarts the double-opt-in flow.
    pub fn resubscribe(&mut self) {
        self.is_active = true;
        self.unsubscribed_at = None;
        self.unsubscribe_reason = None;
        self.is_confirmed = false;
        self.confirmation_token = Some(random_token());
    }

    pub fn full_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        name.trim().to_string()
    }
}

impl Entity for NewsletterSubscriber {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateImage {
    pub url: String,
    pub alt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateContent {
    pub html: String,
    pub text: String,
    /// Editor state of whatever built the html, kept verbatim.
    pub json: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterTemplate {
    pub id: ObjectId,
    pub name: String,
    pub subject: String,
    pub preheader: Option<String>,
    pub content: TemplateContent,
    pub images: Vec<TemplateImage>,
    pub status: TemplateStatus,
    pub is_scheduled: bool,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub sent_count: u32,
    pub delivered_count: u32,
    pub opened_count: u32,
    pub clicked_count: u32,
    pub bounced_count: u32,
    pub created_by: ObjectId,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewsletterTemplate {
    pub fn new(name: String, subject: String, content: TemplateContent, created_by: ObjectId) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            name,
            subject,
            preheader: None,
            content,
            images: Vec::new(),
            status: TemplateStatus::Draft,
            is_scheduled: false,
            scheduled_date: None,
            sent_count: 0,
            delivered_count: 0,
            opened_count: 0,
            clicked_count: 0,
            bounced_count: 0,
            created_by,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Entity for NewsletterTemplate {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendLogStatus {
    Pending,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Complained,
    Failed,
}

/// One row per recipient per dispatched newsletter. Engagement tracking
/// updates the row in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsletterSendLog {
    pub id: ObjectId,
    pub newsletter_id: ObjectId,
    pub subscriber_id: ObjectId,
    pub recipient_email: String,
    pub subject: String,
    pub status: SendLogStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub first_clicked_at: Option<DateTime<Utc>>,
    pub open_count: u32,
    pub click_count: u32,
    pub error_message: Option<String>,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewsletterSendLog {
    pub fn pending(template: &NewsletterTemplate, subscriber: &NewsletterSubscriber) -> Self {
        Self {
            id: ObjectId::new(),
            newsletter_id: template.id,
            subscriber_id: subscriber.id,
            recipient_email: subscriber.email.clone(),
            subject: template.subject.clone(),
            status: SendLogStatus::Pending,
            sent_at: None,
            delivered_at: None,
            opened_at: None,
            first_clicked_at: None,
            open_count: 0,
            click_count: 0,
            error_message: None,
            provider_message_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn failed(
        template: &NewsletterTemplate,
        subscriber: &NewsletterSubscriber,
        error: String,
    ) -> Self {
        let mut log = Self::pending(template, subscriber);
        log.status = SendLogStatus::Failed;
        log.error_message = Some(error);
        log
    }
}

impl Entity for NewsletterSendLog {
    fn id(&self) -> ObjectId {
        self.id
    }
}
