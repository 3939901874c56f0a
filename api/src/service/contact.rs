use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use common::{
    entities::contact::{Contact, ContactStatus},
    error::{self, AddCode},
};

use crate::{
    rate_limit::RateLimiter,
    repositories::contact::ContactRepository,
    service::mail::{strip_tags, Letter, MailerObject, ADMIN_EMAIL},
};

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

fn budget_label(budget: &str) -> &str {
    match budget {
        "unter-2500" => "< 2.500€",
        "2500-5000" => "2.500€ - 5.000€",
        "5000-10000" => "5.000€ - 10.000€",
        "10000-plus" => "> 10.000€",
        other => other,
    }
}

fn timeline_label(timeline: &str) -> &str {
    match timeline {
        "asap" => "Innerhalb 1 Woche",
        "1-month" => "2-4 Wochen",
        "2-3-months" => "2-3 Monate",
        "flexible" => "Flexibel",
        other => other,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub subject: Option<String>,
    #[serde(rename = "projectType")]
    pub project_type: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    #[serde(default)]
    pub newsletter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactStatistics {
    pub total: usize,
    pub new: usize,
    pub replied: usize,
    pub unreplied: usize,
    pub newsletter_signups: usize,
    pub archived: usize,
}

#[derive(Clone)]
pub struct ContactService {
    contacts: ContactRepository,
    mailer: MailerObject,
    limiter: RateLimiter,
}

impl ContactService {
    pub fn new(contacts: ContactRepository, mailer: MailerObject, limiter: RateLimiter) -> Self {
        Self {
            contacts,
            mailer,
            limiter,
        }
    }

    fn admin_letter(contact: &Contact) -> Letter {
        let html = include_str!("../../templates/contact_admin.html")
            .replace("{name}", &contact.name)
            .replace("{email}", &contact.email)
            .replace("{phone}", contact.phone.as_deref().unwrap_or("Nicht angegeben"))
            .replace("{company}", contact.company.as_deref().unwrap_or("Nicht angegeben"))
            .replace(
                "{projectType}",
                contact.project_type.as_deref().unwrap_or("Nicht angegeben"),
            )
            .replace(
                "{budget}",
                contact
                    .budget
                    .as_deref()
                    .map(budget_label)
                    .unwrap_or("Nicht angegeben"),
            )
            .replace(
                "{timeline}",
                contact
                    .timeline
                    .as_deref()
                    .map(timeline_label)
                    .unwrap_or("Nicht angegeben"),
            )
            .replace("{newsletter}", if contact.newsletter { "Ja" } else { "Nein" })
            .replace("{message}", &contact.message);
        Letter {
            email: ADMIN_EMAIL.to_string(),
            subject: format!("Neue Kontaktanfrage von {}", contact.name),
            text: strip_tags(&html),
            html,
        }
    }

    fn customer_letter(contact: &Contact) -> Letter {
        let html = include_str!("../../templates/contact_customer.html")
            .replace("{name}", &contact.name)
            .replace("{message}", &contact.message);
        Letter {
            email: contact.email.clone(),
            subject: "Wir haben Ihre Anfrage erhalten".to_string(),
            text: strip_tags(&html),
            html,
        }
    }

    /// Public contact form. Stores the submission and notifies both sides
    /// by mail, neither mail failing the request.
    pub async fn submit(
        &self,
        request: ContactRequest,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> error::Result<Contact> {
        if let Some(ip) = &ip {
            self.limiter.contact(ip)?;
        }

        let name = request.name.trim();
        let email = request.email.trim().to_lowercase();
        let message = request.message.trim();
        if name.is_empty() || email.is_empty() || message.is_empty() {
            return Err(anyhow::anyhow!("Name, E-Mail und Nachricht sind erforderlich").code(400));
        }
        if !EMAIL.is_match(&email) {
            return Err(anyhow::anyhow!("Ungültige E-Mail-Adresse").code(400));
        }

        let mut contact = Contact::new(name.to_string(), email, message.to_string());
        contact.phone = request.phone;
        contact.company = request.company;
        contact.subject = request.subject;
        contact.project_type = request.project_type;
        contact.budget = request.budget;
        contact.timeline = request.timeline;
        contact.newsletter = request.newsletter;
        contact.ip_address = ip;
        contact.user_agent = user_agent;
        contact.classify();

        self.contacts.create(&contact).await?;

        for letter in [Self::admin_letter(&contact), Self::customer_letter(&contact)] {
            if let Err(err) = self.mailer.send(&letter).await {
                log::error!("Contact mail to {} failed: {}", letter.email, err);
            }
        }

        Ok(contact)
    }

    /// Newsletter checkbox on the contact page, without a message. Stored as
    /// a `newsletter_only` contact so the inbox keeps the full history.
    pub async fn newsletter_signup(
        &self,
        name: Option<String>,
        email: &str,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> error::Result<Contact> {
        if let Some(ip) = &ip {
            self.limiter.contact(ip)?;
        }
        let email = email.trim().to_lowercase();
        if !EMAIL.is_match(&email) {
            return Err(anyhow::anyhow!("Ungültige E-Mail-Adresse").code(400));
        }
        if let Some(existing) = self.contacts.newsletter_signup_for(&email).await? {
            return Ok(existing);
        }

        let name = name.unwrap_or_default().trim().to_string();
        let mut contact = Contact::new(name, email, String::new());
        contact.newsletter = true;
        contact.status = ContactStatus::NewsletterOnly;
        contact.ip_address = ip;
        contact.user_agent = user_agent;
        self.contacts.create(&contact).await?;
        Ok(contact)
    }

    pub async fn list(
        &self,
        status: Option<ContactStatus>,
        search: Option<&str>,
        page: usize,
        limit: usize,
    ) -> error::Result<(Vec<Contact>, usize)> {
        let limit = limit.clamp(1, 100);
        let skip = page.saturating_sub(1) * limit;
        self.contacts.list(status, search, skip, limit).await
    }

    pub async fn mark_replied(
        &self,
        id: &mongodb::bson::oid::ObjectId,
        admin: mongodb::bson::oid::ObjectId,
    ) -> error::Result<Contact> {
        let Some(mut contact) = self.contacts.find(id).await? else {
            return Err(anyhow::anyhow!("Kontaktanfrage nicht gefunden").code(404));
        };
        contact.status = ContactStatus::Replied;
        contact.is_replied = true;
        contact.replied_at = Some(Utc::now());
        contact.replied_by = Some(admin);
        self.contacts.update(&contact).await?;
        Ok(contact)
    }

    pub async fn statistics(&self) -> error::Result<ContactStatistics> {
        let contacts = self.contacts.all_active().await?;
        Ok(ContactStatistics {
            total: contacts.len(),
            new: contacts
                .iter()
                .filter(|c| c.status == ContactStatus::New)
                .count(),
            replied: contacts.iter().filter(|c| c.is_replied).count(),
            unreplied: contacts
                .iter()
                .filter(|c| !c.is_replied && c.status != ContactStatus::NewsletterOnly)
                .count(),
            newsletter_signups: contacts.iter().filter(|c| c.newsletter).count(),
            archived: contacts
                .iter()
                .filter(|c| c.status == ContactStatus::Archived)
                .count(),
        })
    }
}
