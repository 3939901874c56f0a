use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::repository::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    New,
    Read,
    Replied,
    NewsletterOnly,
    Spam,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactPriority {
    Low,
    Normal,
    High,
    Urgent,
}

/// A submission of the public contact form, or a bare newsletter signup
/// recorded with the `newsletter_only` status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ObjectId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub subject: Option<String>,
    pub message: String,
    pub project_type: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub newsletter: bool,
    pub status: ContactStatus,
    pub priority: ContactPriority,
    pub source: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_replied: bool,
    pub replied_at: Option<DateTime<Utc>>,
    pub replied_by: Option<ObjectId>,
    pub admin_notes: Option<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(name: String, email: String, message: String) -> Self {
        Self {
            id: ObjectId::new(),
            name,
            email: email.to_lowercase(),
            phone: None,
            company: None,
            subject: None,
            message,
            project_type: None,
            budget: None,
            timeline: None,
            newsletter: false,
            status: ContactStatus::New,
            priority: ContactPriority::Normal,
            source: "contact_form".to_string(),
            ip_address: None,
            user_agent: None,
            is_replied: false,
            replied_at: None,
            replied_by: None,
            admin_notes: None,
            tags: Vec::new(),
            is_active: true,
            archived_at: None,
            created_at: Utc::now(),
        }
    }

    /// Larger budgets bump the priority so they surface first in the inbox.
    /// The project type becomes a tag for quick filtering.
    pub fn classify(&mut self) {
        match self.budget.as_deref() {
            Some("10000-plus") => self.priority = ContactPriority::High,
            Some("5000-10000") => self.priority = ContactPriority::Normal,
            _ => {}
        }
        if let Some(project_type) = &self.project_type {
            if !self.tags.contains(project_type) {
                self.tags.push(project_type.clone());
            }
        }
    }
}

impl Entity for Contact {
    fn id(&self) -> ObjectId {
        self.id
    }
}
