use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::repository::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectKind {
    Website,
    Ecommerce,
    Bewerbung,
    Newsletter,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectStatus {
    Planning,
    InProgress,
    Review,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ObjectId,
    pub name: String,
    pub description: Option<String>,
    pub kind: ProjectKind,
    pub status: ProjectStatus,
    pub priority: ProjectPriority,
    pub customer_id: ObjectId,
    pub assigned_admin: ObjectId,
    pub deadline: DateTime<Utc>,
    pub progress: u32,
    pub messages_count: u32,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        name: String,
        kind: ProjectKind,
        customer_id: ObjectId,
        assigned_admin: ObjectId,
        deadline: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            name,
            description: None,
            kind,
            status: ProjectStatus::Planning,
            priority: ProjectPriority::Medium,
            customer_id,
            assigned_admin,
            deadline,
            progress: 0,
            messages_count: 0,
            tags: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Progress and status move together. Full progress completes the
    /// project, and a completed project reports full progress.
    pub fn set_progress(&mut self, progress: u32) {
        self.progress = progress.min(100);
        if self.progress == 100 {
            self.status = ProjectStatus::Completed;
        }
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: ProjectStatus) {
        self.status = status;
        if status == ProjectStatus::Completed {
            self.progress = 100;
        }
        self.updated_at = Utc::now();
    }
}

impl Entity for Project {
    fn id(&self) -> ObjectId {
        self.id
    }
}
