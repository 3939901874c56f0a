use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{entities::user::Role, repository::Entity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
    Image,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub user_id: ObjectId,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: ObjectId,
    pub project_id: ObjectId,
    pub customer_id: ObjectId,
    pub sender_id: ObjectId,
    pub sender_role: Role,
    pub sender_name: String,
    pub kind: MessageKind,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub read_by: Vec<ReadReceipt>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        project_id: ObjectId,
        customer_id: ObjectId,
        sender_id: ObjectId,
        sender_role: Role,
        sender_name: String,
        content: String,
    ) -> Self {
        Self {
            id: ObjectId::new(),
            project_id,
            customer_id,
            sender_id,
            sender_role,
            sender_name,
            kind: MessageKind::Text,
            content,
            attachments: Vec::new(),
            read_by: Vec::new(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Records a read receipt once per user.
    pub fn mark_read_by(&mut self, user_id: ObjectId) {
        if !self.read_by.iter().any(|r| r.user_id == user_id) {
            self.read_by.push(ReadReceipt {
                user_id,
                read_at: Utc::now(),
            });
        }
    }

    pub fn is_read_by(&self, user_id: &ObjectId) -> bool {
        self.read_by.iter().any(|r| &r.user_id == user_id)
    }
}

impl Entity for Message {
    fn id(&self) -> ObjectId {
        self.id
    }
}
