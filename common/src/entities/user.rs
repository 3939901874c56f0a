use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::repository::Entity;

/// The two roles the system knows. The customer role keeps its historic
/// wire value "kunde" for compatibility with stored documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "kunde")]
    Customer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: ObjectId,
    pub email: String,
    pub password: String,
    pub salt: String,
    pub role: Role,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub avatar: Option<String>,
    pub assigned_admin: Option<ObjectId>,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub last_login: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A customer account with every optional field unset. Callers fill in
    /// credentials and roles as needed.
    pub fn empty(email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            email: email.to_lowercase(),
            password: String::new(),
            salt: String::new(),
            role: Role::Customer,
            google_id: None,
            github_id: None,
            first_name: None,
            last_name: None,
            company: None,
            avatar: None,
            assigned_admin: None,
            is_active: true,
            is_email_verified: false,
            last_login: now,
            created_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }
}

impl Entity for User {
    fn id(&self) -> ObjectId {
        self.id
    }
}

/// User representation handed to clients. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub avatar: Option<String>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_hex(),
            email: user.email,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            company: user.company,
            avatar: user.avatar,
        }
    }
}
