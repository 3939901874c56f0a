use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, Bson};

use common::{
    entities::user::User,
    error,
    repository::{mongo_repository::MongoRepository, RepositoryObject},
};

use super::DATABASE;

#[derive(Clone)]
pub struct UserRepository {
    inner: RepositoryObject<User>,
}

impl UserRepository {
    const COLLECTION: &'static str = "users";

    pub fn new(inner: RepositoryObject<User>) -> Self {
        Self { inner }
    }

    pub async fn mongo(mongo_uri: &str) -> Self {
        Self::new(Arc::new(
            MongoRepository::new(mongo_uri, DATABASE, Self::COLLECTION).await,
        ))
    }

    /// Emails are unique. Returns false when the address is taken.
    pub async fn create(&self, user: &User) -> error::Result<bool> {
        if self.find_by_email(&user.email).await?.is_some() {
            return Ok(false);
        }
        self.inner.insert(user).await
    }

    pub async fn find(&self, id: &ObjectId) -> error::Result<Option<User>> {
        self.inner.find("id", &Bson::ObjectId(*id)).await
    }

    pub async fn find_by_email(&self, email: &str) -> error::Result<Option<User>> {
        self.inner
            .find("email", &Bson::String(email.to_lowercase()))
            .await
    }

    pub async fn update(&self, user: &User) -> error::Result<bool> {
        self.inner.update(user).await
    }

    /// New customers get attached to the admin that has been around longest.
    pub async fn oldest_active_admin(&self) -> error::Result<Option<User>> {
        let admins = self
            .inner
            .find_many("role", &Bson::String("admin".to_string()))
            .await?;
        Ok(admins
            .into_iter()
            .filter(|admin| admin.is_active)
            .min_by_key(|admin| admin.created_at))
    }

    pub async fn customers_of(&self, admin: &ObjectId) -> error::Result<Vec<User>> {
        let customers = self
            .inner
            .find_many("assigned_admin", &Bson::ObjectId(*admin))
            .await?;
        Ok(customers
            .into_iter()
            .filter(|customer| customer.is_active)
            .collect())
    }
}
