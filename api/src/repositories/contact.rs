use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, Bson};

use common::{
    entities::contact::{Contact, ContactStatus},
    error,
    repository::{mongo_repository::MongoRepository, RepositoryObject},
};

use super::DATABASE;

#[derive(Clone)]
pub struct ContactRepository {
    inner: RepositoryObject<Contact>,
}

impl ContactRepository {
    const COLLECTION: &'static str = "contacts";

    pub fn new(inner: RepositoryObject<Contact>) -> Self {
        Self { inner }
    }

    pub async fn mongo(mongo_uri: &str) -> Self {
        Self::new(Arc::new(
            MongoRepository::new(mongo_uri, DATABASE, Self::COLLECTION).await,
        ))
    }

    pub async fn create(&self, contact: &Contact) -> error::Result<bool> {
        self.inner.insert(contact).await
    }

    pub async fn find(&self, id: &ObjectId) -> error::Result<Option<Contact>> {
        self.inner.find("id", &Bson::ObjectId(*id)).await
    }

    pub async fn update(&self, contact: &Contact) -> error::Result<bool> {
        self.inner.update(contact).await
    }

    pub async fn newsletter_signup_for(&self, email: &str) -> error::Result<Option<Contact>> {
        let contacts = self
            .inner
            .find_many("email", &Bson::String(email.to_lowercase()))
            .await?;
        Ok(contacts.into_iter().find(|contact| contact.newsletter))
    }

    /// Inbox listing with optional status filter and free-text search,
    /// newest first. Returns the page and the filtered total.
    pub async fn list(
        &self,
        status: Option<ContactStatus>,
        search: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> error::Result<(Vec<Contact>, usize)> {
        let mut contacts = self.inner.find_all(0, 0).await?;
        contacts.retain(|contact| contact.is_active);
        if let Some(status) = status {
            contacts.retain(|contact| contact.status == status);
        }
        if let Some(search) = search {
            let needle = search.to_lowercase();
            contacts.retain(|contact| {
                contact.name.to_lowercase().contains(&needle)
                    || contact.email.contains(&needle)
                    || contact.message.to_lowercase().contains(&needle)
                    || contact
                        .company
                        .as_deref()
                        .map(|c| c.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            });
        }
        contacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = contacts.len();
        let page = contacts.into_iter().skip(skip).take(limit).collect();
        Ok((page, total))
    }

    pub async fn all_active(&self) -> error::Result<Vec<Contact>> {
        let mut contacts = self.inner.find_all(0, 0).await?;
        contacts.retain(|contact| contact.is_active);
        Ok(contacts)
    }
}
