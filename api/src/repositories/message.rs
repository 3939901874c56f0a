use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, Bson};

use common::{
    entities::{
        message::Message,
        user::{Role, User},
    },
    error,
    repository::{mongo_repository::MongoRepository, RepositoryObject},
};

use super::DATABASE;

#[derive(Clone)]
pub struct MessageRepository {
    inner: RepositoryObject<Message>,
}

impl MessageRepository {
    const COLLECTION: &'static str = "messages";

    pub fn new(inner: RepositoryObject<Message>) -> Self {
        Self { inner }
    }

    pub async fn mongo(mongo_uri: &str) -> Self {
        Self::new(Arc::new(
            MongoRepository::new(mongo_uri, DATABASE, Self::COLLECTION).await,
        ))
    }

    pub async fn create(&self, message: &Message) -> error::Result<bool> {
        self.inner.insert(message).await
    }

    pub async fn find(&self, id: &ObjectId) -> error::Result<Option<Message>> {
        self.inner.find("id", &Bson::ObjectId(*id)).await
    }

    pub async fn update(&self, message: &Message) -> error::Result<bool> {
        self.inner.update(message).await
    }

    pub async fn by_project(&self, project_id: &ObjectId) -> error::Result<Vec<Message>> {
        let mut messages = self
            .inner
            .find_many("project_id", &Bson::ObjectId(*project_id))
            .await?;
        messages.retain(|message| message.is_active);
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    /// Conversation side relevant to the user: admins see messages of their
    /// customers, customers see their own threads.
    pub async fn for_user(&self, user: &User) -> error::Result<Vec<Message>> {
        let mut messages = match user.role {
            Role::Customer => {
                self.inner
                    .find_many("customer_id", &Bson::ObjectId(user.id))
                    .await?
            }
            Role::Admin => {
                let all = self.inner.find_all(0, 0).await?;
                all
            }
        };
        messages.retain(|message| message.is_active);
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    pub async fn unread_count_for(&self, user: &User) -> error::Result<usize> {
        let messages = self.for_user(user).await?;
        Ok(messages
            .iter()
            .filter(|message| message.sender_id != user.id && !message.is_read_by(&user.id))
            .count())
    }
}
