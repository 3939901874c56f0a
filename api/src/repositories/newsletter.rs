use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, Bson};

use common::{
    entities::newsletter::{
        NewsletterSendLog, NewsletterSubscriber, NewsletterTemplate, TemplateStatus,
    },
    error,
    repository::{mongo_repository::MongoRepository, RepositoryObject},
};

use super::DATABASE;

#[derive(Clone)]
pub struct SubscriberRepository {
    inner: RepositoryObject<NewsletterSubscriber>,
}

impl SubscriberRepository {
    const COLLECTION: &'static str = "newsletter_subscribers";

    pub fn new(inner: RepositoryObject<NewsletterSubscriber>) -> Self {
        Self { inner }
    }

    pub async fn mongo(mongo_uri: &str) -> Self {
        Self::new(Arc::new(
            MongoRepository::new(mongo_uri, DATABASE, Self::COLLECTION).await,
        ))
    }

    pub async fn create(&self, subscriber: &NewsletterSubscriber) -> error::Result<bool> {
        if self.find_by_email(&subscriber.email).await?.is_some() {
            return Ok(false);
        }
        self.inner.insert(subscriber).await
    }

    pub async fn find(&self, id: &ObjectId) -> error::Result<Option<NewsletterSubscriber>> {
        self.inner.find("id", &Bson::ObjectId(*id)).await
    }

    pub async fn find_by_email(&self, email: &str) -> error::Result<Option<NewsletterSubscriber>> {
        self.inner
            .find("email", &Bson::String(email.to_lowercase()))
            .await
    }

    pub async fn find_by_confirmation_token(
        &self,
        token: &str,
    ) -> error::Result<Option<NewsletterSubscriber>> {
        self.inner
            .find("confirmation_token", &Bson::String(token.to_string()))
            .await
    }

    pub async fn find_by_unsubscribe_token(
        &self,
        token: &str,
    ) -> error::Result<Option<NewsletterSubscriber>> {
        self.inner
            .find("unsubscribe_token", &Bson::String(token.to_string()))
            .await
    }

    pub async fn update(&self, subscriber: &NewsletterSubscriber) -> error::Result<bool> {
        self.inner.update(subscriber).await
    }

    /// The dispatch audience: confirmed and still subscribed.
    pub async fn confirmed_active(&self) -> error::Result<Vec<NewsletterSubscriber>> {
        let subscribers = self
            .inner
            .find_many("is_confirmed", &Bson::Boolean(true))
            .await?;
        Ok(subscribers
            .into_iter()
            .filter(|subscriber| subscriber.is_active)
            .collect())
    }

    pub async fn all(&self) -> error::Result<Vec<NewsletterSubscriber>> {
        self.inner.find_all(0, 0).await
    }
}

#[derive(Clone)]
pub struct TemplateRepository {
    inner: RepositoryObject<NewsletterTemplate>,
}

impl TemplateRepository {
    const COLLECTION: &'static str = "newsletter_templates";

    pub fn new(inner: RepositoryObject<NewsletterTemplate>) -> Self {
        Self { inner }
    }

    pub async fn mongo(mongo_uri: &str) -> Self {
        Self::new(Arc::new(
            MongoRepository::new(mongo_uri, DATABASE, Self::COLLECTION).await,
        ))
    }

    pub async fn create(&self, template: &NewsletterTemplate) -> error::Result<bool> {
        self.inner.insert(template).await
    }

    pub async fn find(&self, id: &ObjectId) -> error::Result<Option<NewsletterTemplate>> {
        self.inner.find("id", &Bson::ObjectId(*id)).await
    }

    pub async fn update(&self, template: &NewsletterTemplate) -> error::Result<bool> {
        self.inner.update(template).await
    }

    pub async fn delete(&self, id: &ObjectId) -> error::Result<Option<NewsletterTemplate>> {
        self.inner.delete("id", id).await
    }

    pub async fn all(&self) -> error::Result<Vec<NewsletterTemplate>> {
        let mut templates = self.inner.find_all(0, 0).await?;
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }

    /// Scheduled templates whose send time has passed.
    pub async fn scheduled_due(
        &self,
        now: DateTime<Utc>,
    ) -> error::Result<Vec<NewsletterTemplate>> {
        let templates = self
            .inner
            .find_many("status", &Bson::String("scheduled".to_string()))
            .await?;
        Ok(templates
            .into_iter()
            .filter(|template| {
                template.is_scheduled
                    && template.status == TemplateStatus::Scheduled
                    && template.scheduled_date.map(|at| at <= now).unwrap_or(false)
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct SendLogRepository {
    inner: RepositoryObject<NewsletterSendLog>,
}

impl SendLogRepository {
    const COLLECTION: &'static str = "newsletter_send_logs";

    pub fn new(inner: RepositoryObject<NewsletterSendLog>) -> Self {
        Self { inner }
    }

    pub async fn mongo(mongo_uri: &str) -> Self {
        Self::new(Arc::new(
            MongoRepository::new(mongo_uri, DATABASE, Self::COLLECTION).await,
        ))
    }

    pub async fn create(&self, log: &NewsletterSendLog) -> error::Result<bool> {
        self.inner.insert(log).await
    }

    pub async fn update(&self, log: &NewsletterSendLog) -> error::Result<bool> {
        self.inner.update(log).await
    }

    pub async fn find_for(
        &self,
        subscriber_id: &ObjectId,
        newsletter_id: &ObjectId,
    ) -> error::Result<Option<NewsletterSendLog>> {
        let logs = self
            .inner
            .find_many("subscriber_id", &Bson::ObjectId(*subscriber_id))
            .await?;
        Ok(logs
            .into_iter()
            .find(|log| &log.newsletter_id == newsletter_id))
    }

    pub async fn for_template(
        &self,
        newsletter_id: &ObjectId,
    ) -> error::Result<Vec<NewsletterSendLog>> {
        self.inner
            .find_many("newsletter_id", &Bson::ObjectId(*newsletter_id))
            .await
    }
}
