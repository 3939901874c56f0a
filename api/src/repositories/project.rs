use std::sync::Arc;

use mongodb::bson::{oid::ObjectId, Bson};

use common::{
    entities::{
        project::Project,
        user::{Role, User},
    },
    error,
    repository::{mongo_repository::MongoRepository, RepositoryObject},
};

use super::DATABASE;

#[derive(Clone)]
pub struct ProjectRepository {
    inner: RepositoryObject<Project>,
}

impl ProjectRepository {
    const COLLECTION: &'static str = "projects";

    pub fn new(inner: RepositoryObject<Project>) -> Self {
        Self { inner }
    }

    pub async fn mongo(mongo_uri: &str) -> Self {
        Self::new(Arc::new(
            MongoRepository::new(mongo_uri, DATABASE, Self::COLLECTION).await,
        ))
    }

    pub async fn create(&self, project: &Project) -> error::Result<bool> {
        self.inner.insert(project).await
    }

    pub async fn find(&self, id: &ObjectId) -> error::Result<Option<Project>> {
        self.inner.find("id", &Bson::ObjectId(*id)).await
    }

    pub async fn update(&self, project: &Project) -> error::Result<bool> {
        self.inner.update(project).await
    }

    /// Active projects on the user's side of the relation, newest first.
    pub async fn for_user(&self, user: &User) -> error::Result<Vec<Project>> {
        let field = match user.role {
            Role::Admin => "assigned_admin",
            Role::Customer => "customer_id",
        };
        let mut projects = self
            .inner
            .find_many(field, &Bson::ObjectId(user.id))
            .await?;
        projects.retain(|project| project.is_active);
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

}
