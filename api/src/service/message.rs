use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use common::{
    access_rules::{AccessRules, Read},
    auth::Auth,
    entities::{
        message::Message,
        user::{Role, User},
    },
    error::{self, AddCode},
};

use crate::repositories::{message::MessageRepository, project::ProjectRepository};

const RECENT_LIMIT: usize = 50;

fn auth_for(user: &User) -> Auth {
    match user.role {
        Role::Admin => Auth::Admin(user.id),
        Role::Customer => Auth::Customer(user.id),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessage {
    pub project_id: ObjectId,
    pub content: String,
}

#[derive(Clone)]
pub struct MessageService {
    projects: ProjectRepository,
    messages: MessageRepository,
}

impl MessageService {
    pub fn new(projects: ProjectRepository, messages: MessageRepository) -> Self {
        Self { projects, messages }
    }

    async fn accessible_project(
        &self,
        user: &User,
        project_id: &ObjectId,
    ) -> error::Result<common::entities::project::Project> {
        let project = self.projects.find(project_id).await?;
        match project {
            Some(project)
                if project.is_active && Read::get_access(&auth_for(user), &project) =>
            {
                Ok(project)
            }
            _ => Err(anyhow::anyhow!("Projekt nicht gefunden").code(404)),
        }
    }

    /// Messages of one project, or the user's recent messages across all
    /// projects when no project is given.
    pub async fn list(
        &self,
        user: &User,
        project_id: Option<ObjectId>,
    ) -> error::Result<Vec<Message>> {
        match project_id {
            Some(project_id) => {
                self.accessible_project(user, &project_id).await?;
                self.messages.by_project(&project_id).await
            }
            None => {
                let mut messages = self.messages.for_user(user).await?;
                messages.truncate(RECENT_LIMIT);
                Ok(messages)
            }
        }
    }

    pub async fn post(&self, user: &User, request: PostMessage) -> error::Result<Message> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(anyhow::anyhow!("Nachricht darf nicht leer sein").code(400));
        }

        let mut project = self.accessible_project(user, &request.project_id).await?;

        let message = Message::new(
            project.id,
            project.customer_id,
            user.id,
            user.role,
            user.full_name(),
            content.to_string(),
        );
        self.messages.create(&message).await?;

        project.messages_count += 1;
        self.projects.update(&project).await?;

        Ok(message)
    }

    pub async fn mark_read(&self, user: &User, message_id: &ObjectId) -> error::Result<Message> {
        let Some(mut message) = self.messages.find(message_id).await? else {
            return Err(anyhow::anyhow!("Nachricht nicht gefunden").code(404));
        };
        if !message.is_active || !Read::get_access(&auth_for(user), &message) {
            return Err(anyhow::anyhow!("Nachricht nicht gefunden").code(404));
        }

        message.mark_read_by(user.id);
        self.messages.update(&message).await?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use common::{
        entities::project::{Project, ProjectKind},
        repository::test_repository::TestRepository,
    };

    use super::*;

    struct Fixture {
        service: MessageService,
        admin: User,
        customer: User,
        project: Project,
    }

    async fn fixture() -> Fixture {
        let projects = ProjectRepository::new(Arc::new(TestRepository::new()));
        let messages = MessageRepository::new(Arc::new(TestRepository::new()));
        let service = MessageService::new(projects.clone(), messages);

        let mut admin = User::empty("admin@example.com");
        admin.role = Role::Admin;
        let mut customer = User::empty("kunde@example.com");
        customer.assigned_admin = Some(admin.id);

        let project = Project::new(
            "Site".to_string(),
            ProjectKind::Website,
            customer.id,
            admin.id,
            Utc::now(),
        );
        projects.create(&project).await.unwrap();

        Fixture {
            service,
            admin,
            customer,
            project,
        }
    }

    #[actix_web::test]
    async fn posting_bumps_the_project_counter() {
        let f = fixture().await;
        let message = f
            .service
            .post(
                &f.customer,
                PostMessage {
                    project_id: f.project.id,
                    content: "Hallo!".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(message.sender_role, Role::Customer);

        let stored = f.service.projects.find(&f.project.id).await.unwrap().unwrap();
        assert_eq!(stored.messages_count, 1);
    }

    #[actix_web::test]
    async fn outsiders_cannot_post_or_read() {
        let f = fixture().await;
        let stranger = User::empty("fremd@example.com");

        let err = f
            .service
            .post(
                &stranger,
                PostMessage {
                    project_id: f.project.id,
                    content: "Hi".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), 404);

        let err = f
            .service
            .list(&stranger, Some(f.project.id))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 404);
    }

    #[actix_web::test]
    async fn read_receipts_are_recorded_once() {
        let f = fixture().await;
        let message = f
            .service
            .post(
                &f.customer,
                PostMessage {
                    project_id: f.project.id,
                    content: "Hallo!".to_string(),
                },
            )
            .await
            .unwrap();

        f.service.mark_read(&f.admin, &message.id).await.unwrap();
        let again = f.service.mark_read(&f.admin, &message.id).await.unwrap();
        assert_eq!(again.read_by.len(), 1);
        assert!(again.is_read_by(&f.admin.id));
    }
}
