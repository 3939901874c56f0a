use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use common::{
    access_rules::{AccessRules, Edit, Read},
    auth::Auth,
    entities::{
        project::{Project, ProjectKind, ProjectPriority, ProjectStatus},
        user::{Role, User},
    },
    error::{self, AddCode},
};

use crate::repositories::{
    message::MessageRepository, project::ProjectRepository, user::UserRepository,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub kind: ProjectKind,
    pub customer_id: ObjectId,
    pub deadline: DateTime<Utc>,
    pub description: Option<String>,
    pub priority: Option<ProjectPriority>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectChange {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<ProjectPriority>,
    pub deadline: Option<DateTime<Utc>>,
    pub progress: Option<u32>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_projects: usize,
    pub active_projects: usize,
    pub completed_projects: usize,
    pub total_messages: usize,
    pub unread_messages: usize,
    /// Only filled for admins.
    pub total_customers: Option<usize>,
}

fn auth_for(user: &User) -> Auth {
    match user.role {
        Role::Admin => Auth::Admin(user.id),
        Role::Customer => Auth::Customer(user.id),
    }
}

#[derive(Clone)]
pub struct ProjectService {
    users: UserRepository,
    projects: ProjectRepository,
    messages: MessageRepository,
}

impl ProjectService {
    pub fn new(
        users: UserRepository,
        projects: ProjectRepository,
        messages: MessageRepository,
    ) -> Self {
        Self {
            users,
            projects,
            messages,
        }
    }

    pub async fn list_for(&self, user: &User) -> error::Result<Vec<Project>> {
        self.projects.for_user(user).await
    }

    /// Non-owned projects read as missing, not as forbidden.
    pub async fn find_for(&self, user: &User, id: &ObjectId) -> error::Result<Project> {
        let project = self.projects.find(id).await?;
        match project {
            Some(project)
                if project.is_active && Read::get_access(&auth_for(user), &project) =>
            {
                Ok(project)
            }
            _ => Err(anyhow::anyhow!("Projekt nicht gefunden").code(404)),
        }
    }

    pub async fn create(&self, admin: &User, request: CreateProject) -> error::Result<Project> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(anyhow::anyhow!("Projektname ist erforderlich").code(400));
        }

        let customer = self.users.find(&request.customer_id).await?;
        let Some(customer) = customer.filter(|customer| {
            customer.is_active
                && customer.role == Role::Customer
                && customer.assigned_admin == Some(admin.id)
        }) else {
            return Err(anyhow::anyhow!("Kunde nicht gefunden oder nicht zugeordnet").code(400));
        };

        let mut project = Project::new(
            name.to_string(),
            request.kind,
            customer.id,
            admin.id,
            request.deadline,
        );
        project.description = request.description;
        if let Some(priority) = request.priority {
            project.priority = priority;
        }
        if let Some(tags) = request.tags {
            project.tags = tags;
        }

        self.projects.create(&project).await?;
        Ok(project)
    }

    pub async fn update(
        &self,
        admin: &User,
        id: &ObjectId,
        change: ProjectChange,
    ) -> error::Result<Project> {
        let Some(mut project) = self.projects.find(id).await? else {
            return Err(anyhow::anyhow!("Projekt nicht gefunden").code(404));
        };
        if !project.is_active || !Edit::get_access(&auth_for(admin), &project) {
            return Err(anyhow::anyhow!("Projekt nicht gefunden").code(404));
        }

        if let Some(name) = change.name {
            project.name = name;
        }
        if let Some(description) = change.description {
            project.description = Some(description);
        }
        if let Some(priority) = change.priority {
            project.priority = priority;
        }
        if let Some(deadline) = change.deadline {
            project.deadline = deadline;
        }
        if let Some(tags) = change.tags {
            project.tags = tags;
        }
        if let Some(status) = change.status {
            project.set_status(status);
        }
        if let Some(progress) = change.progress {
            project.set_progress(progress);
        }
        project.updated_at = Utc::now();

        self.projects.update(&project).await?;
        Ok(project)
    }

    pub async fn deactivate(&self, admin: &User, id: &ObjectId) -> error::Result<()> {
        let Some(mut project) = self.projects.find(id).await? else {
            return Err(anyhow::anyhow!("Projekt nicht gefunden").code(404));
        };
        if !Edit::get_access(&auth_for(admin), &project) {
            return Err(anyhow::anyhow!("Projekt nicht gefunden").code(404));
        }
        project.is_active = false;
        project.updated_at = Utc::now();
        self.projects.update(&project).await?;
        Ok(())
    }

    pub async fn stats_for(&self, user: &User) -> error::Result<DashboardStats> {
        let projects = self.projects.for_user(user).await?;
        let total_messages = self.messages.for_user(user).await?.len();
        let unread_messages = self.messages.unread_count_for(user).await?;
        let total_customers = match user.role {
            Role::Admin => Some(self.users.customers_of(&user.id).await?.len()),
            Role::Customer => None,
        };

        Ok(DashboardStats {
            total_projects: projects.len(),
            active_projects: projects
                .iter()
                .filter(|p| {
                    matches!(
                        p.status,
                        ProjectStatus::Planning | ProjectStatus::InProgress | ProjectStatus::Review
                    )
                })
                .count(),
            completed_projects: projects
                .iter()
                .filter(|p| p.status == ProjectStatus::Completed)
                .count(),
            total_messages,
            unread_messages,
            total_customers,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::repository::test_repository::TestRepository;

    use super::*;

    fn service() -> ProjectService {
        ProjectService::new(
            UserRepository::new(Arc::new(TestRepository::new())),
            ProjectRepository::new(Arc::new(TestRepository::new())),
            MessageRepository::new(Arc::new(TestRepository::new())),
        )
    }

    async fn admin(service: &ProjectService) -> User {
        let mut admin = User::empty("admin@example.com");
        admin.role = Role::Admin;
        service.users.create(&admin).await.unwrap();
        admin
    }

    async fn customer_of(service: &ProjectService, admin: &User, email: &str) -> User {
        let mut customer = User::empty(email);
        customer.assigned_admin = Some(admin.id);
        service.users.create(&customer).await.unwrap();
        customer
    }

    fn create_request(customer: &User) -> CreateProject {
        CreateProject {
            name: "Website Relaunch".to_string(),
            kind: ProjectKind::Website,
            customer_id: customer.id,
            deadline: Utc::now() + chrono::Duration::days(30),
            description: None,
            priority: None,
            tags: None,
        }
    }

    #[actix_web::test]
    async fn admin_creates_project_for_own_customer_only() {
        let service = service();
        let admin_user = admin(&service).await;
        let customer = customer_of(&service, &admin_user, "kunde@example.com").await;

        let project = service
            .create(&admin_user, create_request(&customer))
            .await
            .unwrap();
        assert_eq!(project.status, ProjectStatus::Planning);
        assert_eq!(project.customer_id, customer.id);

        // A customer of some other admin is out of reach.
        let mut stranger = User::empty("fremd@example.com");
        stranger.assigned_admin = Some(ObjectId::new());
        service.users.create(&stranger).await.unwrap();
        let err = service
            .create(&admin_user, create_request(&stranger))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[actix_web::test]
    async fn foreign_project_reads_as_missing() {
        let service = service();
        let admin_user = admin(&service).await;
        let customer = customer_of(&service, &admin_user, "kunde@example.com").await;
        let other = customer_of(&service, &admin_user, "andere@example.com").await;

        let project = service
            .create(&admin_user, create_request(&customer))
            .await
            .unwrap();

        assert!(service.find_for(&customer, &project.id).await.is_ok());
        let err = service.find_for(&other, &project.id).await.unwrap_err();
        assert_eq!(err.code(), 404);
    }

    #[actix_web::test]
    async fn progress_and_status_stay_coupled() {
        let service = service();
        let admin_user = admin(&service).await;
        let customer = customer_of(&service, &admin_user, "kunde@example.com").await;
        let project = service
            .create(&admin_user, create_request(&customer))
            .await
            .unwrap();

        let updated = service
            .update(
                &admin_user,
                &project.id,
                ProjectChange {
                    progress: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ProjectStatus::Completed);

        let stats = service.stats_for(&admin_user).await.unwrap();
        assert_eq!(stats.completed_projects, 1);
        assert_eq!(stats.active_projects, 0);
        assert_eq!(stats.total_customers, Some(2));
    }

    #[actix_web::test]
    async fn deactivated_project_disappears_from_listings() {
        let service = service();
        let admin_user = admin(&service).await;
        let customer = customer_of(&service, &admin_user, "kunde@example.com").await;
        let project = service
            .create(&admin_user, create_request(&customer))
            .await
            .unwrap();

        service.deactivate(&admin_user, &project.id).await.unwrap();
        assert!(service.list_for(&customer).await.unwrap().is_empty());
        let err = service.find_for(&customer, &project.id).await.unwrap_err();
        assert_eq!(err.code(), 404);
    }
}
