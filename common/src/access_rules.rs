use crate::{
    auth::Auth,
    entities::{message::Message, project::Project},
};

pub trait AccessRules<Object, Subject> {
    fn get_access(object: Object, subject: Subject) -> bool;
}

pub struct Read;
pub struct Edit;

impl AccessRules<&Auth, &Project> for Read {
    fn get_access(auth: &Auth, project: &Project) -> bool {
        match auth {
            Auth::Admin(id) => &project.assigned_admin == id,
            Auth::Customer(id) => &project.customer_id == id,
            Auth::None => false,
        }
    }
}

impl AccessRules<&Auth, &Project> for Edit {
    fn get_access(auth: &Auth, project: &Project) -> bool {
        match auth {
            Auth::Admin(id) => &project.assigned_admin == id,
            Auth::Customer(_) | Auth::None => false,
        }
    }
}

impl AccessRules<&Auth, &Message> for Read {
    fn get_access(auth: &Auth, message: &Message) -> bool {
        match auth {
            Auth::Admin(_) => true,
            Auth::Customer(id) => &message.customer_id == id,
            Auth::None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mongodb::bson::oid::ObjectId;

    use super::*;
    use crate::entities::project::{Project, ProjectKind};

    #[test]
    fn project_is_visible_to_its_parties_only() {
        let admin = ObjectId::new();
        let customer = ObjectId::new();
        let project = Project::new(
            "Site".to_string(),
            ProjectKind::Website,
            customer,
            admin,
            Utc::now(),
        );

        assert!(Read::get_access(&Auth::Admin(admin), &project));
        assert!(Read::get_access(&Auth::Customer(customer), &project));
        assert!(!Read::get_access(&Auth::Admin(ObjectId::new()), &project));
        assert!(!Read::get_access(&Auth::Customer(ObjectId::new()), &project));
        assert!(!Read::get_access(&Auth::None, &project));
    }

    #[test]
    fn only_the_assigned_admin_edits() {
        let admin = ObjectId::new();
        let customer = ObjectId::new();
        let project = Project::new(
            "Site".to_string(),
            ProjectKind::Website,
            customer,
            admin,
            Utc::now(),
        );

        assert!(Edit::get_access(&Auth::Admin(admin), &project));
        assert!(!Edit::get_access(&Auth::Customer(customer), &project));
    }
}
