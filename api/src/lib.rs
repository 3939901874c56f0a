pub mod config;
pub mod extractors;
pub mod handlers;
pub mod rate_limit;
pub mod repositories;
pub mod service;

use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::ServiceFactory;
use actix_web::dev::ServiceRequest;
use actix_web::dev::ServiceResponse;
use actix_web::middleware;
use actix_web::web;
use actix_web::App;

use crate::rate_limit::RateLimiter;
use crate::repositories::contact::ContactRepository;
use crate::repositories::message::MessageRepository;
use crate::repositories::newsletter::{
    SendLogRepository, SubscriberRepository, TemplateRepository,
};
use crate::repositories::project::ProjectRepository;
use crate::repositories::user::UserRepository;
use crate::service::mail::MailerObject;

#[derive(Clone)]
pub struct AppState {
    pub users: UserRepository,
    pub projects: ProjectRepository,
    pub messages: MessageRepository,
    pub contacts: ContactRepository,
    pub subscribers: SubscriberRepository,
    pub templates: TemplateRepository,
    pub send_logs: SendLogRepository,
    pub mailer: MailerObject,
    pub limiter: RateLimiter,
}

impl AppState {
    pub async fn mongo(mongo_uri: &str, mailer: MailerObject) -> Self {
        Self {
            users: UserRepository::mongo(mongo_uri).await,
            projects: ProjectRepository::mongo(mongo_uri).await,
            messages: MessageRepository::mongo(mongo_uri).await,
            contacts: ContactRepository::mongo(mongo_uri).await,
            subscribers: SubscriberRepository::mongo(mongo_uri).await,
            templates: TemplateRepository::mongo(mongo_uri).await,
            send_logs: SendLogRepository::mongo(mongo_uri).await,
            mailer,
            limiter: RateLimiter::in_memory(),
        }
    }
}

pub fn create_app(
    state: AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = actix_web::Error,
    >,
> {
    let cors = Cors::permissive();
    App::new()
        .wrap(cors)
        .wrap(middleware::Logger::default())
        .app_data(web::Data::new(state.users))
        .app_data(web::Data::new(state.projects))
        .app_data(web::Data::new(state.messages))
        .app_data(web::Data::new(state.contacts))
        .app_data(web::Data::new(state.subscribers))
        .app_data(web::Data::new(state.templates))
        .app_data(web::Data::new(state.send_logs))
        .app_data(web::Data::new(state.mailer))
        .app_data(web::Data::new(state.limiter))
        .service(handlers::health)
        .service(handlers::auth::login)
        .service(handlers::auth::profile)
        .service(handlers::auth::logout)
        .service(handlers::oauth::status)
        .service(handlers::oauth::google_redirect)
        .service(handlers::oauth::google_callback)
        .service(handlers::oauth::github_redirect)
        .service(handlers::oauth::github_callback)
        .service(handlers::contact::submit)
        .service(handlers::contact::newsletter_signup)
        .service(handlers::contact::list)
        .service(handlers::contact::mark_replied)
        .service(handlers::contact::statistics)
        .service(handlers::dashboard::overview)
        .service(handlers::dashboard::stats)
        .service(handlers::dashboard::list_projects)
        .service(handlers::dashboard::get_project)
        .service(handlers::dashboard::create_project)
        .service(handlers::dashboard::update_project)
        .service(handlers::dashboard::delete_project)
        .service(handlers::dashboard::list_messages)
        .service(handlers::dashboard::post_message)
        .service(handlers::dashboard::mark_message_read)
        .service(handlers::dashboard::list_customers)
        .service(handlers::dashboard::update_profile)
        .service(handlers::newsletter::subscribe)
        .service(handlers::newsletter::confirm)
        .service(handlers::newsletter::unsubscribe)
        .service(handlers::newsletter::list_subscribers)
        .service(handlers::newsletter::add_subscriber)
        .service(handlers::newsletter::remove_subscriber)
        .service(handlers::newsletter::create_template)
        .service(handlers::newsletter::list_templates)
        .service(handlers::newsletter::get_template)
        .service(handlers::newsletter::update_template)
        .service(handlers::newsletter::preview_template)
        .service(handlers::newsletter::delete_template)
        .service(handlers::newsletter::send_template)
        .service(handlers::newsletter::process_scheduled)
        .service(handlers::newsletter::stats)
        .service(handlers::tracking::track_open)
        .service(handlers::tracking::track_click)
}

#[cfg(test)]
pub(crate) fn test_state() -> (AppState, std::sync::Arc<service::mail::TestMailer>) {
    use std::sync::Arc;

    use common::repository::test_repository::TestRepository;

    use crate::service::mail::TestMailer;

    std::env::set_var("JWT_SECRET", "test-secret");

    let mailer = Arc::new(TestMailer::new());
    let state = AppState {
        users: UserRepository::new(Arc::new(TestRepository::new())),
        projects: ProjectRepository::new(Arc::new(TestRepository::new())),
        messages: MessageRepository::new(Arc::new(TestRepository::new())),
        contacts: ContactRepository::new(Arc::new(TestRepository::new())),
        subscribers: SubscriberRepository::new(Arc::new(TestRepository::new())),
        templates: TemplateRepository::new(Arc::new(TestRepository::new())),
        send_logs: SendLogRepository::new(Arc::new(TestRepository::new())),
        mailer: mailer.clone(),
        limiter: RateLimiter::in_memory(),
    };
    (state, mailer)
}
