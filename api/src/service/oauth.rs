use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

use common::{
    api::oauth::{OAuthProfile, OAuthProvider},
    entities::user::User,
    error,
};

use crate::{
    config,
    repositories::user::UserRepository,
    service::{
        auth::AuthService,
        mail::{generate_password, strip_tags, Letter, MailerObject},
    },
};

pub struct OAuthService {
    users: UserRepository,
    mailer: MailerObject,
}

impl OAuthService {
    pub fn new(users: UserRepository, mailer: MailerObject) -> Self {
        Self { users, mailer }
    }

    fn welcome_letter(user: &User, provider: OAuthProvider) -> Letter {
        let name = user
            .first_name
            .as_deref()
            .map(|n| format!(" {}", n))
            .unwrap_or_default();
        let html = include_str!("../../templates/oauth_welcome.html")
            .replace("{name}", &name)
            .replace("{provider}", provider.as_str())
            .replace("{frontendUrl}", &config::frontend_url());
        Letter {
            email: user.email.clone(),
            subject: "Willkommen - Ihr Konto wurde erstellt".to_string(),
            text: strip_tags(&html),
            html,
        }
    }

    fn set_provider_id(user: &mut User, profile: &OAuthProfile) -> bool {
        let slot = match profile.provider {
            OAuthProvider::Google => &mut user.google_id,
            OAuthProvider::GitHub => &mut user.github_id,
        };
        if slot.is_none() {
            *slot = Some(profile.provider_id.clone());
            return true;
        }
        false
    }

    /// Find-or-create by email. Existing accounts get the provider id and
    /// avatar backfilled, new ones start as customers of the oldest admin.
    pub async fn resolve(&self, profile: &OAuthProfile) -> error::Result<(User, bool)> {
        let email = profile.email.to_lowercase();

        if let Some(mut user) = self.users.find_by_email(&email).await? {
            Self::set_provider_id(&mut user, profile);
            if user.avatar.is_none() {
                user.avatar = profile.avatar.clone();
            }
            user.is_email_verified = true;
            user.last_login = Utc::now();
            self.users.update(&user).await?;
            return Ok((user, false));
        }

        // Provider-created accounts still get a local password so the user
        // could recover access by the normal login path later.
        let password = generate_password(crate::service::auth::GENERATED_PASSWORD_LENGTH);
        let salt: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();

        let mut user = User::empty(&email);
        user.password = AuthService::hash_password(&password, &salt);
        user.salt = salt;
        user.first_name = profile.name.clone();
        user.avatar = profile.avatar.clone();
        user.is_email_verified = true;
        user.assigned_admin = self
            .users
            .oldest_active_admin()
            .await?
            .map(|admin| admin.id);
        Self::set_provider_id(&mut user, profile);

        self.users.create(&user).await?;

        if let Err(err) = self
            .mailer
            .send(&Self::welcome_letter(&user, profile.provider))
            .await
        {
            log::error!("Failed to send welcome mail to {}: {}", user.email, err);
        }

        Ok((user, true))
    }
}
