use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use common::{
    auth::create_token,
    entities::user::{PublicUser, Role, User},
    error::{self, AddCode},
};

use crate::{
    config,
    rate_limit::RateLimiter,
    repositories::user::UserRepository,
    service::mail::{generate_password, strip_tags, Letter, MailerObject},
};

pub const GENERATED_PASSWORD_LENGTH: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmAccountCreation", default)]
    pub confirm_account_creation: bool,
}

#[derive(Debug)]
pub enum LoginOutcome {
    /// Unknown email, caller has not opted into account creation yet.
    RequiresConfirmation { email: String },
    AccountCreated { email: String, email_sent: bool },
    LoggedIn { token: String, user: PublicUser },
}

pub struct AuthService {
    users: UserRepository,
    mailer: MailerObject,
    limiter: RateLimiter,
}

impl AuthService {
    pub fn new(users: UserRepository, mailer: MailerObject, limiter: RateLimiter) -> Self {
        Self {
            users,
            mailer,
            limiter,
        }
    }

    pub fn hash_password(password: &str, salt: &str) -> String {
        sha256::digest(format!("{}{}", password, salt))
    }

    fn verify(user: &User, password: &str) -> bool {
        !user.password.is_empty() && Self::hash_password(password, &user.salt) == user.password
    }

    fn credentials_letter(email: &str, password: &str) -> Letter {
        let html = include_str!("../../templates/credentials.html")
            .replace("{email}", email)
            .replace("{password}", password)
            .replace("{frontendUrl}", &config::frontend_url());
        Letter {
            email: email.to_string(),
            subject: "Ihre Zugangsdaten - Kunden-Dashboard".to_string(),
            text: strip_tags(&html),
            html,
        }
    }

    /// Creates a customer account with a generated password and assigns it
    /// to the longest-serving active admin.
    async fn provision_customer(&self, email: &str) -> error::Result<(User, String)> {
        let password = generate_password(GENERATED_PASSWORD_LENGTH);
        let salt: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();

        let mut user = User::empty(email);
        user.password = Self::hash_password(&password, &salt);
        user.salt = salt;
        user.assigned_admin = self
            .users
            .oldest_active_admin()
            .await?
            .map(|admin| admin.id);

        if !self.users.create(&user).await? {
            return Err(anyhow::anyhow!("E-Mail-Adresse bereits registriert").code(409));
        }
        Ok((user, password))
    }

    pub async fn login(&self, request: &LoginRequest, ip: &str) -> error::Result<LoginOutcome> {
        let email = request.email.trim().to_lowercase();
        if email.is_empty() || request.password.is_empty() {
            return Err(anyhow::anyhow!("E-Mail und Passwort sind erforderlich").code(400));
        }
        self.limiter.login(ip)?;

        let Some(mut user) = self.users.find_by_email(&email).await? else {
            if !request.confirm_account_creation {
                return Ok(LoginOutcome::RequiresConfirmation { email });
            }

            self.limiter.account_creation(ip)?;
            self.limiter.account_creation_per_email(&email)?;

            let (user, password) = self.provision_customer(&email).await?;
            let email_sent = match self
                .mailer
                .send(&Self::credentials_letter(&user.email, &password))
                .await
            {
                Ok(_) => true,
                Err(err) => {
                    log::error!("Failed to mail credentials to {}: {}", user.email, err);
                    false
                }
            };
            return Ok(LoginOutcome::AccountCreated {
                email: user.email,
                email_sent,
            });
        };

        if !user.is_active || !Self::verify(&user, &request.password) {
            return Err(anyhow::anyhow!("Ungültige Anmeldedaten").code(400));
        }

        user.last_login = Utc::now();
        self.users.update(&user).await?;

        let token = create_token(&user)?;
        Ok(LoginOutcome::LoggedIn {
            token,
            user: user.into(),
        })
    }

    /// Seeds the admin account from ADMIN_EMAIL and ADMIN_PASSWORD on
    /// startup. Does nothing when the account already exists.
    pub async fn ensure_admin_account(&self) -> error::Result<()> {
        let (Ok(email), Ok(password)) = (
            std::env::var("ADMIN_EMAIL"),
            std::env::var("ADMIN_PASSWORD"),
        ) else {
            log::warn!("ADMIN_EMAIL or ADMIN_PASSWORD is not set, skipping admin bootstrap");
            return Ok(());
        };

        if self.users.find_by_email(&email).await?.is_some() {
            return Ok(());
        }

        let salt: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(10)
            .map(char::from)
            .collect();
        let mut admin = User::empty(&email);
        admin.role = Role::Admin;
        admin.password = Self::hash_password(&password, &salt);
        admin.salt = salt;
        admin.is_email_verified = true;

        self.users.create(&admin).await?;
        log::info!("Created admin account {}", admin.email);
        Ok(())
    }
}
