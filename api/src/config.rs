use std::env;

use common::constants::{DEFAULT_BACKEND, DEFAULT_FRONTEND};

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

fn oauth_from_env(id_var: &str, secret_var: &str) -> Option<OAuthConfig> {
    let client_id = env::var(id_var).ok().filter(|v| !v.is_empty())?;
    let client_secret = env::var(secret_var).ok().filter(|v| !v.is_empty())?;
    Some(OAuthConfig {
        client_id,
        client_secret,
    })
}

pub fn google() -> Option<OAuthConfig> {
    oauth_from_env("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET")
}

pub fn github() -> Option<OAuthConfig> {
    oauth_from_env("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET")
}

pub fn frontend_url() -> String {
    env::var("FRONTEND_URL").unwrap_or_else(|_| DEFAULT_FRONTEND.to_string())
}

pub fn backend_url() -> String {
    env::var("BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND.to_string())
}

/// Refuses to start without the variables nothing can run without.
/// Optional integrations only log what is missing.
pub fn validate() -> Result<(), String> {
    for required in ["MONGOURI", "JWT_SECRET"] {
        if env::var(required).map(|v| v.is_empty()).unwrap_or(true) {
            return Err(format!("{} must be set", required));
        }
    }

    if google().is_none() {
        log::warn!("Google OAuth is not configured, /api/oauth/google is disabled");
    }
    if github().is_none() {
        log::warn!("GitHub OAuth is not configured, /api/oauth/github is disabled");
    }
    if env::var("EMAIL_ADDRESS").map(|v| v.is_empty()).unwrap_or(true) {
        log::warn!("EMAIL_ADDRESS is not configured, outbound mail will fail");
    }
    Ok(())
}
