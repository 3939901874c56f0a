use reqwest::{header, Client};
use serde::{Deserialize, Serialize};

use crate::error::{self, AddCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
        }
    }
}

/// Normalized identity returned by either provider.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthProfile {
    pub provider: OAuthProvider,
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
struct GoogleTokenRequest<'a> {
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

pub async fn fetch_google_profile(
    code: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
) -> error::Result<OAuthProfile> {
    let client = Client::new();

    let access_response = client
        .post("https://oauth2.googleapis.com/token")
        .form(&GoogleTokenRequest {
            code,
            client_id,
            client_secret,
            redirect_uri,
            grant_type: "authorization_code",
        })
        .send()
        .await?
        .text()
        .await?;
    let access_json: GoogleTokenResponse = serde_json::from_str(&access_response)
        .map_err(|_| anyhow::anyhow!("Google rejected the authorization code").code(401))?;

    let user_response = client
        .get("https://www.googleapis.com/oauth2/v2/userinfo")
        .header(header::ACCEPT, "application/json")
        .bearer_auth(access_json.access_token)
        .send()
        .await?
        .text()
        .await?;
    let user: GoogleUserInfo = serde_json::from_str(&user_response)?;

    let Some(email) = user.email else {
        return Err(anyhow::anyhow!("Google account exposes no email").code(404));
    };

    Ok(OAuthProfile {
        provider: OAuthProvider::Google,
        provider_id: user.id,
        email,
        name: user.name,
        avatar: user.picture,
    })
}

#[derive(Debug, Deserialize)]
struct GithubAccessResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GithubUserData {
    id: i64,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUserEmail {
    email: String,
    primary: bool,
}

pub async fn fetch_github_profile(
    code: &str,
    client_id: &str,
    client_secret: &str,
) -> error::Result<OAuthProfile> {
    let client = Client::new();

    let access_response = client
        .post(format!(
            "https://github.com/login/oauth/access_token?code={}&client_id={}&client_secret={}",
            code, client_id, client_secret,
        ))
        .header(header::ACCEPT, "application/json")
        .send()
        .await?
        .text()
        .await?;
    let access_json: GithubAccessResponse = serde_json::from_str(&access_response)
        .map_err(|_| anyhow::anyhow!("GitHub rejected the authorization code").code(401))?;
    let access_token = access_json.access_token;

    let user_response = client
        .get("https://api.github.com/user")
        .header(header::ACCEPT, "application/json")
        .header("User-Agent", "portfolio-backend")
        .bearer_auth(access_token.clone())
        .send()
        .await?
        .text()
        .await?;
    let user: GithubUserData = serde_json::from_str(&user_response)?;

    // The profile email may be hidden. The emails endpoint still lists the
    // primary address for the granted scope.
    let email = match user.email {
        Some(email) => email,
        None => {
            let emails_response = client
                .get("https://api.github.com/user/emails")
                .header(header::ACCEPT, "application/json")
                .header("User-Agent", "portfolio-backend")
                .bearer_auth(access_token)
                .send()
                .await?
                .text()
                .await?;
            let emails: Vec<GithubUserEmail> = serde_json::from_str(&emails_response)?;
            let Some(primary) = emails.into_iter().find(|email| email.primary) else {
                return Err(anyhow::anyhow!("No email found").code(404));
            };
            primary.email
        }
    };

    Ok(OAuthProfile {
        provider: OAuthProvider::GitHub,
        provider_id: user.id.to_string(),
        email,
        name: user.name,
        avatar: user.avatar_url,
    })
}
