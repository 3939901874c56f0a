use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;

use common::{
    auth::Auth,
    entities::user::{Role, User},
    error::{self, AddCode, ServiceError},
};

use crate::repositories::user::UserRepository;

/// Resolves the bearer token to the stored account. Inactive and deleted
/// accounts fail with 401 even when the token itself is still valid.
pub struct AuthUser(pub User);

impl FromRequest for AuthUser {
    type Error = ServiceError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let token = req
                .headers()
                .get("Authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "));
            let Some(token) = token else {
                return Err(anyhow::anyhow!("Anmeldung erforderlich").code(401));
            };

            let auth = Auth::from_token(token)?;
            let Some(id) = auth.id() else {
                return Err(anyhow::anyhow!("Anmeldung erforderlich").code(401));
            };

            let users = req
                .app_data::<web::Data<UserRepository>>()
                .ok_or_else(|| anyhow::anyhow!("User repository is not configured").code(500))?;
            let Some(user) = users.find(&id).await? else {
                return Err(anyhow::anyhow!("Benutzer nicht gefunden").code(401));
            };
            if !user.is_active {
                return Err(anyhow::anyhow!("Konto ist deaktiviert").code(401));
            }
            Ok(AuthUser(user))
        })
    }
}

pub fn require_admin(user: &User) -> error::Result<()> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Customer => Err(anyhow::anyhow!("Nur für Administratoren").code(403)),
    }
}

pub fn client_ip(req: &HttpRequest) -> Option<String> {
    req.peer_addr().map(|addr| addr.ip().to_string())
}

pub fn user_agent(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("User-Agent")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
