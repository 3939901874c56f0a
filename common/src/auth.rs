use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{
    constants::TOKEN_DURATION,
    entities::user::{Role, User},
    error::{self, AddCode},
};

static ENCODING_KEY: Lazy<EncodingKey> = Lazy::new(|| {
    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    EncodingKey::from_secret(secret.as_bytes())
});

static DECODING_KEY: Lazy<DecodingKey> = Lazy::new(|| {
    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    DecodingKey::from_secret(secret.as_bytes())
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub exp: i64,
}

/// Identity carried by a request, recovered from its bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Admin(ObjectId),
    Customer(ObjectId),
    None,
}

impl Auth {
    pub fn id(&self) -> Option<ObjectId> {
        match self {
            Auth::Admin(id) | Auth::Customer(id) => Some(*id),
            Auth::None => None,
        }
    }

    pub fn from_token(token: &str) -> error::Result<Self> {
        let data = decode::<Claims>(token, &DECODING_KEY, &Validation::new(Algorithm::HS512))
            .map_err(|err| anyhow::anyhow!("Invalid token: {}", err).code(401))?;
        let id = ObjectId::parse_str(&data.claims.user_id)
            .map_err(|_| anyhow::anyhow!("Invalid token subject").code(401))?;
        Ok(match data.claims.role {
            Role::Admin => Auth::Admin(id),
            Role::Customer => Auth::Customer(id),
        })
    }
}

pub fn create_token(user: &User) -> error::Result<String> {
    let header = Header {
        alg: Algorithm::HS512,
        ..Default::default()
    };
    let claims = Claims {
        user_id: user.id.to_hex(),
        email: user.email.clone(),
        role: user.role,
        exp: Utc::now().timestamp() + TOKEN_DURATION.num_seconds(),
    };
    encode(&header, &claims, &ENCODING_KEY)
        .map_err(|err| anyhow::anyhow!("Failed to sign token: {}", err).code(500))
}
