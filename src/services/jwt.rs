use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::models::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

pub struct JwtService;

impl JwtService {
    pub fn generate_token(
        user_id: &ObjectId,
        email: &str,
        role: Role,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        Self::sign(user_id, email, role, &crate::config::Config::jwt_secret())
    }

    pub fn verify_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        Self::verify(token, &crate::config::Config::jwt_secret())
    }

    fn sign(
        user_id: &ObjectId,
        email: &str,
        role: Role,
        secret: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: user_id.to_hex(),
            email: email.to_string(),
            role,
            iat: now,
            exp: now + crate::config::Config::jwt_expiry(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    fn verify(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}
