use log::warn;
use mongodb::bson::oid::ObjectId;
use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};

use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::models::Role;
use crate::services::JwtService;

/// Identity taken from a valid `Authorization: Bearer <jwt>` header.
#[derive(Debug, Clone)]
pub struct AuthGuard {
    pub user_id: ObjectId,
    pub email: String,
    pub role: Role,
}

fn bearer_token<'a>(header: &'a str) -> Option<&'a str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(token) = req.headers().get_one("Authorization").and_then(bearer_token) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        match JwtService::verify_token(token) {
            Ok(claims) => match ObjectId::parse_str(&claims.sub) {
                Ok(user_id) => Outcome::Success(AuthGuard {
                    user_id,
                    email: claims.email,
                    role: claims.role,
                }),
                Err(_) => Outcome::Error((Status::Unauthorized, ())),
            },
            Err(e) => {
                warn!("Rejected token on {}: {}", req.uri(), e);
                Outcome::Error((Status::Unauthorized, ()))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        let scheme = SecurityScheme {
            description: Some("Bearer token returned by register or login".to_owned()),
            data: SecuritySchemeData::Http {
                scheme: "bearer".to_owned(),
                bearer_format: Some("JWT".to_owned()),
            },
            extensions: Object::default(),
        };
        let mut requirement = SecurityRequirement::new();
        requirement.insert("BearerAuth".to_owned(), Vec::new());

        Ok(RequestHeaderInput::Security(
            "BearerAuth".to_owned(),
            scheme,
            requirement,
        ))
    }
}
