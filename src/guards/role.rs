use log::warn;
use rocket::http::Status;
use rocket::request::{self, FromRequest, Outcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};

use crate::guards::AuthGuard;
use crate::models::Role;

/// An authenticated caller whose token carries the worker role. Other roles
/// are refused with 403.
pub struct WorkerGuard {
    pub auth: AuthGuard,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for WorkerGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.guard::<AuthGuard>().await {
            Outcome::Success(auth) if auth.role == Role::Worker => {
                Outcome::Success(WorkerGuard { auth })
            }
            Outcome::Success(auth) => {
                warn!("{} refused: user {} is not a worker", req.uri(), auth.user_id);
                Outcome::Error((Status::Forbidden, ()))
            }
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(f) => Outcome::Forward(f),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for WorkerGuard {
    fn from_request_input(
        generator: &mut OpenApiGenerator,
        name: String,
        required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        AuthGuard::from_request_input(generator, name, required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::JwtService;
    use mongodb::bson::oid::ObjectId;
    use rocket::http::Header;
    use rocket::local::asynchronous::Client;

    #[get("/worker-only")]
    fn worker_only(guard: WorkerGuard) -> String {
        guard.auth.user_id.to_hex()
    }

    async fn call_as(role: Option<Role>) -> Status {
        let client = Client::untracked(rocket::build().mount("/", routes![worker_only]))
            .await
            .unwrap();
        let mut request = client.get("/worker-only");
        if let Some(role) = role {
            let token = JwtService::generate_token(&ObjectId::new(), "a@b.co", role).unwrap();
            request = request.header(Header::new("Authorization", format!("Bearer {}", token)));
        }
        request.dispatch().await.status()
    }

    #[rocket::async_test]
    async fn only_workers_pass() {
        assert_eq!(call_as(Some(Role::Worker)).await, Status::Ok);
        assert_eq!(call_as(Some(Role::Client)).await, Status::Forbidden);
        assert_eq!(call_as(None).await, Status::Unauthorized);
    }
}
