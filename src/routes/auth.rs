use log::{error, info, warn};
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::DbConn;
use crate::models::{
    normalize_skills, Client, LoginDto, RegisterDto, Role, User, UserResponse, Worker,
};
use crate::routes::commit;
use crate::services::{JwtService, PasswordService};
use crate::utils::{
    is_duplicate_key, normalize_email, validate_phone, ApiError, ApiResponse, Created,
    WorkflowError,
};

fn issue_token(user: &User) -> Result<String, ApiError> {
    JwtService::generate_token(&user.id, &user.email, user.role).map_err(|e| {
        error!("Failed to sign token for {}: {}", user.id, e);
        ApiError::internal_error()
    })
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn duplicate_email(e: mongodb::error::Error) -> ApiError {
    if is_duplicate_key(&e) {
        WorkflowError::DuplicateEmail.into()
    } else {
        e.into()
    }
}

#[openapi(tag = "Auth")]
#[post("/users/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<Created<serde_json::Value>, ApiError> {
    let mut dto = dto.into_inner();
    dto.normalize();
    dto.validate()?;

    let phone = trimmed(dto.phone);
    if phone.as_deref().is_some_and(|p| !validate_phone(p)) {
        return Err(ApiError::bad_request("Invalid phone number"));
    }

    let email = dto.email;
    if db.users().find_one(doc! { "email": &email }, None).await?.is_some() {
        return Err(WorkflowError::DuplicateEmail.into());
    }

    let password_hash = PasswordService::hash(dto.password).await?;

    let now = DateTime::now();
    let user = User {
        id: ObjectId::new(),
        role: dto.role,
        name: dto.name,
        email,
        phone,
        county: trimmed(dto.county),
        town: trimmed(dto.town),
        area: trimmed(dto.area),
        password_hash,
        profile_image: None,
        created_at: now,
        updated_at: now,
    };

    let mut session = db.start_transaction().await?;

    db.users()
        .insert_one_with_session(&user, None, &mut session)
        .await
        .map_err(duplicate_email)?;

    let mut response = UserResponse::from(user.clone());
    match user.role {
        Role::Worker => {
            let mut worker = Worker::new(user.id);
            worker.skills = normalize_skills(dto.skills);
            worker.expertise = dto.expertise.unwrap_or_default();
            worker.bio = trimmed(dto.bio);
            worker.hourly_rate = dto.hourly_rate;

            db.workers()
                .insert_one_with_session(&worker, None, &mut session)
                .await?;
            response.worker_profile = Some(worker.into());
        }
        Role::Client => {
            let client = Client::new(user.id);
            db.clients()
                .insert_one_with_session(&client, None, &mut session)
                .await?;
            response.client_profile = Some(client.into());
        }
    }

    commit(session).await?;

    let token = issue_token(&user)?;
    info!("Registered {} {}", user.role.as_str(), user.id);

    Ok(Created(ApiResponse::success_with_message(
        "User registered successfully",
        serde_json::json!({
            "token": token,
            "user": response
        }),
    )))
}

#[openapi(tag = "Auth")]
#[post("/users/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let dto = dto.into_inner();
    let email = normalize_email(&dto.email);

    let Some(user) = db.users().find_one(doc! { "email": &email }, None).await? else {
        warn!("Login attempt for unknown email");
        return Err(WorkflowError::InvalidCredentials.into());
    };

    if !PasswordService::verify(dto.password, user.password_hash.clone()).await? {
        warn!("Password mismatch for user {}", user.id);
        return Err(WorkflowError::InvalidCredentials.into());
    }

    let token = issue_token(&user)?;

    Ok(Json(ApiResponse::success_with_message(
        "Login successful",
        serde_json::json!({
            "token": token,
            "user": UserResponse::from(user)
        }),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{self, send};
    use rocket::http::{Method, Status};
    use serde_json::json;

    fn auth_routes() -> Vec<rocket::Route> {
        routes![register, login]
    }

    #[rocket::async_test]
    #[ignore = "needs a MongoDB replica set in MONGODB_URI"]
    async fn registration_is_all_or_nothing() {
        let client = testing::client(auth_routes()).await;
        let db = testing::db(&client);

        // Every client profile insert now fails after the user insert.
        db.database()
            .run_command(
                doc! {
                    "collMod": "clients",
                    "validator": { "never_present": { "$exists": true } },
                    "validationAction": "error"
                },
                None,
            )
            .await
            .unwrap();

        let (status, body) = send(
            &client,
            Method::Post,
            "/api/users/register",
            None,
            Some(json!({
                "role": "client",
                "name": "Ana",
                "email": "ana@example.com",
                "password": "secret1"
            })),
        )
        .await;
        assert_eq!(status, Status::InternalServerError);
        assert_eq!(body["message"], "Server error");

        let users = db
            .users()
            .count_documents(doc! { "email": "ana@example.com" }, None)
            .await
            .unwrap();
        assert_eq!(users, 0);

        let (status, _) = send(
            &client,
            Method::Post,
            "/api/users/login",
            None,
            Some(json!({ "email": "ana@example.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);

        // Worker registration touches another collection and still succeeds.
        let bo = testing::register(&client, "worker", "Bo", "bo@example.com").await;
        let workers = db
            .workers()
            .count_documents(doc! { "user_id": bo.user_id() }, None)
            .await
            .unwrap();
        assert_eq!(workers, 1);

        testing::cleanup(client).await;
    }

    #[rocket::async_test]
    #[ignore = "needs a MongoDB replica set in MONGODB_URI"]
    async fn emails_are_normalized_and_names_required() {
        let client = testing::client(auth_routes()).await;

        let ana = testing::register(&client, "client", " Ana ", " Ana@Example.com ").await;
        assert_eq!(ana.user["email"], "ana@example.com");
        assert_eq!(ana.user["name"], "Ana");
        assert!(ana.user["clientProfile"]["id"].is_string());

        let (status, body) = send(
            &client,
            Method::Post,
            "/api/users/register",
            None,
            Some(json!({
                "role": "worker",
                "name": "Ana again",
                "email": "ANA@example.com",
                "password": "secret1"
            })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], "User already exists");

        let (status, body) = send(
            &client,
            Method::Post,
            "/api/users/register",
            None,
            Some(json!({
                "role": "client",
                "name": "   ",
                "email": "blank@example.com",
                "password": "secret1"
            })),
        )
        .await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], "Name is required");

        let (status, body) = send(
            &client,
            Method::Post,
            "/api/users/login",
            None,
            Some(json!({ "email": " ana@EXAMPLE.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, Status::Ok, "{}", body);
        assert!(body["data"]["token"].is_string());

        testing::cleanup(client).await;
    }
}
