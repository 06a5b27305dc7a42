use log::info;
use mongodb::bson::doc;
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{
    Expertise, ProfileChanges, Role, UpdateWorkerProfileDto, User, UserResponse,
};
use crate::routes::{commit, find_client_by_user, find_worker_by_user};
use crate::services::SharedStorage;
use crate::utils::{split_csv, validate_phone, ApiError, ApiResponse, WorkflowError};

async fn load_user(db: &DbConn, auth: &AuthGuard) -> Result<User, ApiError> {
    db.users()
        .find_one(doc! { "_id": auth.user_id }, None)
        .await?
        .ok_or_else(|| WorkflowError::NotFound("User").into())
}

#[openapi(tag = "Users")]
#[get("/users/profile")]
pub async fn get_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = load_user(db, &auth).await?;
    let role = user.role;
    let mut response = UserResponse::from(user);

    match role {
        Role::Worker => {
            response.worker_profile = find_worker_by_user(db, auth.user_id).await?.map(Into::into);
        }
        Role::Client => {
            response.client_profile = find_client_by_user(db, auth.user_id).await?.map(Into::into);
        }
    }

    Ok(Json(ApiResponse::success(serde_json::json!({ "user": response }))))
}

/// Multipart or urlencoded body of `PUT /users/profile`. Blank fields are
/// treated as absent.
#[derive(FromForm)]
pub struct ProfileForm<'r> {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub county: Option<String>,
    pub town: Option<String>,
    pub area: Option<String>,
    // Worker-only fields
    pub bio: Option<String>,
    #[field(name = "hourlyRate")]
    pub hourly_rate: Option<i32>,
    /// Comma-separated.
    pub skills: Option<String>,
    pub expertise: Option<String>,
    #[field(name = "profileImage")]
    pub profile_image: Option<TempFile<'r>>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ProfileForm<'_> {
    fn user_changes(&self) -> Result<ProfileChanges, WorkflowError> {
        let phone = non_blank(&self.phone);
        if phone.as_deref().is_some_and(|p| !validate_phone(p)) {
            return Err(WorkflowError::Validation("Invalid phone number".to_string()));
        }

        Ok(ProfileChanges {
            name: non_blank(&self.name),
            phone,
            county: non_blank(&self.county),
            town: non_blank(&self.town),
            area: non_blank(&self.area),
            profile_image: None,
        })
    }

    fn worker_changes(&self) -> Result<UpdateWorkerProfileDto, WorkflowError> {
        let expertise = non_blank(&self.expertise)
            .map(|e| e.parse::<Expertise>())
            .transpose()?;

        let dto = UpdateWorkerProfileDto {
            skills: self.skills.as_deref().map(split_csv),
            expertise,
            bio: non_blank(&self.bio),
            hourly_rate: self.hourly_rate,
            availability: None,
        };
        dto.validate()?;
        Ok(dto)
    }
}

/// Not part of the OpenAPI document: okapi cannot describe multipart forms.
#[put("/users/profile", data = "<form>")]
pub async fn update_profile(
    db: &State<DbConn>,
    storage: &State<SharedStorage>,
    auth: AuthGuard,
    mut form: Form<ProfileForm<'_>>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut changes = form.user_changes()?;
    let worker_changes = match auth.role {
        Role::Worker => Some(form.worker_changes()?),
        Role::Client => None,
    };

    if let Some(file) = form.profile_image.as_mut().filter(|f| f.len() > 0) {
        changes.profile_image = Some(storage.store_image(file).await?);
    }

    let mut session = db.start_transaction().await?;

    let result = db
        .users()
        .update_one_with_session(
            doc! { "_id": auth.user_id },
            doc! { "$set": changes.to_set_document() },
            None,
            &mut session,
        )
        .await?;
    if result.matched_count == 0 {
        return Err(WorkflowError::NotFound("User").into());
    }

    if let Some(dto) = worker_changes.filter(|dto| !dto.is_empty()) {
        db.workers()
            .update_one_with_session(
                doc! { "user_id": auth.user_id },
                doc! { "$set": dto.to_set_document() },
                None,
                &mut session,
            )
            .await?;
    }

    commit(session).await?;
    info!("Profile updated for user {}", auth.user_id);

    let user = load_user(db, &auth).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully",
        serde_json::json!({ "user": UserResponse::from(user) }),
    )))
}
