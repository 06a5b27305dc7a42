use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::models::{format_datetime, ClientResponse, Expertise, WorkerResponse};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Worker,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::Client => "client",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
pub struct Location {
    pub county: Option<String>,
    pub town: Option<String>,
    pub area: Option<String>,
}

impl Location {
    pub fn is_complete(&self) -> bool {
        [&self.county, &self.town, &self.area]
            .iter()
            .all(|part| part.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub county: Option<String>,
    pub town: Option<String>,
    pub area: Option<String>,
    pub password_hash: String,
    pub profile_image: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl RegisterDto {
    /// Trims the fields that are validated and stored trimmed, so a padded
    /// email is accepted and a blank name is not.
    pub fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.email = crate::utils::normalize_email(&self.email);
    }
}

impl User {
    pub fn location(&self) -> Location {
        Location {
            county: self.county.clone(),
            town: self.town.clone(),
            area: self.area.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDto {
    pub role: Role,
    #[validate(custom(function = "crate::utils::non_blank", message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub phone: Option<String>,
    pub county: Option<String>,
    pub town: Option<String>,
    pub area: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    // Worker registration only
    #[serde(default)]
    pub skills: Vec<String>,
    pub expertise: Option<Expertise>,
    pub bio: Option<String>,
    #[validate(range(min = 0, message = "Hourly rate cannot be negative"))]
    pub hourly_rate: Option<i32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoginDto {
    pub email: String,
    pub password: String,
}

/// Fields a user may change on their own record. Everything is optional;
/// only supplied values are written.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub county: Option<String>,
    pub town: Option<String>,
    pub area: Option<String>,
    pub profile_image: Option<String>,
}

impl ProfileChanges {
    pub fn to_set_document(&self) -> mongodb::bson::Document {
        let mut set = mongodb::bson::doc! { "updated_at": DateTime::now() };
        for (key, value) in [
            ("name", &self.name),
            ("phone", &self.phone),
            ("county", &self.county),
            ("town", &self.town),
            ("area", &self.area),
            ("profile_image", &self.profile_image),
        ] {
            if let Some(value) = value {
                set.insert(key, value.trim());
            }
        }
        set
    }
}

/// Public view of a user. The password hash never leaves the model.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub county: Option<String>,
    pub town: Option<String>,
    pub area: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_profile: Option<WorkerResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_profile: Option<ClientResponse>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.to_hex(),
            role: user.role,
            name: user.name,
            email: user.email,
            phone: user.phone,
            county: user.county,
            town: user.town,
            area: user.area,
            profile_image: user.profile_image,
            created_at: format_datetime(user.created_at),
            worker_profile: None,
            client_profile: None,
        }
    }
}

/// The subset of a user embedded in bookings, workers and reviews.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub county: Option<String>,
    pub town: Option<String>,
    pub area: Option<String>,
    pub profile_image: Option<String>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        UserSummary {
            id: user.id.to_hex(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            county: user.county,
            town: user.town,
            area: user.area,
            profile_image: user.profile_image,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_user(role: Role) -> User {
    User {
        id: ObjectId::new(),
        role,
        name: "Ana".to_string(),
        email: "ana@example.com".to_string(),
        phone: Some("0712345678".to_string()),
        county: Some("Nairobi".to_string()),
        town: Some("Westlands".to_string()),
        area: Some("Parklands".to_string()),
        password_hash: "$2b$04$hash".to_string(),
        profile_image: None,
        created_at: DateTime::now(),
        updated_at: DateTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_never_carries_password() {
        let user = sample_user(Role::Client);
        let body = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(body.get("passwordHash").is_none());
        assert!(body.get("password_hash").is_none());
        assert_eq!(body["role"], "client");
        assert!(body.get("workerProfile").is_none());
    }

    #[test]
    fn location_completeness_requires_all_parts() {
        let mut user = sample_user(Role::Worker);
        assert!(user.location().is_complete());
        user.area = Some("  ".to_string());
        assert!(!user.location().is_complete());
        user.area = None;
        assert!(!user.location().is_complete());
    }

    #[test]
    fn profile_changes_only_set_supplied_fields() {
        let changes = ProfileChanges {
            name: Some(" Ana M ".to_string()),
            profile_image: Some("/uploads/a.png".to_string()),
            ..Default::default()
        };
        let set = changes.to_set_document();
        assert_eq!(set.get_str("name").unwrap(), "Ana M");
        assert_eq!(set.get_str("profile_image").unwrap(), "/uploads/a.png");
        assert!(set.get("phone").is_none());
        assert!(set.get("updated_at").is_some());
    }

    #[test]
    fn register_validation() {
        let dto: RegisterDto = serde_json::from_value(serde_json::json!({
            "role": "worker",
            "name": "Ana",
            "email": "not-an-email",
            "password": "secret1",
            "hourlyRate": 20
        }))
        .unwrap();
        assert!(dto.validate().is_err());
        assert!(dto.skills.is_empty());
        assert_eq!(dto.hourly_rate, Some(20));
    }

    fn register_dto(name: &str, email: &str) -> RegisterDto {
        serde_json::from_value(serde_json::json!({
            "role": "client",
            "name": name,
            "email": email,
            "password": "secret1"
        }))
        .unwrap()
    }

    #[test]
    fn blank_names_are_rejected() {
        let mut dto = register_dto("   ", "ana@example.com");
        assert!(dto.validate().is_err());
        dto.normalize();
        let errors = dto.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn padded_email_is_accepted_after_normalizing() {
        let mut dto = register_dto(" Ana ", " Ana@Example.com ");
        assert!(dto.validate().is_err());
        dto.normalize();
        assert!(dto.validate().is_ok());
        assert_eq!(dto.name, "Ana");
        assert_eq!(dto.email, "ana@example.com");
    }
}
