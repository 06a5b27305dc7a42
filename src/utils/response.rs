use rocket_okapi::okapi::Map;
use serde::{Deserialize, Serialize};
use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::Request;
use std::io::Cursor;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::okapi::schemars::schema::SchemaObject;
use log::error;
use rocket_okapi::response::OpenApiResponderInner;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{MediaType, Response as OpenApiResponse, Responses};

/// -----------------------------
/// Generic API response
/// -----------------------------
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            message: Some(message),
            data: None,
        }
    }
}

fn json_body<T: Serialize>(status: Status, body: &T) -> response::Result<'static> {
    let body = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"success":false,"message":"Server error"}"#.to_string());

    Response::build()
        .status(status)
        .header(rocket::http::ContentType::JSON)
        .sized_body(body.len(), Cursor::new(body))
        .ok()
}

fn json_content(schema: SchemaObject) -> Map<String, MediaType> {
    let mut content = Map::new();
    content.insert(
        "application/json".to_owned(),
        MediaType {
            schema: Some(schema),
            ..Default::default()
        },
    );
    content
}

/// -----------------------------
/// 201 Created
/// -----------------------------
#[derive(Debug)]
pub struct Created<T>(pub ApiResponse<T>);

impl<'r, T: Serialize> Responder<'r, 'static> for Created<T> {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        json_body(Status::Created, &self.0)
    }
}

impl<T: Serialize + JsonSchema> OpenApiResponderInner for Created<T> {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let content = json_content(generator.json_schema::<ApiResponse<T>>());

        let mut responses = Responses::default();
        responses.responses.insert(
            "201".to_string(),
            rocket_okapi::okapi::openapi3::RefOr::Object(OpenApiResponse {
                description: "Created".to_string(),
                content,
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}

/// -----------------------------
/// API Error
/// -----------------------------
#[derive(Debug, Serialize, JsonSchema)]
pub struct ApiError {
    #[schemars(skip)]
    #[serde(skip_serializing)]
    pub status: Status,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::BadRequest,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::Unauthorized,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::Forbidden,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::NotFound,
            message: message.into(),
        }
    }

    /// Duplicates are reported as 400, which is what clients of this API
    /// already branch on.
    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError {
            status: Status::BadRequest,
            message: message.into(),
        }
    }

    /// Always the generic message; details go to the log, never the caller.
    pub fn internal_error() -> Self {
        ApiError {
            status: Status::InternalServerError,
            message: "Server error".to_string(),
        }
    }
}

impl From<mongodb::error::Error> for ApiError {
    fn from(e: mongodb::error::Error) -> Self {
        error!("Database error: {}", e);
        ApiError::internal_error()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<_> = field_errors.keys().copied().collect();
        fields.sort_unstable();

        let message = fields
            .first()
            .and_then(|field| {
                field_errors[field].first().map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid {}", field))
                })
            })
            .unwrap_or_else(|| "Invalid request".to_string());

        ApiError::bad_request(message)
    }
}

/// -----------------------------
/// Rocket Responder
/// -----------------------------
impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        json_body(self.status, &ApiResponse::<()>::error(self.message))
    }
}

/// -----------------------------
/// OpenAPI integration
/// -----------------------------
impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let content = json_content(generator.json_schema::<ApiResponse<()>>());

        let mut responses = Responses::default();

        for (code, description) in [
            ("400", "Bad request"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not found"),
            ("500", "Server error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                rocket_okapi::okapi::openapi3::RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    content: content.clone(),
                    ..Default::default()
                }),
            );
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
        #[validate(range(min = 1, max = 5))]
        rating: i32,
    }

    #[test]
    fn validation_errors_report_first_field_message() {
        let sample = Sample { name: String::new(), rating: 3 };
        let err: ApiError = sample.validate().unwrap_err().into();
        assert_eq!(err.status, Status::BadRequest);
        assert_eq!(err.message, "Name is required");
    }

    #[test]
    fn validation_errors_without_message_name_the_field() {
        let sample = Sample { name: "Ana".into(), rating: 9 };
        let err: ApiError = sample.validate().unwrap_err().into();
        assert_eq!(err.message, "Invalid rating");
    }

    #[test]
    fn internal_error_hides_details() {
        let err = ApiError::internal_error();
        assert_eq!(err.status, Status::InternalServerError);
        assert_eq!(err.message, "Server error");
    }

    #[test]
    fn error_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::<()>::error("nope".into())).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "nope");
        assert!(body.get("data").is_none());
    }
}
