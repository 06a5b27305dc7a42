use log::warn;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use serde::Serialize;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use crate::db::DbConn;

#[derive(Debug, Serialize, JsonSchema)]
pub struct HealthStatus {
    pub status: &'static str,
    pub message: &'static str,
    pub database: &'static str,
}

impl HealthStatus {
    pub fn new(database_up: bool) -> Self {
        HealthStatus {
            status: "OK",
            message: "Skill-Connect Backend is running",
            database: if database_up { "up" } else { "down" },
        }
    }
}

#[openapi(tag = "Health")]
#[get("/health")]
pub async fn health(db: &State<DbConn>) -> Json<HealthStatus> {
    let database_up = match db.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check ping failed: {}", e);
            false
        }
    };
    Json(HealthStatus::new(database_up))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_database_state() {
        let body = serde_json::to_value(HealthStatus::new(false)).unwrap();
        assert_eq!(body["status"], "OK");
        assert_eq!(body["database"], "down");
        assert_eq!(HealthStatus::new(true).database, "up");
    }
}
