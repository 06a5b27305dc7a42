use rocket::figment::Figment;
use std::sync::OnceLock;

pub const DEFAULT_JWT_SECRET: &str = "default-secret";

static FIGMENT: OnceLock<Figment> = OnceLock::new();

pub struct Config;

impl Config {
    /// Same sources Rocket itself reads: `Rocket.toml` for the active profile
    /// plus `ROCKET_*` environment overrides.
    fn figment() -> &'static Figment {
        FIGMENT.get_or_init(rocket::Config::figment)
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string())
    }

    /// Token lifetime in seconds. Seven days unless configured.
    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(7 * 24 * 60 * 60)
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string())
    }

    pub fn database_name() -> String {
        Self::figment()
            .extract_inner("database_name")
            .unwrap_or_else(|_| "skill-connect".to_string())
    }

    pub fn bcrypt_cost() -> u32 {
        Self::figment()
            .extract_inner("bcrypt_cost")
            .unwrap_or(12)
    }

    pub fn upload_dir() -> String {
        Self::figment()
            .extract_inner("upload_dir")
            .unwrap_or_else(|_| "uploads".to_string())
    }

    pub fn max_image_size() -> u64 {
        Self::figment()
            .extract_inner("max_image_size")
            .unwrap_or(5 * 1024 * 1024)
    }

    pub fn is_release() -> bool {
        Self::figment().profile() == &rocket::Config::RELEASE_PROFILE
    }

    /// Startup check: a release build must not sign tokens with the
    /// placeholder secret.
    pub fn validate() -> Result<(), String> {
        if Self::is_release() && Self::jwt_secret() == DEFAULT_JWT_SECRET {
            return Err("jwt_secret must be set to a unique value in release".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_defaults() {
        assert!(Config::jwt_expiry() > 0);
        assert!(!Config::jwt_secret().is_empty());
        assert!(Config::max_image_size() >= 1024);
    }

    #[test]
    fn debug_profile_accepts_default_secret() {
        if !Config::is_release() {
            assert!(Config::validate().is_ok());
        }
    }
}
