use log::error;

use crate::utils::ApiError;

/// bcrypt is CPU bound; both directions run on the blocking pool.
pub struct PasswordService;

impl PasswordService {
    pub async fn hash(password: String) -> Result<String, ApiError> {
        Self::hash_with_cost(password, crate::config::Config::bcrypt_cost()).await
    }

    async fn hash_with_cost(password: String, cost: u32) -> Result<String, ApiError> {
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| {
                error!("Password hashing task failed: {}", e);
                ApiError::internal_error()
            })?
            .map_err(|e| {
                error!("Password hashing failed: {}", e);
                ApiError::internal_error()
            })
    }

    /// A malformed stored hash counts as a mismatch.
    pub async fn verify(password: String, hash: String) -> Result<bool, ApiError> {
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
            .await
            .map_err(|e| {
                error!("Password verification task failed: {}", e);
                ApiError::internal_error()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hash = PasswordService::hash_with_cost("secret1".into(), 4).await.unwrap();
        assert_ne!(hash, "secret1");
        assert!(PasswordService::verify("secret1".into(), hash.clone()).await.unwrap());
        assert!(!PasswordService::verify("secret2".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_never_matches() {
        assert!(!PasswordService::verify("secret1".into(), "plain".into()).await.unwrap());
    }
}
