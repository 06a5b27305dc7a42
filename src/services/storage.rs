use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};
use rocket::fs::TempFile;
use rocket::http::ContentType;

use crate::utils::{ApiError, WorkflowError};

/// Persists uploaded images and hands back the public reference stored on
/// the user record.
#[rocket::async_trait]
pub trait ImageStorage: Send + Sync {
    async fn store_image(&self, file: &mut TempFile<'_>) -> Result<String, ApiError>;
}

pub type SharedStorage = Arc<dyn ImageStorage>;

/// Writes into a local directory that is also served under `/uploads`.
pub struct LocalImageStorage {
    dir: PathBuf,
    max_size: u64,
}

impl LocalImageStorage {
    pub fn new(dir: impl Into<PathBuf>, max_size: u64) -> Self {
        LocalImageStorage {
            dir: dir.into(),
            max_size,
        }
    }

    pub fn from_config() -> Self {
        Self::new(
            crate::config::Config::upload_dir(),
            crate::config::Config::max_image_size(),
        )
    }
}

pub fn is_image(content_type: Option<&ContentType>) -> bool {
    content_type.is_some_and(|ct| ct.top().as_str().eq_ignore_ascii_case("image"))
}

pub fn check_image(
    content_type: Option<&ContentType>,
    len: u64,
    max_size: u64,
) -> Result<(), WorkflowError> {
    if !is_image(content_type) {
        return Err(WorkflowError::Validation(
            "Only image files are allowed".to_string(),
        ));
    }
    if len > max_size {
        return Err(WorkflowError::Validation(format!(
            "Image must be at most {} MB",
            max_size / (1024 * 1024)
        )));
    }
    Ok(())
}

/// `profileImage-<millis>-<uuid>.<ext>`; the extension follows the declared
/// content type.
pub fn image_file_name(content_type: Option<&ContentType>) -> String {
    let ext = content_type
        .and_then(|ct| ct.extension())
        .map(|ext| ext.as_str().to_ascii_lowercase())
        .unwrap_or_else(|| "img".to_string());

    format!(
        "profileImage-{}-{}.{}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple(),
        ext
    )
}

#[rocket::async_trait]
impl ImageStorage for LocalImageStorage {
    async fn store_image(&self, file: &mut TempFile<'_>) -> Result<String, ApiError> {
        check_image(file.content_type(), file.len(), self.max_size)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            error!("Cannot create upload directory {:?}: {}", self.dir, e);
            ApiError::internal_error()
        })?;

        let name = image_file_name(file.content_type());
        file.copy_to(self.dir.join(&name)).await.map_err(|e| {
            error!("Failed to store upload {}: {}", name, e);
            ApiError::internal_error()
        })?;

        info!("Stored image {}", name);
        Ok(format!("/uploads/{}", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn only_images_are_accepted() {
        assert!(check_image(Some(&ContentType::PNG), 10, 5 * MB).is_ok());
        assert!(check_image(Some(&ContentType::new("image", "webp")), 10, 5 * MB).is_ok());
        assert!(check_image(Some(&ContentType::PDF), 10, 5 * MB).is_err());
        assert!(check_image(None, 10, 5 * MB).is_err());
    }

    #[test]
    fn oversized_images_are_rejected() {
        assert_eq!(
            check_image(Some(&ContentType::JPEG), 5 * MB + 1, 5 * MB),
            Err(WorkflowError::Validation("Image must be at most 5 MB".into()))
        );
        assert!(check_image(Some(&ContentType::JPEG), 5 * MB, 5 * MB).is_ok());
    }

    #[test]
    fn file_names_are_unique_and_typed() {
        let a = image_file_name(Some(&ContentType::PNG));
        let b = image_file_name(Some(&ContentType::PNG));
        assert!(a.starts_with("profileImage-"));
        assert!(a.ends_with(".png"));
        assert_ne!(a, b);
        assert!(image_file_name(None).ends_with(".img"));
    }
}
