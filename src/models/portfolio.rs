use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::models::format_datetime;
use crate::utils::WorkflowError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PortfolioItem {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Worker profile id of the owner.
    pub worker_id: ObjectId,
    pub image: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl PortfolioItem {
    pub fn ensure_owner(&self, worker_id: ObjectId) -> Result<(), WorkflowError> {
        if self.worker_id == worker_id {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden("Not authorized to modify this portfolio item"))
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct CreatePortfolioItemDto {
    #[validate(custom(function = "crate::utils::non_blank", message = "Image is required"))]
    pub image: String,
    #[validate(custom(function = "crate::utils::non_blank", message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
}

impl CreatePortfolioItemDto {
    pub fn into_item(self, worker_id: ObjectId) -> PortfolioItem {
        let now = DateTime::now();
        PortfolioItem {
            id: ObjectId::new(),
            worker_id,
            image: self.image.trim().to_string(),
            title: self.title.trim().to_string(),
            description: self.description,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdatePortfolioItemDto {
    #[validate(custom(function = "crate::utils::non_blank", message = "Image cannot be empty"))]
    pub image: Option<String>,
    #[validate(custom(function = "crate::utils::non_blank", message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub description: Option<String>,
}

impl UpdatePortfolioItemDto {
    pub fn to_set_document(&self) -> Document {
        let mut set = doc! { "updated_at": DateTime::now() };
        if let Some(ref image) = self.image {
            set.insert("image", image.trim());
        }
        if let Some(ref title) = self.title {
            set.insert("title", title.trim());
        }
        if let Some(ref description) = self.description {
            set.insert("description", description);
        }
        set
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioItemResponse {
    pub id: String,
    pub worker_id: String,
    pub image: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl From<PortfolioItem> for PortfolioItemResponse {
    fn from(item: PortfolioItem) -> Self {
        PortfolioItemResponse {
            id: item.id.to_hex(),
            worker_id: item.worker_id.to_hex(),
            image: item.image,
            title: item.title,
            description: item.description,
            created_at: format_datetime(item.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_belong_to_one_worker() {
        let owner = ObjectId::new();
        let dto = CreatePortfolioItemDto {
            image: " /uploads/deck.jpg ".into(),
            title: "Deck repair".into(),
            description: None,
        };
        assert!(dto.validate().is_ok());
        let item = dto.into_item(owner);

        assert_eq!(item.image, "/uploads/deck.jpg");
        assert!(item.ensure_owner(owner).is_ok());
        assert!(matches!(
            item.ensure_owner(ObjectId::new()),
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[test]
    fn title_and_image_are_required() {
        let dto = CreatePortfolioItemDto {
            image: "".into(),
            title: "Deck".into(),
            description: None,
        };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn update_is_partial() {
        let dto = UpdatePortfolioItemDto {
            image: None,
            title: Some("New title".into()),
            description: None,
        };
        assert!(dto.validate().is_ok());
        let set = dto.to_set_document();
        assert_eq!(set.get_str("title").unwrap(), "New title");
        assert!(set.get("image").is_none());

        let blank = UpdatePortfolioItemDto {
            image: Some(String::new()),
            title: None,
            description: None,
        };
        assert!(blank.validate().is_err());

        let spaces = UpdatePortfolioItemDto {
            image: None,
            title: Some("   ".into()),
            description: None,
        };
        assert!(spaces.validate().is_err());
    }

    #[test]
    fn whitespace_title_is_not_a_title() {
        let dto = CreatePortfolioItemDto {
            image: "/uploads/deck.jpg".into(),
            title: " \t ".into(),
            description: None,
        };
        let errors = dto.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("title"));

        let dto = CreatePortfolioItemDto {
            image: "  ".into(),
            title: "Deck".into(),
            description: None,
        };
        assert!(dto.validate().is_err());
    }
}
