use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::models::{format_datetime, Booking, BookingStatus, User, BOOKINGS, USERS};
use crate::utils::WorkflowError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub booking_id: ObjectId,
    /// User id of the client who made the booking.
    pub reviewer_id: ObjectId,
    /// User id owning the booked worker profile.
    pub reviewee_id: ObjectId,
    pub rating: i32, // 1-5
    pub comment: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewDto {
    pub booking_id: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct UpdateReviewDto {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

/// Comments are stored trimmed; a blank comment means no comment.
pub fn normalize_comment(comment: Option<&str>) -> Option<String> {
    comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

impl UpdateReviewDto {
    /// Applies the supplied fields to `review` and returns the matching
    /// `$set` document, so the response mirrors what was written.
    pub fn apply(&self, review: &mut Review, now: DateTime) -> Document {
        let mut set = doc! { "updated_at": now };
        review.updated_at = now;

        if let Some(rating) = self.rating {
            review.rating = rating;
            set.insert("rating", rating);
        }
        if self.comment.is_some() {
            review.comment = normalize_comment(self.comment.as_deref());
            let stored = review.comment.clone().map(Bson::String).unwrap_or(Bson::Null);
            set.insert("comment", stored);
        }
        set
    }
}

/// Checks a client may review `booking`, in priority order: the booking is
/// completed, it was made by the caller's client profile, and it has not
/// been reviewed yet.
pub fn ensure_reviewable(
    booking: &Booking,
    caller_client_id: Option<ObjectId>,
    already_reviewed: bool,
) -> Result<(), WorkflowError> {
    if booking.status != BookingStatus::Completed {
        return Err(WorkflowError::BookingNotCompleted);
    }
    if caller_client_id != Some(booking.client_id) {
        return Err(WorkflowError::Forbidden("Only the client who made the booking can review it"));
    }
    if already_reviewed {
        return Err(WorkflowError::DuplicateReview);
    }
    Ok(())
}

/// Only the original reviewer may change or remove a review.
pub fn ensure_reviewer(review: &Review, user_id: ObjectId) -> Result<(), WorkflowError> {
    if review.reviewer_id == user_id {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden("Not authorized to modify this review"))
    }
}

/// Worker aggregate derived from its complete review set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub rating: f64,
    pub review_count: i32,
}

impl RatingSummary {
    /// Full recomputation; an empty set resets to zero.
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = i32>,
    {
        let (sum, count) = ratings
            .into_iter()
            .fold((0i64, 0i32), |(sum, count), r| (sum + r as i64, count + 1));

        let rating = if count > 0 { sum as f64 / count as f64 } else { 0.0 };

        RatingSummary {
            rating,
            review_count: count,
        }
    }

    pub fn to_set_document(&self) -> Document {
        doc! {
            "rating": self.rating,
            "review_count": self.review_count,
            "updated_at": DateTime::now()
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewerSummary {
    pub id: String,
    pub name: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: String,
    pub booking_id: String,
    pub reviewer_id: String,
    pub reviewee_id: String,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<ReviewerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        ReviewResponse {
            id: review.id.to_hex(),
            booking_id: review.booking_id.to_hex(),
            reviewer_id: review.reviewer_id.to_hex(),
            reviewee_id: review.reviewee_id.to_hex(),
            rating: review.rating,
            comment: review.comment,
            created_at: format_datetime(review.created_at),
            updated_at: format_datetime(review.updated_at),
            reviewer: None,
            service: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewWithContext {
    pub review: Review,
    pub reviewer: User,
    pub booking: Booking,
}

impl From<ReviewWithContext> for ReviewResponse {
    fn from(row: ReviewWithContext) -> Self {
        let mut response = ReviewResponse::from(row.review);
        response.reviewer = Some(ReviewerSummary {
            id: row.reviewer.id.to_hex(),
            name: row.reviewer.name,
            profile_image: row.reviewer.profile_image,
        });
        response.service = Some(row.booking.service);
        response
    }
}

/// Reviews received by `reviewee_id`, newest first, with reviewer and
/// booking attached. Rows deserialize as `ReviewWithContext`.
pub fn worker_reviews_pipeline(reviewee_id: ObjectId, skip: i64, limit: i64) -> Vec<Document> {
    vec![
        doc! { "$match": { "reviewee_id": reviewee_id } },
        doc! { "$sort": { "created_at": -1, "_id": -1 } },
        doc! { "$skip": skip },
        doc! { "$limit": limit },
        doc! {
            "$lookup": {
                "from": USERS,
                "localField": "reviewer_id",
                "foreignField": "_id",
                "as": "reviewer"
            }
        },
        doc! { "$unwind": "$reviewer" },
        doc! {
            "$lookup": {
                "from": BOOKINGS,
                "localField": "booking_id",
                "foreignField": "_id",
                "as": "booking"
            }
        },
        doc! { "$unwind": "$booking" },
        doc! {
            "$project": {
                "review": "$$ROOT",
                "reviewer": "$reviewer",
                "booking": "$booking"
            }
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booking::sample_booking;

    fn review_by(reviewer_id: ObjectId, rating: i32) -> Review {
        Review {
            id: ObjectId::new(),
            booking_id: ObjectId::new(),
            reviewer_id,
            reviewee_id: ObjectId::new(),
            rating,
            comment: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn rating_is_the_mean_of_all_reviews() {
        let summary = RatingSummary::from_ratings([5, 4, 4]);
        assert!((summary.rating - 13.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.review_count, 3);

        let single = RatingSummary::from_ratings([5]);
        assert_eq!(single, RatingSummary { rating: 5.0, review_count: 1 });
    }

    #[test]
    fn empty_review_set_resets_to_zero() {
        let summary = RatingSummary::from_ratings(Vec::<i32>::new());
        assert_eq!(summary, RatingSummary { rating: 0.0, review_count: 0 });

        let set = summary.to_set_document();
        assert_eq!(set.get_f64("rating").unwrap(), 0.0);
        assert_eq!(set.get_i32("review_count").unwrap(), 0);
    }

    #[test]
    fn recomputation_matches_after_edits() {
        let mut ratings = vec![1, 5];
        assert_eq!(RatingSummary::from_ratings(ratings.clone()).rating, 3.0);
        ratings[0] = 3;
        assert_eq!(RatingSummary::from_ratings(ratings.clone()).rating, 4.0);
        ratings.remove(1);
        assert_eq!(
            RatingSummary::from_ratings(ratings),
            RatingSummary { rating: 3.0, review_count: 1 }
        );
    }

    #[test]
    fn unfinished_bookings_cannot_be_reviewed_by_anyone() {
        let client = ObjectId::new();
        for status in [BookingStatus::Pending, BookingStatus::Accepted, BookingStatus::Rejected] {
            let booking = sample_booking(ObjectId::new(), client, status);
            assert_eq!(
                ensure_reviewable(&booking, Some(client), false),
                Err(WorkflowError::BookingNotCompleted)
            );
            assert_eq!(
                ensure_reviewable(&booking, None, true),
                Err(WorkflowError::BookingNotCompleted)
            );
        }
    }

    #[test]
    fn only_the_booking_client_may_review() {
        let client = ObjectId::new();
        let booking = sample_booking(ObjectId::new(), client, BookingStatus::Completed);

        assert!(matches!(
            ensure_reviewable(&booking, Some(ObjectId::new()), false),
            Err(WorkflowError::Forbidden(_))
        ));
        assert!(matches!(
            ensure_reviewable(&booking, None, true),
            Err(WorkflowError::Forbidden(_))
        ));
    }

    #[test]
    fn second_review_is_a_duplicate() {
        let client = ObjectId::new();
        let booking = sample_booking(ObjectId::new(), client, BookingStatus::Completed);

        assert!(ensure_reviewable(&booking, Some(client), false).is_ok());
        assert_eq!(
            ensure_reviewable(&booking, Some(client), true),
            Err(WorkflowError::DuplicateReview)
        );
    }

    #[test]
    fn only_reviewer_may_modify() {
        let author = ObjectId::new();
        let review = review_by(author, 4);
        assert!(ensure_reviewer(&review, author).is_ok());
        assert!(ensure_reviewer(&review, ObjectId::new()).is_err());
    }

    #[test]
    fn rating_bounds_are_validated() {
        let dto: CreateReviewDto =
            serde_json::from_value(serde_json::json!({ "bookingId": "x", "rating": 6 })).unwrap();
        assert!(dto.validate().is_err());

        let dto: CreateReviewDto =
            serde_json::from_value(serde_json::json!({ "bookingId": "x", "rating": 1 })).unwrap();
        assert!(dto.validate().is_ok());

        let update = UpdateReviewDto { rating: Some(0), comment: None };
        assert!(update.validate().is_err());
        let update = UpdateReviewDto { rating: None, comment: Some("Great".into()) };
        assert!(update.validate().is_ok());
        let mut review = review_by(ObjectId::new(), 4);
        assert!(update.apply(&mut review, DateTime::now()).get("rating").is_none());
        assert_eq!(review.rating, 4);
    }

    #[test]
    fn comments_are_trimmed_and_blank_means_none() {
        assert_eq!(normalize_comment(Some("  Great job ")), Some("Great job".to_string()));
        assert_eq!(normalize_comment(Some("   ")), None);
        assert_eq!(normalize_comment(None), None);
    }

    #[test]
    fn update_writes_what_it_returns() {
        let mut review = review_by(ObjectId::new(), 2);
        review.comment = Some("Late".into());
        let now = DateTime::from_millis(1_700_000_000_000);

        let update = UpdateReviewDto { rating: Some(5), comment: Some("  On time  ".into()) };
        let set = update.apply(&mut review, now);
        assert_eq!(set.get_str("comment").unwrap(), "On time");
        assert_eq!(review.comment.as_deref(), Some("On time"));
        assert_eq!(set.get_i32("rating").unwrap(), 5);
        assert_eq!(set.get_datetime("updated_at").unwrap(), &now);
        assert_eq!(review.updated_at, now);

        let clear = UpdateReviewDto { rating: None, comment: Some("  ".into()) };
        let set = clear.apply(&mut review, now);
        assert_eq!(set.get("comment"), Some(&Bson::Null));
        assert_eq!(review.comment, None);
        assert_eq!(review.rating, 5);
    }

    #[test]
    fn reviews_pipeline_filters_by_reviewee() {
        let reviewee = ObjectId::new();
        let pipeline = worker_reviews_pipeline(reviewee, 20, 20);
        let first = pipeline[0].get_document("$match").unwrap();
        assert_eq!(first.get_object_id("reviewee_id").unwrap(), reviewee);
        assert_eq!(pipeline[2].get_i64("$skip").unwrap(), 20);
        assert!(pipeline.last().unwrap().contains_key("$project"));
    }
}
