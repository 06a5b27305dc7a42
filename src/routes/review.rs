use log::info;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::ClientSession;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{
    ensure_reviewable, ensure_reviewer, normalize_comment, worker_reviews_pipeline,
    CreateReviewDto, Page,
    RatingSummary, Review, ReviewResponse, ReviewWithContext, Role, UpdateReviewDto,
};
use crate::routes::{commit, find_client_by_user, parse_object_id};
use crate::utils::{is_duplicate_key, ApiError, ApiResponse, Created, WorkflowError};

const DEFAULT_REVIEWS_PAGE_SIZE: i64 = 20;

/// Recomputes the reviewee's worker aggregate from every review it has,
/// inside the caller's transaction.
async fn recompute_rating(
    db: &DbConn,
    session: &mut ClientSession,
    reviewee_id: ObjectId,
) -> Result<RatingSummary, ApiError> {
    let mut cursor = db
        .reviews()
        .find_with_session(doc! { "reviewee_id": reviewee_id }, None, session)
        .await?;
    let reviews: Vec<Review> = cursor.stream(session).try_collect().await?;

    let summary = RatingSummary::from_ratings(reviews.iter().map(|r| r.rating));

    db.workers()
        .update_one_with_session(
            doc! { "user_id": reviewee_id },
            doc! { "$set": summary.to_set_document() },
            None,
            session,
        )
        .await?;

    Ok(summary)
}

#[openapi(tag = "Reviews")]
#[post("/reviews", data = "<dto>")]
pub async fn create_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateReviewDto>,
) -> Result<Created<serde_json::Value>, ApiError> {
    let dto = dto.into_inner();
    dto.validate()?;
    let booking_id = parse_object_id(&dto.booking_id, "booking")?;

    let caller_client_id = match auth.role {
        Role::Client => find_client_by_user(db, auth.user_id).await?.map(|c| c.id),
        Role::Worker => None,
    };

    let mut session = db.start_transaction().await?;

    let booking = db
        .bookings()
        .find_one_with_session(doc! { "_id": booking_id }, None, &mut session)
        .await?
        .ok_or(WorkflowError::NotFound("Booking"))?;

    let already_reviewed = db
        .reviews()
        .find_one_with_session(doc! { "booking_id": booking_id }, None, &mut session)
        .await?
        .is_some();

    ensure_reviewable(&booking, caller_client_id, already_reviewed)?;

    let worker = db
        .workers()
        .find_one_with_session(doc! { "_id": booking.worker_id }, None, &mut session)
        .await?
        .ok_or(WorkflowError::NotFound("Worker"))?;

    let now = DateTime::now();
    let review = Review {
        id: ObjectId::new(),
        booking_id,
        reviewer_id: auth.user_id,
        reviewee_id: worker.user_id,
        rating: dto.rating,
        comment: normalize_comment(dto.comment.as_deref()),
        created_at: now,
        updated_at: now,
    };

    db.reviews()
        .insert_one_with_session(&review, None, &mut session)
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                WorkflowError::DuplicateReview.into()
            } else {
                ApiError::from(e)
            }
        })?;

    let summary = recompute_rating(db, &mut session, worker.user_id).await?;
    commit(session).await?;

    info!(
        "Review {} on booking {}: worker {} now {:.2} over {}",
        review.id, booking_id, worker.id, summary.rating, summary.review_count
    );

    Ok(Created(ApiResponse::success_with_message(
        "Review submitted successfully",
        serde_json::json!({ "review": ReviewResponse::from(review) }),
    )))
}

#[openapi(tag = "Reviews")]
#[get("/reviews/worker/<id>?<page>&<limit>")]
pub async fn get_worker_reviews(
    db: &State<DbConn>,
    id: String,
    page: Option<i64>,
    limit: Option<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let worker_id = parse_object_id(&id, "worker")?;
    let worker = db
        .workers()
        .find_one(doc! { "_id": worker_id }, None)
        .await?
        .ok_or(WorkflowError::NotFound("Worker"))?;

    let page = Page::new(page, limit, DEFAULT_REVIEWS_PAGE_SIZE);

    let rows: Vec<mongodb::bson::Document> = db
        .reviews()
        .aggregate(
            worker_reviews_pipeline(worker.user_id, page.skip(), page.limit),
            None,
        )
        .await?
        .try_collect()
        .await?;

    let reviews = rows
        .into_iter()
        .map(mongodb::bson::from_document::<ReviewWithContext>)
        .map(|row| row.map(ReviewResponse::from))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            log::error!("Malformed review row: {}", e);
            ApiError::internal_error()
        })?;

    let total = db
        .reviews()
        .count_documents(doc! { "reviewee_id": worker.user_id }, None)
        .await? as i64;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "reviews": reviews,
        "pagination": page.to_json(total)
    }))))
}

#[openapi(tag = "Reviews")]
#[put("/reviews/<id>", data = "<dto>")]
pub async fn update_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
    dto: Json<UpdateReviewDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let review_id = parse_object_id(&id, "review")?;

    let mut session = db.start_transaction().await?;

    let mut review = db
        .reviews()
        .find_one_with_session(doc! { "_id": review_id }, None, &mut session)
        .await?
        .ok_or(WorkflowError::NotFound("Review"))?;
    ensure_reviewer(&review, auth.user_id)?;

    let set = dto.apply(&mut review, DateTime::now());
    db.reviews()
        .update_one_with_session(doc! { "_id": review_id }, doc! { "$set": set }, None, &mut session)
        .await?;

    recompute_rating(db, &mut session, review.reviewee_id).await?;
    commit(session).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Review updated successfully",
        serde_json::json!({ "review": ReviewResponse::from(review) }),
    )))
}

#[openapi(tag = "Reviews")]
#[delete("/reviews/<id>")]
pub async fn delete_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let review_id = parse_object_id(&id, "review")?;

    let mut session = db.start_transaction().await?;

    let review = db
        .reviews()
        .find_one_with_session(doc! { "_id": review_id }, None, &mut session)
        .await?
        .ok_or(WorkflowError::NotFound("Review"))?;
    ensure_reviewer(&review, auth.user_id)?;

    db.reviews()
        .delete_one_with_session(doc! { "_id": review_id }, None, &mut session)
        .await?;

    let summary = recompute_rating(db, &mut session, review.reviewee_id).await?;
    commit(session).await?;

    info!("Review {} deleted; {} reviews remain", review_id, summary.review_count);

    Ok(Json(ApiResponse::success_with_message(
        "Review deleted successfully",
        serde_json::json!({ "id": review_id.to_hex() }),
    )))
}
