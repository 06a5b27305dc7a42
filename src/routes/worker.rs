use log::info;
use mongodb::bson::{doc, from_document, DateTime};
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::WorkerGuard;
use crate::models::{
    month_windows, worker_by_id_pipeline, BookingStatus, UpdateWorkerProfileDto, Worker,
    WorkerResponse, WorkerSearchPage, WorkerSearchQuery, WorkerStats, WorkerWithUser,
};
use crate::routes::{find_worker_by_user, parse_object_id};
use crate::utils::{ApiError, ApiResponse, WorkflowError};

#[openapi(tag = "Workers")]
#[get("/workers?<query..>")]
pub async fn get_workers(
    db: &State<DbConn>,
    query: WorkerSearchQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = query.page();
    let pipeline = query.pipeline()?;

    let rows: Vec<mongodb::bson::Document> = db
        .workers()
        .aggregate(pipeline, None)
        .await?
        .try_collect()
        .await?;

    let result = match rows.into_iter().next() {
        Some(row) => from_document::<WorkerSearchPage>(row).map_err(|e| {
            log::error!("Malformed worker search result: {}", e);
            ApiError::internal_error()
        })?,
        None => WorkerSearchPage {
            items: Vec::new(),
            total: Vec::new(),
        },
    };

    let total = result.total();
    let workers: Vec<WorkerResponse> = result.items.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "workers": workers,
        "pagination": page.to_json(total)
    }))))
}

#[openapi(tag = "Workers")]
#[get("/workers/<id>")]
pub async fn get_worker_by_id(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let worker_id = parse_object_id(&id, "worker")?;

    let mut cursor = db.workers().aggregate(worker_by_id_pipeline(worker_id), None).await?;
    let row = cursor
        .try_next()
        .await?
        .ok_or(WorkflowError::NotFound("Worker"))?;

    let worker: WorkerWithUser = from_document(row).map_err(|e| {
        log::error!("Malformed worker {}: {}", worker_id, e);
        ApiError::internal_error()
    })?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "worker": WorkerResponse::from(worker)
    }))))
}

/// Partial update of the caller's worker profile. A missing profile is
/// created with defaults first.
#[openapi(tag = "Workers")]
#[put("/workers/profile", data = "<dto>")]
pub async fn update_worker_profile(
    db: &State<DbConn>,
    guard: WorkerGuard,
    dto: Json<UpdateWorkerProfileDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let dto = dto.into_inner();
    dto.validate()?;
    let user_id = guard.auth.user_id;

    let worker = match find_worker_by_user(db, user_id).await? {
        Some(mut worker) => {
            db.workers()
                .update_one(
                    doc! { "_id": worker.id },
                    doc! { "$set": dto.to_set_document() },
                    None,
                )
                .await?;
            dto.apply(&mut worker);
            worker
        }
        None => {
            let mut worker = Worker::new(user_id);
            dto.apply(&mut worker);
            db.workers().insert_one(&worker, None).await?;
            info!("Created missing worker profile for user {}", user_id);
            worker
        }
    };

    Ok(Json(ApiResponse::success_with_message(
        "Worker profile updated successfully",
        serde_json::json!({ "worker": WorkerResponse::from(worker) }),
    )))
}

#[openapi(tag = "Workers")]
#[get("/workers/stats/me")]
pub async fn get_worker_stats(
    db: &State<DbConn>,
    guard: WorkerGuard,
) -> Result<Json<ApiResponse<WorkerStats>>, ApiError> {
    let user_id = guard.auth.user_id;

    let worker = find_worker_by_user(db, user_id)
        .await?
        .ok_or(WorkflowError::NotFound("Worker profile"))?;
    let user = db
        .users()
        .find_one(doc! { "_id": user_id }, None)
        .await?
        .ok_or(WorkflowError::NotFound("User"))?;

    let windows = month_windows(chrono::Utc::now()).ok_or_else(ApiError::internal_error)?;

    let completed_between = |from: DateTime, to: DateTime| {
        doc! {
            "worker_id": worker.id,
            "status": BookingStatus::Completed.as_str(),
            "updated_at": { "$gte": from, "$lt": to }
        }
    };

    let this_month = db
        .bookings()
        .count_documents(
            completed_between(windows.this_month_start, windows.next_month_start),
            None,
        )
        .await?;
    let last_month = db
        .bookings()
        .count_documents(
            completed_between(windows.last_month_start, windows.this_month_start),
            None,
        )
        .await?;

    let stats = WorkerStats::compute(&worker, &user, this_month as i64, last_month as i64);
    Ok(Json(ApiResponse::success(stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{self, send};
    use rocket::http::{Method, Status};

    #[rocket::async_test]
    #[ignore = "needs a MongoDB replica set in MONGODB_URI"]
    async fn search_pages_past_the_end_are_empty() {
        let client = testing::client(routes![
            crate::routes::auth::register,
            get_workers,
            get_worker_by_id
        ])
        .await;
        testing::register(&client, "worker", "Bo", "bo@example.com").await;

        let (status, body) = send(&client, Method::Get, "/api/workers", None, None).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["workers"][0]["user"]["name"], "Bo");

        let path = format!("/api/workers?page={}", i64::MAX);
        let (status, body) = send(&client, Method::Get, &path, None, None).await;
        assert_eq!(status, Status::Ok);
        assert!(body["data"]["workers"].as_array().unwrap().is_empty());
        assert_eq!(body["data"]["pagination"]["total"], 1);

        let (status, _) = send(&client, Method::Get, "/api/workers/not-an-id", None, None).await;
        assert_eq!(status, Status::BadRequest);

        testing::cleanup(client).await;
    }
}
