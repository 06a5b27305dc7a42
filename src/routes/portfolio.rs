use log::info;
use mongodb::bson::doc;
use mongodb::options::FindOptions;
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::DbConn;
use crate::guards::WorkerGuard;
use crate::models::{
    CreatePortfolioItemDto, PortfolioItem, PortfolioItemResponse, UpdatePortfolioItemDto, Worker,
};
use crate::routes::{find_worker_by_user, parse_object_id};
use crate::utils::{ApiError, ApiResponse, Created, WorkflowError};

async fn caller_worker(db: &DbConn, guard: &WorkerGuard) -> Result<Worker, ApiError> {
    find_worker_by_user(db, guard.auth.user_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound("Worker profile").into())
}

/// Loads an item and checks the caller's worker profile owns it.
async fn owned_item(
    db: &DbConn,
    guard: &WorkerGuard,
    id: &str,
) -> Result<PortfolioItem, ApiError> {
    let item_id = parse_object_id(id, "portfolio item")?;
    let item = db
        .portfolio_items()
        .find_one(doc! { "_id": item_id }, None)
        .await?
        .ok_or(WorkflowError::NotFound("Portfolio item"))?;

    let worker = caller_worker(db, guard).await?;
    item.ensure_owner(worker.id)?;
    Ok(item)
}

#[openapi(tag = "Portfolio")]
#[post("/portfolio", data = "<dto>")]
pub async fn add_portfolio_item(
    db: &State<DbConn>,
    guard: WorkerGuard,
    dto: Json<CreatePortfolioItemDto>,
) -> Result<Created<serde_json::Value>, ApiError> {
    let dto = dto.into_inner();
    dto.validate()?;

    let worker = caller_worker(db, &guard).await?;
    let item = dto.into_item(worker.id);
    db.portfolio_items().insert_one(&item, None).await?;

    info!("Portfolio item {} added by worker {}", item.id, worker.id);

    Ok(Created(ApiResponse::success_with_message(
        "Portfolio item added successfully",
        serde_json::json!({ "portfolioItem": PortfolioItemResponse::from(item) }),
    )))
}

#[openapi(tag = "Portfolio")]
#[get("/portfolio/worker/<id>")]
pub async fn get_portfolio(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let worker_id = parse_object_id(&id, "worker")?;

    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .build();
    let items: Vec<PortfolioItem> = db
        .portfolio_items()
        .find(doc! { "worker_id": worker_id }, options)
        .await?
        .try_collect()
        .await?;

    let portfolio: Vec<PortfolioItemResponse> = items.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::success(serde_json::json!({ "portfolio": portfolio }))))
}

#[openapi(tag = "Portfolio")]
#[put("/portfolio/<id>", data = "<dto>")]
pub async fn update_portfolio_item(
    db: &State<DbConn>,
    guard: WorkerGuard,
    id: String,
    dto: Json<UpdatePortfolioItemDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let item = owned_item(db, &guard, &id).await?;

    db.portfolio_items()
        .update_one(
            doc! { "_id": item.id },
            doc! { "$set": dto.to_set_document() },
            None,
        )
        .await?;

    let updated = db
        .portfolio_items()
        .find_one(doc! { "_id": item.id }, None)
        .await?
        .ok_or(WorkflowError::NotFound("Portfolio item"))?;

    Ok(Json(ApiResponse::success_with_message(
        "Portfolio item updated successfully",
        serde_json::json!({ "portfolioItem": PortfolioItemResponse::from(updated) }),
    )))
}

#[openapi(tag = "Portfolio")]
#[delete("/portfolio/<id>")]
pub async fn delete_portfolio_item(
    db: &State<DbConn>,
    guard: WorkerGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let item = owned_item(db, &guard, &id).await?;

    db.portfolio_items()
        .delete_one(doc! { "_id": item.id }, None)
        .await?;

    info!("Portfolio item {} deleted", item.id);

    Ok(Json(ApiResponse::success_with_message(
        "Portfolio item deleted successfully",
        serde_json::json!({ "id": item.id.to_hex() }),
    )))
}
