use log::{info, warn};
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use rocket::futures::TryStreamExt;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use validator::Validate;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{
    AvailableWorkersQuery, Booking, BookingQuery, BookingResponse, BookingStatus,
    BookingWithParties, CreateBookingDto, UpdateBookingStatusDto, WorkerResponse,
    WorkerWithUser,
};
use crate::routes::{commit, find_client_by_user, parse_object_id, resolve_actor};
use crate::utils::{parse_date, parse_time, ApiError, ApiResponse, Created, WorkflowError};

fn decode_rows<T: serde::de::DeserializeOwned>(
    rows: Vec<mongodb::bson::Document>,
) -> Result<Vec<T>, ApiError> {
    rows.into_iter()
        .map(mongodb::bson::from_document)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| {
            log::error!("Malformed aggregation row: {}", e);
            ApiError::internal_error()
        })
}

#[openapi(tag = "Bookings")]
#[post("/bookings", data = "<dto>")]
pub async fn create_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateBookingDto>,
) -> Result<Created<serde_json::Value>, ApiError> {
    let dto = dto.into_inner();
    dto.validate()?;

    let scheduled_date = parse_date(&dto.scheduled_date, "scheduledDate")?;
    let scheduled_time = parse_time(&dto.scheduled_time)?;

    let worker_id = ObjectId::parse_str(dto.worker_id.trim())
        .map_err(|_| WorkflowError::WorkerUnavailable)?;
    let worker_available = db
        .workers()
        .find_one(doc! { "_id": worker_id }, None)
        .await?
        .is_some_and(|w| w.availability);
    if !worker_available {
        return Err(WorkflowError::WorkerUnavailable.into());
    }

    let client = find_client_by_user(db, auth.user_id)
        .await?
        .ok_or(WorkflowError::ClientProfileMissing)?;

    let now = DateTime::now();
    let booking = Booking {
        id: ObjectId::new(),
        worker_id,
        client_id: client.id,
        status: BookingStatus::Pending,
        scheduled_date,
        scheduled_time,
        description: dto.description.trim().to_string(),
        service: dto.service.trim().to_string(),
        created_at: now,
        updated_at: now,
    };

    let mut session = db.start_transaction().await?;
    db.bookings()
        .insert_one_with_session(&booking, None, &mut session)
        .await?;
    db.clients()
        .update_one_with_session(
            doc! { "_id": client.id },
            doc! {
                "$inc": { "bookings_count": 1 },
                "$set": { "updated_at": now }
            },
            None,
            &mut session,
        )
        .await?;
    commit(session).await?;

    info!("Booking {} created by client {}", booking.id, client.id);

    Ok(Created(ApiResponse::success_with_message(
        "Booking created successfully",
        serde_json::json!({ "booking": BookingResponse::from(booking) }),
    )))
}

#[openapi(tag = "Bookings")]
#[get("/bookings?<query..>")]
pub async fn get_bookings(
    db: &State<DbConn>,
    auth: AuthGuard,
    query: BookingQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let actor = resolve_actor(db, &auth).await?;
    let pipeline = query.pipeline(&actor)?;

    let rows = db
        .bookings()
        .aggregate(pipeline, None)
        .await?
        .try_collect()
        .await?;

    let bookings: Vec<BookingResponse> = decode_rows::<BookingWithParties>(rows)?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({ "bookings": bookings }))))
}

/// Moves a booking along its lifecycle. Completing a booking bumps the
/// worker's finished job counter in the same transaction.
#[openapi(tag = "Bookings")]
#[put("/bookings/<id>/status", data = "<dto>")]
pub async fn update_booking_status(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
    dto: Json<UpdateBookingStatusDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking_id = parse_object_id(&id, "booking")?;
    let actor = resolve_actor(db, &auth).await?;

    let mut session = db.start_transaction().await?;

    let mut booking = db
        .bookings()
        .find_one_with_session(doc! { "_id": booking_id }, None, &mut session)
        .await?
        .ok_or(WorkflowError::NotFound("Booking"))?;

    booking.authorize(&actor)?;

    let transition = booking.status.transition(dto.status).map_err(|e| {
        warn!("Booking {}: {}", booking.id, e);
        e
    })?;

    if transition.is_noop() {
        return Ok(Json(ApiResponse::success_with_message(
            "Booking status unchanged",
            serde_json::json!({ "booking": BookingResponse::from(booking) }),
        )));
    }

    let now = DateTime::now();
    db.bookings()
        .update_one_with_session(
            doc! { "_id": booking.id, "status": transition.from.as_str() },
            doc! { "$set": { "status": transition.to.as_str(), "updated_at": now } },
            None,
            &mut session,
        )
        .await?;

    if transition.completes_job() {
        db.workers()
            .update_one_with_session(
                doc! { "_id": booking.worker_id },
                doc! {
                    "$inc": { "completed_jobs": 1 },
                    "$set": { "updated_at": now }
                },
                None,
                &mut session,
            )
            .await?;
    }

    commit(session).await?;

    info!("Booking {} moved {} -> {}", booking.id, transition.from, transition.to);
    booking.status = transition.to;
    booking.updated_at = now;

    Ok(Json(ApiResponse::success_with_message(
        "Booking status updated successfully",
        serde_json::json!({ "booking": BookingResponse::from(booking) }),
    )))
}

#[openapi(tag = "Bookings")]
#[get("/bookings/available?<query..>")]
pub async fn get_available_workers(
    db: &State<DbConn>,
    _auth: AuthGuard,
    query: AvailableWorkersQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rows = db
        .workers()
        .aggregate(query.pipeline(), None)
        .await?
        .try_collect()
        .await?;

    let workers: Vec<WorkerResponse> = decode_rows::<WorkerWithUser>(rows)?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(ApiResponse::success(serde_json::json!({ "workers": workers }))))
}
