use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use std::fmt;
use validator::Validate;

use crate::models::{format_datetime, Actor, User, UserSummary, CLIENTS, USERS, WORKERS};
use crate::utils::{contains_pattern, parse_date, WorkflowError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, FromFormField, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Rejected | BookingStatus::Completed)
    }

    /// pending -> accepted | rejected, accepted -> completed.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted) | (Pending, Rejected) | (Accepted, Completed)
        )
    }

    /// Asking for the current status again is accepted and changes nothing.
    pub fn transition(self, next: BookingStatus) -> Result<Transition, WorkflowError> {
        if self == next || self.can_transition_to(next) {
            Ok(Transition { from: self, to: next })
        } else {
            Err(WorkflowError::InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BookingStatus,
    pub to: BookingStatus,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }

    /// Only the first move into `completed` counts as a finished job.
    pub fn completes_job(&self) -> bool {
        self.to == BookingStatus::Completed && self.from != BookingStatus::Completed
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub worker_id: ObjectId,
    pub client_id: ObjectId,
    pub status: BookingStatus,
    pub scheduled_date: String,
    pub scheduled_time: String,
    pub description: String,
    pub service: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Booking {
    /// The worker on the booking or the client who made it.
    pub fn authorize(&self, actor: &Actor) -> Result<(), WorkflowError> {
        let allowed = match actor {
            Actor::Worker(id) => *id == self.worker_id,
            Actor::Client(id) => *id == self.client_id,
        };
        if allowed {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden("Unauthorized"))
        }
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingDto {
    /// Worker profile id.
    pub worker_id: String,
    pub scheduled_date: String,
    pub scheduled_time: String,
    #[validate(custom(function = "crate::utils::non_blank", message = "Description is required"))]
    pub description: String,
    #[validate(custom(function = "crate::utils::non_blank", message = "Service is required"))]
    pub service: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateBookingStatusDto {
    pub status: BookingStatus,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: String,
    pub worker_id: String,
    pub client_id: String,
    pub status: BookingStatus,
    pub scheduled_date: String,
    pub scheduled_time: String,
    pub description: String,
    pub service: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<UserSummary>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        BookingResponse {
            id: booking.id.to_hex(),
            worker_id: booking.worker_id.to_hex(),
            client_id: booking.client_id.to_hex(),
            status: booking.status,
            scheduled_date: booking.scheduled_date,
            scheduled_time: booking.scheduled_time,
            description: booking.description,
            service: booking.service,
            created_at: format_datetime(booking.created_at),
            updated_at: format_datetime(booking.updated_at),
            worker: None,
            client: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BookingWithParties {
    pub booking: Booking,
    pub worker_user: User,
    pub client_user: User,
}

impl From<BookingWithParties> for BookingResponse {
    fn from(row: BookingWithParties) -> Self {
        let mut response = BookingResponse::from(row.booking);
        response.worker = Some(row.worker_user.into());
        response.client = Some(row.client_user.into());
        response
    }
}

#[derive(Debug, FromForm, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    /// Inclusive lower bound on the scheduled date (YYYY-MM-DD).
    #[field(name = "dateFrom")]
    pub date_from: Option<String>,
    /// Inclusive upper bound on the scheduled date (YYYY-MM-DD).
    #[field(name = "dateTo")]
    pub date_to: Option<String>,
    pub service: Option<String>,
    /// Only honoured for workers.
    #[field(name = "clientName")]
    pub client_name: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn lookup_one(from: &str, local: &str, alias: &str) -> [Document; 2] {
    [
        doc! {
            "$lookup": {
                "from": from,
                "localField": local,
                "foreignField": "_id",
                "as": alias
            }
        },
        doc! { "$unwind": format!("${}", alias) },
    ]
}

impl BookingQuery {
    /// Bookings visible to `actor`, joined with both parties' users, newest
    /// first. Rows deserialize as `BookingWithParties`.
    pub fn pipeline(&self, actor: &Actor) -> Result<Vec<Document>, WorkflowError> {
        let mut filter = match actor {
            Actor::Worker(id) => doc! { "worker_id": *id },
            Actor::Client(id) => doc! { "client_id": *id },
        };

        if let Some(status) = self.status {
            filter.insert("status", status.as_str());
        }

        let mut date_range = Document::new();
        if let Some(from) = non_blank(&self.date_from) {
            date_range.insert("$gte", parse_date(from, "dateFrom")?);
        }
        if let Some(to) = non_blank(&self.date_to) {
            date_range.insert("$lte", parse_date(to, "dateTo")?);
        }
        if !date_range.is_empty() {
            filter.insert("scheduled_date", date_range);
        }

        if let Some(service) = non_blank(&self.service) {
            filter.insert("service", contains_pattern(service));
        }

        let mut pipeline = vec![doc! { "$match": filter }];
        pipeline.extend(lookup_one(WORKERS, "worker_id", "worker_profile"));
        pipeline.extend(lookup_one(USERS, "worker_profile.user_id", "worker_user"));
        pipeline.extend(lookup_one(CLIENTS, "client_id", "client_profile"));
        pipeline.extend(lookup_one(USERS, "client_profile.user_id", "client_user"));

        if let (Actor::Worker(_), Some(name)) = (actor, non_blank(&self.client_name)) {
            pipeline.push(doc! { "$match": { "client_user.name": contains_pattern(name) } });
        }

        pipeline.push(doc! { "$sort": { "created_at": -1, "_id": -1 } });
        pipeline.push(doc! {
            "$project": {
                "booking": "$$ROOT",
                "worker_user": "$worker_user",
                "client_user": "$client_user"
            }
        });
        Ok(pipeline)
    }
}

#[cfg(test)]
pub(crate) fn sample_booking(worker_id: ObjectId, client_id: ObjectId, status: BookingStatus) -> Booking {
    let now = DateTime::now();
    Booking {
        id: ObjectId::new(),
        worker_id,
        client_id,
        status,
        scheduled_date: "2024-01-10".to_string(),
        scheduled_time: "10:00".to_string(),
        description: "Fix the kitchen sink".to_string(),
        service: "Plumbing".to_string(),
        created_at: now,
        updated_at: now,
    }
}
