use thiserror::Error;

use crate::models::BookingStatus;
use crate::utils::ApiError;

/// Business-rule failures raised by the booking, review and profile
/// workflows. Handlers convert them to an `ApiError` at their boundary.
#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("User already exists")]
    DuplicateEmail,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Worker not available")]
    WorkerUnavailable,

    #[error("Only clients can create bookings")]
    ClientProfileMissing,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Can only review completed bookings")]
    BookingNotCompleted,

    #[error("Review already exists for this booking")]
    DuplicateReview,

    #[error("Cannot change booking status from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("{0}")]
    Validation(String),
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        let message = e.to_string();
        match e {
            WorkflowError::DuplicateEmail | WorkflowError::DuplicateReview => {
                ApiError::conflict(message)
            }
            WorkflowError::InvalidCredentials
            | WorkflowError::WorkerUnavailable
            | WorkflowError::BookingNotCompleted
            | WorkflowError::InvalidTransition { .. }
            | WorkflowError::Validation(_) => ApiError::bad_request(message),
            WorkflowError::ClientProfileMissing | WorkflowError::Forbidden(_) => {
                ApiError::forbidden(message)
            }
            WorkflowError::NotFound(_) => ApiError::not_found(message),
        }
    }
}

const DUPLICATE_KEY: i32 = 11000;
const WRITE_CONFLICT: i32 = 112;

fn server_code(e: &mongodb::error::Error) -> Option<i32> {
    use mongodb::error::{ErrorKind, WriteFailure};

    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => Some(we.code),
        ErrorKind::Command(ce) => Some(ce.code),
        _ => None,
    }
}

/// Codes an insert on a unique key can fail with. Inside a transaction a
/// concurrent insert of the same key surfaces as a write conflict rather
/// than a duplicate key.
fn is_unique_collision(code: i32) -> bool {
    code == DUPLICATE_KEY || code == WRITE_CONFLICT
}

/// True when an insert on a uniquely indexed field lost to another write
/// of the same key, committed or still in flight.
pub fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    server_code(e).is_some_and(is_unique_collision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::http::Status;

    #[test]
    fn conflicts_map_to_bad_request() {
        let err: ApiError = WorkflowError::DuplicateReview.into();
        assert_eq!(err.status, Status::BadRequest);
        assert_eq!(err.message, "Review already exists for this booking");

        let err: ApiError = WorkflowError::DuplicateEmail.into();
        assert_eq!(err.status, Status::BadRequest);
    }

    #[test]
    fn concurrent_inserts_count_as_duplicates() {
        assert!(is_unique_collision(11000));
        assert!(is_unique_collision(112));
        assert!(!is_unique_collision(251));
        assert!(!is_unique_collision(0));
    }

    #[test]
    fn client_side_errors_are_not_duplicates() {
        let err = mongodb::error::Error::custom("no server involved");
        assert!(!is_duplicate_key(&err));
    }

    #[test]
    fn permission_failures_map_to_forbidden() {
        let err: ApiError = WorkflowError::Forbidden("Unauthorized").into();
        assert_eq!(err.status, Status::Forbidden);

        let err: ApiError = WorkflowError::ClientProfileMissing.into();
        assert_eq!(err.status, Status::Forbidden);
    }

    #[test]
    fn missing_entities_map_to_not_found() {
        let err: ApiError = WorkflowError::NotFound("Booking").into();
        assert_eq!(err.status, Status::NotFound);
        assert_eq!(err.message, "Booking not found");
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = WorkflowError::InvalidTransition {
            from: BookingStatus::Rejected,
            to: BookingStatus::Completed,
        };
        assert_eq!(
            err.to_string(),
            "Cannot change booking status from rejected to completed"
        );
        let err: ApiError = err.into();
        assert_eq!(err.status, Status::BadRequest);
    }
}
