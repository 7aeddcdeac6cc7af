use circulation_http::error::AppError;
use serde_json::json;
use thiserror::Error;

use super::models::RequestStatus;

/// Rule violations raised by the circulation commands.
#[derive(Debug, Error, PartialEq)]
pub enum CirculationError {
    #[error("book '{0}' not found")]
    BookNotFound(String),

    #[error("user '{0}' not found")]
    UserNotFound(String),

    #[error("borrow request '{0}' not found")]
    RequestNotFound(String),

    #[error("history record '{0}' not found")]
    HistoryNotFound(String),

    #[error("fine '{0}' not found")]
    FineNotFound(String),

    #[error("borrow request '{id}' is already {status:?}")]
    RequestResolved { id: String, status: RequestStatus },

    #[error("user '{user_id}' has no active loan of book '{book_id}'")]
    NoActiveLoan { book_id: String, user_id: String },

    #[error("book '{book_id}' would have {available} available of {total} copies")]
    StockInvariant {
        book_id: String,
        total: u32,
        available: u32,
    },

    #[error("field '{field}' must not be empty")]
    MissingField { field: &'static str },

    #[error("fine amount must be a finite number")]
    InvalidFineAmount,
}

impl From<CirculationError> for AppError {
    fn from(err: CirculationError) -> Self {
        let message = err.to_string();
        match err {
            CirculationError::BookNotFound(_)
            | CirculationError::UserNotFound(_)
            | CirculationError::RequestNotFound(_)
            | CirculationError::HistoryNotFound(_)
            | CirculationError::FineNotFound(_) => AppError::not_found(message),
            CirculationError::RequestResolved { id, status } => AppError::conflict(
                vec![json!({ "requestId": id, "status": status })],
                message,
            )
            .with_code("request_resolved"),
            CirculationError::NoActiveLoan { book_id, user_id } => AppError::conflict(
                vec![json!({ "bookId": book_id, "userId": user_id })],
                message,
            )
            .with_code("no_active_loan"),
            CirculationError::StockInvariant {
                book_id,
                total,
                available,
            } => AppError::validation(
                vec![json!({
                    "bookId": book_id,
                    "field": "availableCopies",
                    "totalCopies": total,
                    "availableCopies": available,
                })],
                message,
            ),
            CirculationError::MissingField { field } => {
                AppError::validation(vec![json!({ "field": field, "error": "required" })], message)
            }
            CirculationError::InvalidFineAmount => AppError::validation(
                vec![json!({ "field": "fine.amount", "error": "not a finite number" })],
                message,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn errors_map_to_http_statuses() {
        let cases = [
            (
                CirculationError::BookNotFound("b".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                CirculationError::RequestResolved {
                    id: "r".into(),
                    status: RequestStatus::Denied,
                },
                StatusCode::CONFLICT,
            ),
            (
                CirculationError::NoActiveLoan {
                    book_id: "b".into(),
                    user_id: "u".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                CirculationError::StockInvariant {
                    book_id: "b".into(),
                    total: 1,
                    available: 2,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }
}
