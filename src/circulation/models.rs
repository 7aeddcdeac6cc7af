use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use circulation_authz::Role;

/// A user currently holding a copy of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Borrower {
    pub user_id: String,
    pub user_name: String,
}

/// Catalog entry with its availability counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub price: f64,
    pub total_copies: u32,
    pub available_copies: u32,
    #[serde(default)]
    pub current_borrowers: Vec<Borrower>,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Copies out on loan according to the counters.
    pub fn copies_on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }

    /// Whether the borrower list agrees with the counters.
    pub fn borrowers_consistent(&self) -> bool {
        self.current_borrowers.len() == self.copies_on_loan() as usize
    }
}

/// Catalog write payload. Missing `id` means a new book.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub price: f64,
    pub total_copies: u32,
    /// Defaults to `total_copies` for new books and to the stored value on update.
    #[serde(default)]
    pub available_copies: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default, rename = "class")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub role: Role,
    #[serde(default, rename = "class")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestAction {
    Approve,
    Deny,
}

impl RequestAction {
    pub fn resulting_status(self) -> RequestStatus {
        match self {
            RequestAction::Approve => RequestStatus::Approved,
            RequestAction::Deny => RequestStatus::Denied,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
    pub id: String,
    pub book_id: String,
    pub book_title: String,
    pub user_id: String,
    pub user_name: String,
    pub status: RequestStatus,
    pub timestamp: DateTime<Utc>,
}

impl BorrowRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// One borrow event; open until `return_date` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub book_id: String,
    pub book_title: String,
    pub user_id: String,
    pub user_name: String,
    pub borrow_date: DateTime<Utc>,
    #[serde(default)]
    pub return_date: Option<DateTime<Utc>>,
}

impl HistoryRecord {
    pub fn is_active(&self) -> bool {
        self.return_date.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FineStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fine {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub book_id: String,
    pub book_title: String,
    pub history_id: String,
    pub amount: f64,
    pub reason: String,
    pub status: FineStatus,
    pub timestamp: DateTime<Utc>,
}

/// Issue flagged at return time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FineInput {
    pub amount: f64,
    #[serde(default)]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn book_round_trips_with_camel_case_fields() {
        let book: Book = serde_json::from_value(json!({
            "id": "b-1",
            "title": "Kindred",
            "author": "Octavia E. Butler",
            "totalCopies": 2,
            "availableCopies": 1,
            "currentBorrowers": [{"userId": "u-1", "userName": "Ada"}]
        }))
        .unwrap();

        assert_eq!(book.copies_on_loan(), 1);
        assert!(book.borrowers_consistent());
        assert_eq!(serde_json::to_value(&book).unwrap()["availableCopies"], 1);
    }

    #[test]
    fn user_class_field_keeps_its_wire_name() {
        let user: User = serde_json::from_value(json!({
            "id": "u-1", "name": "Ada", "role": "STUDENT", "class": "7B"
        }))
        .unwrap();
        assert_eq!(user.class_name.as_deref(), Some("7B"));
        assert_eq!(serde_json::to_value(&user).unwrap()["class"], "7B");
    }

    #[test]
    fn actions_map_to_terminal_statuses() {
        assert_eq!(
            RequestAction::Approve.resulting_status(),
            RequestStatus::Approved
        );
        assert_eq!(RequestAction::Deny.resulting_status(), RequestStatus::Denied);
        assert_eq!(
            serde_json::from_value::<RequestAction>(json!("APPROVE")).unwrap(),
            RequestAction::Approve
        );
    }
}
