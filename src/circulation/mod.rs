//! Circulation aggregate.
//!
//! [`Library`] owns the five collections (books, users, requests, history,
//! fines) and is the only place that changes them. Each command is a plain
//! method over `&mut Library`; the store runs it as one transaction, so the
//! book, history and fine writes of a command land together or not at all.

pub mod error;
pub mod models;
pub mod waitlist;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::new_id;

pub use error::CirculationError;
pub use models::*;

pub type Result<T> = std::result::Result<T, CirculationError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub requests: Vec<BorrowRequest>,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    #[serde(default)]
    pub fines: Vec<Fine>,
}

/// Outcome of [`Library::resolve_request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub request: BorrowRequest,
    /// Loan opened by an approval that found stock.
    pub loan: Option<HistoryRecord>,
    /// False when an approval found no copy (or no book) and changed no inventory.
    pub stock_applied: bool,
}

/// Outcome of [`Library::process_return`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnReceipt {
    pub book: Book,
    pub record: HistoryRecord,
    pub fine: Option<Fine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Upserted<T> {
    pub record: T,
    pub created: bool,
}

impl Library {
    // ----- lookups -----

    pub fn find_book(&self, id: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    pub fn find_user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn find_request(&self, id: &str) -> Option<&BorrowRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    pub fn find_history(&self, id: &str) -> Option<&HistoryRecord> {
        self.history.iter().find(|h| h.id == id)
    }

    pub fn find_fine(&self, id: &str) -> Option<&Fine> {
        self.fines.iter().find(|f| f.id == id)
    }

    pub fn active_loans(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.history.iter().filter(|h| h.is_active())
    }

    pub fn loans_for_user<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a HistoryRecord> {
        self.history.iter().filter(move |h| h.user_id == user_id)
    }

    pub fn fines_for_user<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a Fine> {
        self.fines.iter().filter(move |f| f.user_id == user_id)
    }

    /// Whether `user_id` already waits on `book_id`. Used by clients to hide
    /// a second borrow action; [`create_request`](Self::create_request) does
    /// not consult it.
    pub fn has_pending_request(&self, book_id: &str, user_id: &str) -> bool {
        self.requests
            .iter()
            .any(|r| r.is_pending() && r.book_id == book_id && r.user_id == user_id)
    }

    pub fn waitlist(&self, book_id: &str) -> Vec<waitlist::QueueEntry> {
        waitlist::entries(&self.requests, book_id)
    }

    pub fn waitlist_position(&self, book_id: &str, user_id: &str) -> Option<usize> {
        waitlist::position(&self.requests, book_id, user_id)
    }

    // ----- catalog -----

    pub fn upsert_book(&mut self, draft: BookDraft) -> Result<Upserted<Book>> {
        if draft.title.trim().is_empty() {
            return Err(CirculationError::MissingField { field: "title" });
        }

        let id = draft.id.clone().filter(|id| !id.trim().is_empty());
        let existing = id
            .as_deref()
            .and_then(|id| self.books.iter().position(|b| b.id == id));

        match existing {
            Some(index) => {
                let stored = &self.books[index];
                // Keep the number of copies on loan when only the total changes.
                let available = draft.available_copies.unwrap_or_else(|| {
                    draft.total_copies.saturating_sub(stored.copies_on_loan())
                });
                let book = Book {
                    id: stored.id.clone(),
                    title: draft.title,
                    author: draft.author,
                    category: draft.category,
                    year: draft.year,
                    isbn: draft.isbn,
                    cover_url: draft.cover_url,
                    price: draft.price,
                    total_copies: draft.total_copies,
                    available_copies: available,
                    current_borrowers: stored.current_borrowers.clone(),
                };
                check_stock(&book)?;
                self.books[index] = book.clone();
                tracing::debug!(book_id = %book.id, "book updated");
                Ok(Upserted {
                    record: book,
                    created: false,
                })
            }
            None => {
                let book = Book {
                    id: id.unwrap_or_else(new_id),
                    title: draft.title,
                    author: draft.author,
                    category: draft.category,
                    year: draft.year,
                    isbn: draft.isbn,
                    cover_url: draft.cover_url,
                    price: draft.price,
                    total_copies: draft.total_copies,
                    available_copies: draft.available_copies.unwrap_or(draft.total_copies),
                    current_borrowers: Vec::new(),
                };
                check_stock(&book)?;
                self.books.push(book.clone());
                tracing::debug!(book_id = %book.id, "book created");
                Ok(Upserted {
                    record: book,
                    created: true,
                })
            }
        }
    }

    /// Upsert every draft or none of them.
    pub fn upsert_books(&mut self, drafts: Vec<BookDraft>) -> Result<Vec<Upserted<Book>>> {
        let mut draft_lib = self.clone();
        let saved = drafts
            .into_iter()
            .map(|d| draft_lib.upsert_book(d))
            .collect::<Result<Vec<_>>>()?;
        *self = draft_lib;
        Ok(saved)
    }

    pub fn delete_book(&mut self, id: &str) -> Result<Book> {
        let index = self
            .books
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| CirculationError::BookNotFound(id.to_string()))?;
        let book = self.books.remove(index);
        if !book.current_borrowers.is_empty() {
            tracing::warn!(
                book_id = %book.id,
                borrowers = book.current_borrowers.len(),
                "deleted a book that still has copies on loan"
            );
        }
        Ok(book)
    }

    pub fn upsert_user(&mut self, draft: UserDraft) -> Result<Upserted<User>> {
        if draft.name.trim().is_empty() {
            return Err(CirculationError::MissingField { field: "name" });
        }

        let id = draft.id.filter(|id| !id.trim().is_empty());
        let existing = id
            .as_deref()
            .and_then(|id| self.users.iter().position(|u| u.id == id));
        let created = existing.is_none();

        let user = User {
            id: id.unwrap_or_else(new_id),
            name: draft.name,
            role: draft.role,
            class_name: draft.class_name,
            avatar_url: draft.avatar_url,
        };

        match existing {
            Some(index) => self.users[index] = user.clone(),
            None => self.users.push(user.clone()),
        }

        Ok(Upserted {
            record: user,
            created,
        })
    }

    /// Upsert every draft or none of them.
    pub fn upsert_users(&mut self, drafts: Vec<UserDraft>) -> Result<Vec<Upserted<User>>> {
        let mut draft_lib = self.clone();
        let saved = drafts
            .into_iter()
            .map(|d| draft_lib.upsert_user(d))
            .collect::<Result<Vec<_>>>()?;
        *self = draft_lib;
        Ok(saved)
    }

    pub fn delete_user(&mut self, id: &str) -> Result<User> {
        let index = self
            .users
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| CirculationError::UserNotFound(id.to_string()))?;
        Ok(self.users.remove(index))
    }

    // ----- circulation -----

    /// Queue a new PENDING request.
    ///
    /// Stock and existing requests are not checked: a user may hold several
    /// pending requests for the same book.
    pub fn create_request(
        &mut self,
        book_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<BorrowRequest> {
        let book = self
            .find_book(book_id)
            .ok_or_else(|| CirculationError::BookNotFound(book_id.to_string()))?;
        let user = self
            .find_user(user_id)
            .ok_or_else(|| CirculationError::UserNotFound(user_id.to_string()))?;

        let request = BorrowRequest {
            id: new_id(),
            book_id: book.id.clone(),
            book_title: book.title.clone(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            status: RequestStatus::Pending,
            timestamp: now,
        };

        self.requests.push(request.clone());
        tracing::info!(
            request_id = %request.id,
            book_id = %request.book_id,
            user_id = %request.user_id,
            "borrow request created"
        );
        Ok(request)
    }

    /// Approve or deny a PENDING request.
    ///
    /// Approval takes a copy only when the book exists and has one available.
    /// Otherwise the request is still marked APPROVED and inventory is left
    /// alone; `stock_applied` reports which case happened.
    pub fn resolve_request(
        &mut self,
        request_id: &str,
        action: RequestAction,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let index = self
            .requests
            .iter()
            .position(|r| r.id == request_id)
            .ok_or_else(|| CirculationError::RequestNotFound(request_id.to_string()))?;

        let current = &self.requests[index];
        if !current.is_pending() {
            return Err(CirculationError::RequestResolved {
                id: current.id.clone(),
                status: current.status,
            });
        }

        let mut loan = None;
        if action == RequestAction::Approve {
            let request = current.clone();
            match self
                .books
                .iter_mut()
                .find(|b| b.id == request.book_id)
                .filter(|b| b.is_available())
            {
                Some(book) => {
                    book.available_copies -= 1;
                    book.current_borrowers.push(Borrower {
                        user_id: request.user_id.clone(),
                        user_name: request.user_name.clone(),
                    });
                    let record = HistoryRecord {
                        id: new_id(),
                        book_id: request.book_id.clone(),
                        book_title: request.book_title.clone(),
                        user_id: request.user_id.clone(),
                        user_name: request.user_name.clone(),
                        borrow_date: now,
                        return_date: None,
                    };
                    self.history.push(record.clone());
                    loan = Some(record);
                }
                None => {
                    tracing::warn!(
                        request_id = %request.id,
                        book_id = %request.book_id,
                        "approved without stock, inventory unchanged"
                    );
                }
            }
        }

        let request = &mut self.requests[index];
        request.status = action.resulting_status();
        tracing::info!(
            request_id = %request.id,
            status = ?request.status,
            loan_opened = loan.is_some(),
            "borrow request resolved"
        );

        Ok(Resolution {
            request: request.clone(),
            stock_applied: loan.is_some(),
            loan,
        })
    }

    /// Close `user_id`'s oldest open loan of `book_id`.
    ///
    /// Returns a copy to stock (never above `total_copies`), drops one of the
    /// user's borrower entries, stamps the return date and, when `fine` has a
    /// positive amount, opens a PENDING fine against the closed record.
    pub fn process_return(
        &mut self,
        book_id: &str,
        user_id: &str,
        fine: Option<FineInput>,
        now: DateTime<Utc>,
    ) -> Result<ReturnReceipt> {
        check_fine(fine.as_ref())?;

        let book_index = self
            .books
            .iter()
            .position(|b| b.id == book_id)
            .ok_or_else(|| CirculationError::BookNotFound(book_id.to_string()))?;
        let history_index = self
            .history
            .iter()
            .position(|h| h.book_id == book_id && h.user_id == user_id && h.is_active())
            .ok_or_else(|| CirculationError::NoActiveLoan {
                book_id: book_id.to_string(),
                user_id: user_id.to_string(),
            })?;

        Ok(self.close_loan(book_index, history_index, fine, now))
    }

    /// Return the book of one specific loan. The loan must still be open.
    pub fn return_loan(
        &mut self,
        history_id: &str,
        fine: Option<FineInput>,
        now: DateTime<Utc>,
    ) -> Result<ReturnReceipt> {
        check_fine(fine.as_ref())?;

        let history_index = self
            .history
            .iter()
            .position(|h| h.id == history_id)
            .ok_or_else(|| CirculationError::HistoryNotFound(history_id.to_string()))?;
        let record = &self.history[history_index];
        if !record.is_active() {
            return Err(CirculationError::NoActiveLoan {
                book_id: record.book_id.clone(),
                user_id: record.user_id.clone(),
            });
        }
        let book_index = self
            .books
            .iter()
            .position(|b| b.id == record.book_id)
            .ok_or_else(|| CirculationError::BookNotFound(record.book_id.clone()))?;

        Ok(self.close_loan(book_index, history_index, fine, now))
    }

    fn close_loan(
        &mut self,
        book_index: usize,
        history_index: usize,
        fine: Option<FineInput>,
        now: DateTime<Utc>,
    ) -> ReturnReceipt {
        let record = &mut self.history[history_index];
        record.return_date = Some(now);
        let record = record.clone();

        let book = &mut self.books[book_index];
        book.available_copies = (book.available_copies + 1).min(book.total_copies);
        if let Some(pos) = book
            .current_borrowers
            .iter()
            .position(|b| b.user_id == record.user_id)
        {
            book.current_borrowers.remove(pos);
        }
        let book = book.clone();

        let fine = fine.filter(|f| f.amount > 0.0).map(|input| Fine {
            id: new_id(),
            user_id: record.user_id.clone(),
            user_name: record.user_name.clone(),
            book_id: record.book_id.clone(),
            book_title: record.book_title.clone(),
            history_id: record.id.clone(),
            amount: input.amount,
            reason: input.reason,
            status: FineStatus::Pending,
            timestamp: now,
        });
        if let Some(fine) = &fine {
            self.fines.push(fine.clone());
        }

        tracing::info!(
            book_id = %book.id,
            user_id = %record.user_id,
            history_id = %record.id,
            fined = fine.is_some(),
            "book returned"
        );

        ReturnReceipt { book, record, fine }
    }

    /// Mark a fine PAID. Paying twice changes nothing.
    pub fn pay_fine(&mut self, fine_id: &str) -> Result<Fine> {
        let fine = self
            .fines
            .iter_mut()
            .find(|f| f.id == fine_id)
            .ok_or_else(|| CirculationError::FineNotFound(fine_id.to_string()))?;
        if fine.status != FineStatus::Paid {
            fine.status = FineStatus::Paid;
            tracing::info!(fine_id = %fine.id, amount = fine.amount, "fine paid");
        }
        Ok(fine.clone())
    }
}

fn check_fine(fine: Option<&FineInput>) -> Result<()> {
    match fine {
        Some(input) if !input.amount.is_finite() => Err(CirculationError::InvalidFineAmount),
        _ => Ok(()),
    }
}

fn check_stock(book: &Book) -> Result<()> {
    if book.available_copies > book.total_copies {
        return Err(CirculationError::StockInvariant {
            book_id: book.id.clone(),
            total: book.total_copies,
            available: book.available_copies,
        });
    }
    Ok(())
}
