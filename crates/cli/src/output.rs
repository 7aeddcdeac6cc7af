//! Plain-text rendering of command results.

use std::fmt::Write;

use circulation_app::circulation::{
    waitlist::QueueEntry, Book, BorrowRequest, Fine, FineStatus, Library, Resolution,
    ReturnReceipt,
};

pub fn books(books: &[Book]) -> String {
    let mut out = String::new();
    for book in books {
        let _ = writeln!(
            out,
            "{}  {} by {}  [{}/{} available]",
            book.id, book.title, book.author, book.available_copies, book.total_copies
        );
    }
    if books.is_empty() {
        out.push_str("no books\n");
    }
    out
}

/// One-paragraph overview used by `snapshot` and `watch`.
pub fn summary(library: &Library) -> String {
    let pending = library.requests.iter().filter(|r| r.is_pending()).count();
    let open_loans = library.active_loans().count();
    let unpaid: Vec<&Fine> = library
        .fines
        .iter()
        .filter(|f| f.status == FineStatus::Pending)
        .collect();
    let owed: f64 = unpaid.iter().map(|f| f.amount).sum();
    format!(
        "{} books, {} users, {} pending requests, {} open loans, {} unpaid fines ({:.2})\n",
        library.books.len(),
        library.users.len(),
        pending,
        open_loans,
        unpaid.len(),
        owed
    )
}

pub fn waitlist(book_id: &str, entries: &[QueueEntry]) -> String {
    if entries.is_empty() {
        return format!("nobody is waiting for {}\n", book_id);
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{:>3}. {} ({})  since {}  request {}",
            entry.position,
            entry.user_name,
            entry.user_id,
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.request_id
        );
    }
    out
}

pub fn request(request: &BorrowRequest) -> String {
    format!(
        "request {} for '{}' by {} is {:?}\n",
        request.id, request.book_title, request.user_name, request.status
    )
}

pub fn resolution(resolution: &Resolution) -> String {
    let mut out = request(&resolution.request);
    if let Some(loan) = &resolution.loan {
        let _ = writeln!(out, "loan {} opened", loan.id);
    } else if !resolution.stock_applied {
        out.push_str("no copy was available; inventory unchanged\n");
    }
    out
}

pub fn receipt(receipt: &ReturnReceipt) -> String {
    let mut out = format!(
        "'{}' returned by {}; {}/{} available\n",
        receipt.book.title,
        receipt.record.user_name,
        receipt.book.available_copies,
        receipt.book.total_copies
    );
    if let Some(fine) = &receipt.fine {
        let _ = writeln!(out, "fine {} of {:.2}: {}", fine.id, fine.amount, fine.reason);
    }
    out
}

pub fn fine(fine: &Fine) -> String {
    format!("fine {} ({:.2}) is {:?}\n", fine.id, fine.amount, fine.status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_catalog_says_so() {
        assert_eq!(books(&[]), "no books\n");
    }

    #[test]
    fn summary_counts_only_outstanding_work() {
        let library = Library::default();
        assert_eq!(
            summary(&library),
            "0 books, 0 users, 0 pending requests, 0 open loans, 0 unpaid fines (0.00)\n"
        );
    }
}
