//! Per-book waitlists derived from the request set.
//!
//! Nothing here is stored. A queue is the PENDING requests for one book in
//! ascending timestamp order; equal timestamps keep their insertion order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::BorrowRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// 1-based.
    pub position: usize,
    pub request_id: String,
    pub user_id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Pending requests for `book_id`, oldest first.
pub fn queue_for<'a>(requests: &'a [BorrowRequest], book_id: &str) -> Vec<&'a BorrowRequest> {
    let mut queue: Vec<&BorrowRequest> = requests
        .iter()
        .filter(|r| r.is_pending() && r.book_id == book_id)
        .collect();
    // sort_by_key is stable
    queue.sort_by_key(|r| r.timestamp);
    queue
}

/// Position of `user_id`'s pending request for `book_id`, if any.
pub fn position(requests: &[BorrowRequest], book_id: &str, user_id: &str) -> Option<usize> {
    queue_for(requests, book_id)
        .iter()
        .position(|r| r.user_id == user_id)
        .map(|index| index + 1)
}

pub fn entries(requests: &[BorrowRequest], book_id: &str) -> Vec<QueueEntry> {
    numbered(queue_for(requests, book_id))
}

fn numbered(queue: Vec<&BorrowRequest>) -> Vec<QueueEntry> {
    queue
        .into_iter()
        .enumerate()
        .map(|(index, r)| QueueEntry {
            position: index + 1,
            request_id: r.id.clone(),
            user_id: r.user_id.clone(),
            user_name: r.user_name.clone(),
            timestamp: r.timestamp,
        })
        .collect()
}

/// Every non-empty queue, keyed by book id.
pub fn queues(requests: &[BorrowRequest]) -> BTreeMap<String, Vec<QueueEntry>> {
    let mut by_book: BTreeMap<String, Vec<&BorrowRequest>> = BTreeMap::new();
    for request in requests.iter().filter(|r| r.is_pending()) {
        by_book
            .entry(request.book_id.clone())
            .or_default()
            .push(request);
    }

    by_book
        .into_iter()
        .map(|(book_id, mut pending)| {
            pending.sort_by_key(|r| r.timestamp);
            (book_id, numbered(pending))
        })
        .collect()
}
