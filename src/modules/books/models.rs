use serde::Serialize;

use crate::circulation::waitlist::QueueEntry;

/// A book's waitlist next to its stock.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistView {
    pub book_id: String,
    pub available_copies: u32,
    pub total_copies: u32,
    pub entries: Vec<QueueEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePosition {
    pub book_id: String,
    pub user_id: String,
    pub position: usize,
    pub queue_length: usize,
}
