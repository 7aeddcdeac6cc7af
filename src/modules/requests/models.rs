use serde::{Deserialize, Serialize};

use crate::circulation::{BorrowRequest, RequestAction, RequestStatus};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub book_id: String,
    /// Admins may file on behalf of a user; students only for themselves.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    pub action: RequestAction,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    pub book_id: Option<String>,
    pub user_id: Option<String>,
    pub status: Option<RequestStatus>,
}

impl RequestFilter {
    pub fn matches(&self, request: &BorrowRequest) -> bool {
        self.book_id.as_deref().map_or(true, |id| request.book_id == id)
            && self.user_id.as_deref().map_or(true, |id| request.user_id == id)
            && self.status.map_or(true, |status| request.status == status)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequest {
    pub request: BorrowRequest,
    /// Waitlist position right after creation.
    pub position: Option<usize>,
}
