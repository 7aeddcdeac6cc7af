use serde::Deserialize;

use crate::circulation::{FineInput, HistoryRecord};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    pub user_id: Option<String>,
    pub book_id: Option<String>,
    /// `true` keeps open loans only, `false` closed ones only.
    pub active: Option<bool>,
}

impl HistoryFilter {
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        self.user_id.as_deref().map_or(true, |id| record.user_id == id)
            && self.book_id.as_deref().map_or(true, |id| record.book_id == id)
            && self.active.map_or(true, |active| record.is_active() == active)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBook {
    pub book_id: String,
    pub user_id: String,
    #[serde(default)]
    pub fine: Option<FineInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloseLoan {
    #[serde(default)]
    pub fine: Option<FineInput>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn record(user_id: &str, book_id: &str, returned: bool) -> HistoryRecord {
        let borrowed = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        HistoryRecord {
            id: format!("{}-{}", user_id, book_id),
            book_id: book_id.into(),
            book_title: "Dune".into(),
            user_id: user_id.into(),
            user_name: user_id.to_uppercase(),
            borrow_date: borrowed,
            return_date: returned.then(|| borrowed + chrono::Duration::days(7)),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = HistoryFilter::default();
        assert!(filter.matches(&record("u1", "b1", false)));
        assert!(filter.matches(&record("u2", "b2", true)));
    }

    #[test]
    fn active_flag_splits_open_and_closed_loans() {
        let open_only = HistoryFilter {
            active: Some(true),
            ..Default::default()
        };
        assert!(open_only.matches(&record("u1", "b1", false)));
        assert!(!open_only.matches(&record("u1", "b1", true)));

        let closed_only = HistoryFilter {
            active: Some(false),
            user_id: Some("u1".into()),
            ..Default::default()
        };
        assert!(closed_only.matches(&record("u1", "b1", true)));
        assert!(!closed_only.matches(&record("u2", "b1", true)));
    }

    #[test]
    fn close_loan_body_may_be_empty() {
        let body: CloseLoan = serde_json::from_str("{}").unwrap();
        assert!(body.fine.is_none());

        let body: ReturnBook = serde_json::from_str(
            r#"{"bookId":"b1","userId":"u1","fine":{"amount":2.5,"reason":"torn cover"}}"#,
        )
        .unwrap();
        assert_eq!(body.fine.map(|f| f.amount), Some(2.5));
    }
}
