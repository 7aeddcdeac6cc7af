use thiserror::Error;

use circulation_app::circulation::CirculationError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Connect failure or timeout. Triggers the switch to the local store.
    #[error("server unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("{}", server_message(.status, .message.as_deref()))]
    Server { status: u16, message: Option<String> },

    #[error(transparent)]
    Circulation(#[from] CirculationError),

    #[error("{0}")]
    Refused(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ClientError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ClientError::Unreachable(err)
        } else {
            ClientError::Transport(err)
        }
    }
}

/// User-facing text for a failed response.
pub fn server_message(status: impl std::fmt::Display, message: Option<&str>) -> String {
    match message {
        Some(message) if !message.trim().is_empty() => message.to_string(),
        _ => format!("Server error: {}", status),
    }
}

/// `message` at the top level of a JSON error body, or under `error`.
pub fn message_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.pointer("/error/message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_status_text() {
        assert_eq!(server_message(503, None), "Server error: 503");
        assert_eq!(server_message(500, Some("  ")), "Server error: 500");
    }

    #[test]
    fn prefers_server_supplied_message() {
        assert_eq!(
            message_from_body(r#"{"message":"book is gone"}"#).as_deref(),
            Some("book is gone")
        );
        assert_eq!(
            message_from_body(r#"{"error":{"code":"not_found","message":"fine 'f9' not found"}}"#)
                .as_deref(),
            Some("fine 'f9' not found")
        );
        assert_eq!(message_from_body("<html>bad gateway</html>"), None);
        assert_eq!(message_from_body(r#"{"error":"flat"}"#), None);
    }

    #[test]
    fn server_error_displays_message_or_status() {
        let with_message = ClientError::Server {
            status: 409,
            message: Some("request already resolved".into()),
        };
        assert_eq!(with_message.to_string(), "request already resolved");

        let bare = ClientError::Server {
            status: 502,
            message: None,
        };
        assert_eq!(bare.to_string(), "Server error: 502");
    }
}
