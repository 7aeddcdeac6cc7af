use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Upper bound on session lifetime (one year).
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Student,
}

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub principal: Principal,
}

#[derive(Debug, Clone)]
struct Session {
    principal: Principal,
    expires_at: DateTime<Utc>,
}

/// Opaque bearer tokens mapped to principals.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        let ttl_secs = ttl_secs.min(MAX_TTL_SECS) as i64;
        Self {
            ttl: Duration::seconds(ttl_secs),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn issue(&self, principal: Principal, now: DateTime<Utc>) -> IssuedSession {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = now + self.ttl;

        self.sessions.write().await.insert(
            token.clone(),
            Session {
                principal: principal.clone(),
                expires_at,
            },
        );

        tracing::info!(
            target: "circulation-authz",
            user_id = %principal.user_id,
            role = ?principal.role,
            "session issued"
        );

        IssuedSession {
            token,
            expires_at,
            principal,
        }
    }

    /// Principal behind `token`, unless the session has expired.
    pub async fn resolve(&self, token: &str, now: DateTime<Utc>) -> Option<Principal> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|session| session.expires_at > now)
            .map(|session| session.principal.clone())
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drop every session of `user_id`, e.g. after the user was deleted.
    pub async fn revoke_user(&self, user_id: &str) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.principal.user_id != user_id);
        before - sessions.len()
    }

    pub async fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student() -> Principal {
        Principal {
            user_id: "u-7".to_string(),
            user_name: "Mina".to_string(),
            role: Role::Student,
        }
    }

    #[tokio::test]
    async fn issued_token_resolves_until_expiry() {
        let store = SessionStore::new(60);
        let now = Utc::now();
        let issued = store.issue(student(), now).await;

        assert_eq!(store.resolve(&issued.token, now).await, Some(student()));
        assert_eq!(
            store
                .resolve(&issued.token, now + Duration::seconds(61))
                .await,
            None
        );
    }

    #[tokio::test]
    async fn revoked_token_no_longer_resolves() {
        let store = SessionStore::new(60);
        let now = Utc::now();
        let issued = store.issue(student(), now).await;

        assert!(store.revoke(&issued.token).await);
        assert!(!store.revoke(&issued.token).await);
        assert_eq!(store.resolve(&issued.token, now).await, None);
    }

    #[tokio::test]
    async fn prune_and_revoke_user_remove_sessions() {
        let store = SessionStore::new(10);
        let now = Utc::now();
        store.issue(student(), now).await;
        store.issue(student(), now + Duration::seconds(30)).await;

        assert_eq!(store.prune_expired(now + Duration::seconds(20)).await, 1);
        assert_eq!(store.revoke_user("u-7").await, 1);
    }

    #[test]
    fn role_uses_upper_case_on_the_wire() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"STUDENT\"").unwrap(),
            Role::Student
        );
    }
}
