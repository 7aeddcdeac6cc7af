//! Request guards.
//!
//! Handlers take [`Principal`] to require any session, or [`AdminPrincipal`]
//! to require an admin session. The session store is found through `FromRef`
//! on the router state.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use circulation_http::error::AppError;

use crate::session::{Principal, SessionStore};

/// Bearer token from the `Authorization` header, if well formed.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    header_token(&parts.headers)
}

pub fn header_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    Arc<SessionStore>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

        let sessions = Arc::<SessionStore>::from_ref(state);
        sessions
            .resolve(token, chrono::Utc::now())
            .await
            .ok_or_else(|| AppError::unauthorized("session expired or unknown"))
    }
}

/// A principal with the ADMIN role.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AdminPrincipal
where
    S: Send + Sync,
    Arc<SessionStore>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;
        if !principal.is_admin() {
            return Err(AppError::forbidden("admin role required"));
        }
        Ok(AdminPrincipal(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use axum::http::{Request, StatusCode};

    #[derive(Clone)]
    struct TestState {
        sessions: Arc<SessionStore>,
    }

    impl FromRef<TestState> for Arc<SessionStore> {
        fn from_ref(state: &TestState) -> Self {
            state.sessions.clone()
        }
    }

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/requests");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    async fn state_with(role: Role) -> (TestState, String) {
        let sessions = Arc::new(SessionStore::new(60));
        let issued = sessions
            .issue(
                Principal {
                    user_id: "u-1".to_string(),
                    user_name: "Ada".to_string(),
                    role,
                },
                chrono::Utc::now(),
            )
            .await;
        (TestState { sessions }, issued.token)
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts(None)), None);
    }

    #[tokio::test]
    async fn student_session_is_a_principal_but_not_an_admin() {
        let (state, token) = state_with(Role::Student).await;
        let header = format!("Bearer {}", token);

        let principal = Principal::from_request_parts(&mut parts(Some(&header)), &state)
            .await
            .unwrap();
        assert_eq!(principal.user_id, "u-1");

        let rejection = AdminPrincipal::from_request_parts(&mut parts(Some(&header)), &state)
            .await
            .unwrap_err();
        assert_eq!(rejection.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let (state, _) = state_with(Role::Admin).await;
        let rejection = Principal::from_request_parts(&mut parts(Some("Bearer nope")), &state)
            .await
            .unwrap_err();
        assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
    }
}
