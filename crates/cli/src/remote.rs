//! HTTP backend talking to the circulation server.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use circulation_app::circulation::{
    Book, BorrowRequest, Fine, FineInput, HistoryRecord, Library, RequestAction, Resolution,
    ReturnReceipt, User,
};

use crate::{
    error::{message_from_body, ClientError},
    session::{Identity, Session},
};

#[derive(Debug, Deserialize)]
struct Queued {
    request: BorrowRequest,
}

pub struct RemoteClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Server {
            status: status.as_u16(),
            message: message_from_body(&body),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.execute(self.http.get(self.url(path))).await?;
        Ok(response.json().await?)
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.request(method, self.url(path)).json(body);
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    pub async fn books(&self) -> Result<Vec<Book>, ClientError> {
        self.get("/books").await
    }

    /// All five collections, fetched concurrently.
    pub async fn snapshot(&self) -> Result<Library, ClientError> {
        let (books, users, requests, history, fines) = tokio::try_join!(
            self.get::<Vec<Book>>("/books"),
            self.get::<Vec<User>>("/users"),
            self.get::<Vec<BorrowRequest>>("/requests"),
            self.get::<Vec<HistoryRecord>>("/history"),
            self.get::<Vec<Fine>>("/fines"),
        )?;
        Ok(Library {
            books,
            users,
            requests,
            history,
            fines,
        })
    }

    pub async fn login(&self, user_id: &str, password: Option<&str>) -> Result<Session, ClientError> {
        self.send(
            Method::POST,
            "/auth/login",
            &json!({ "userId": user_id, "password": password }),
        )
        .await
    }

    pub async fn whoami(&self) -> Result<Identity, ClientError> {
        self.get("/auth/me").await
    }

    pub async fn create_request(&self, book_id: &str) -> Result<BorrowRequest, ClientError> {
        let queued: Queued = self
            .send(Method::POST, "/requests", &json!({ "bookId": book_id }))
            .await?;
        Ok(queued.request)
    }

    pub async fn resolve_request(
        &self,
        request_id: &str,
        action: RequestAction,
    ) -> Result<Resolution, ClientError> {
        self.send(
            Method::PATCH,
            &format!("/requests/{}", request_id),
            &json!({ "action": action }),
        )
        .await
    }

    pub async fn process_return(
        &self,
        book_id: &str,
        user_id: &str,
        fine: Option<FineInput>,
    ) -> Result<ReturnReceipt, ClientError> {
        self.send(
            Method::POST,
            "/history/returns",
            &json!({ "bookId": book_id, "userId": user_id, "fine": fine }),
        )
        .await
    }

    pub async fn pay_fine(&self, fine_id: &str) -> Result<Fine, ClientError> {
        self.send(
            Method::PATCH,
            &format!("/fines/{}", fine_id),
            &json!({ "status": "PAID" }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_under_api() {
        let client = RemoteClient::new(
            "http://127.0.0.1:8080/",
            None,
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(client.url("/books"), "http://127.0.0.1:8080/api/books");
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        // Port 1 is reserved and nothing listens there.
        let client =
            RemoteClient::new("http://127.0.0.1:1", None, Duration::from_millis(500)).unwrap();
        let err = client.snapshot().await.unwrap_err();
        assert!(err.is_unreachable(), "unexpected error: {err}");
    }
}
