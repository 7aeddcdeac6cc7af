//! Remote-first access with a one-way switch to the local store.
//!
//! Every command is tried against the server first. The first connect
//! failure or timeout moves the process onto the local document for good;
//! server-side rejections (4xx/5xx) never trigger the switch. Successful
//! catalog and snapshot reads are mirrored into the local document so the
//! switch has data to work with.

use std::path::PathBuf;

use circulation_app::circulation::{
    Book, BorrowRequest, Fine, FineInput, Library, RequestAction, Resolution, ReturnReceipt,
};

use crate::{
    error::ClientError,
    local::{LocalBackend, LocalConfig},
    remote::RemoteClient,
    session::Identity,
};

pub enum Backend {
    Remote(RemoteClient),
    Local(LocalBackend),
}

/// Result of `login`: a bearer token when the server issued one.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub token: Option<String>,
}

pub struct Circulation {
    backend: Backend,
    local: LocalConfig,
    acting_user: String,
}

/// Run `$remote_call` when still online; on an unreachable server switch to
/// the local backend and run `$local_call` instead.
macro_rules! with_fallback {
    ($self:ident, $remote:ident => $remote_call:expr, $local:ident => $local_call:expr) => {{
        if let Backend::Remote($remote) = &$self.backend {
            match $remote_call {
                Err(err) if err.is_unreachable() => {
                    tracing::warn!(error = %err, "server unreachable, switching to local store");
                }
                other => return other,
            }
        }
        let $local = $self.local().await?;
        $local_call
    }};
}

impl Circulation {
    pub fn remote(client: RemoteClient, local: LocalConfig, acting_user: String) -> Self {
        Self {
            backend: Backend::Remote(client),
            local,
            acting_user,
        }
    }

    pub async fn offline(local: LocalConfig, acting_user: String) -> Result<Self, ClientError> {
        let backend = LocalBackend::open(&local, acting_user.clone()).await?;
        Ok(Self {
            backend: Backend::Local(backend),
            local,
            acting_user,
        })
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.backend, Backend::Local(_))
    }

    /// Where offline data lives once the switch has happened.
    pub fn local_path(&self) -> Option<PathBuf> {
        match &self.backend {
            Backend::Local(local) => local.path(),
            Backend::Remote(_) => None,
        }
    }

    async fn local(&mut self) -> Result<&mut LocalBackend, ClientError> {
        if let Backend::Remote(_) = self.backend {
            let local = LocalBackend::open(&self.local, self.acting_user.clone()).await?;
            self.backend = Backend::Local(local);
        }
        match &mut self.backend {
            Backend::Local(local) => Ok(local),
            Backend::Remote(_) => Err(ClientError::Refused("local store unavailable".into())),
        }
    }

    pub async fn books(&mut self) -> Result<Vec<Book>, ClientError> {
        with_fallback!(
            self,
            client => fetch_books(client, &self.local).await,
            local => Ok(local.books().await)
        )
    }

    pub async fn snapshot(&mut self) -> Result<Library, ClientError> {
        with_fallback!(
            self,
            client => fetch_snapshot(client, &self.local).await,
            local => Ok(local.snapshot().await)
        )
    }

    pub async fn login(
        &mut self,
        user_id: &str,
        password: Option<&str>,
    ) -> Result<LoginOutcome, ClientError> {
        if let Backend::Remote(client) = &self.backend {
            match client.login(user_id, password).await {
                Ok(session) => {
                    self.acting_user = session.principal.user_id.clone();
                    return Ok(LoginOutcome {
                        identity: session.principal,
                        token: Some(session.token),
                    });
                }
                Err(err) if err.is_unreachable() => {
                    tracing::warn!(error = %err, "server unreachable, switching to local store");
                }
                Err(err) => return Err(err),
            }
        }
        let identity = self.local().await?.login(user_id).await?;
        self.acting_user = identity.user_id.clone();
        Ok(LoginOutcome {
            identity,
            token: None,
        })
    }

    pub async fn whoami(&mut self) -> Result<Identity, ClientError> {
        let identity = with_fallback!(
            self,
            client => client.whoami().await,
            local => local.whoami().await
        )?;
        Ok(identity)
    }

    /// File a borrow request as the acting user, unless one is already pending.
    pub async fn borrow(&mut self, book_id: &str) -> Result<BorrowRequest, ClientError> {
        let me = self.whoami().await?;
        self.acting_user = me.user_id.clone();
        let snapshot = self.snapshot().await?;
        if snapshot.has_pending_request(book_id, &me.user_id) {
            return Err(ClientError::Refused(format!(
                "'{}' already has a pending request for book '{}'",
                me.user_id, book_id
            )));
        }
        with_fallback!(
            self,
            client => client.create_request(book_id).await,
            local => local.create_request(book_id).await
        )
    }

    pub async fn resolve(
        &mut self,
        request_id: &str,
        action: RequestAction,
    ) -> Result<Resolution, ClientError> {
        with_fallback!(
            self,
            client => client.resolve_request(request_id, action).await,
            local => local.resolve_request(request_id, action).await
        )
    }

    pub async fn return_book(
        &mut self,
        book_id: &str,
        user_id: &str,
        fine: Option<FineInput>,
    ) -> Result<ReturnReceipt, ClientError> {
        with_fallback!(
            self,
            client => client.process_return(book_id, user_id, fine.clone()).await,
            local => local.process_return(book_id, user_id, fine).await
        )
    }

    pub async fn pay_fine(&mut self, fine_id: &str) -> Result<Fine, ClientError> {
        with_fallback!(
            self,
            client => client.pay_fine(fine_id).await,
            local => local.pay_fine(fine_id).await
        )
    }
}

async fn fetch_books(client: &RemoteClient, local: &LocalConfig) -> Result<Vec<Book>, ClientError> {
    let books = client.books().await?;
    let mirrored = books.clone();
    keep_locally(local, move |lib| lib.books = mirrored).await;
    Ok(books)
}

async fn fetch_snapshot(client: &RemoteClient, local: &LocalConfig) -> Result<Library, ClientError> {
    let library = client.snapshot().await?;
    let mirrored = library.clone();
    keep_locally(local, move |lib| *lib = mirrored).await;
    Ok(library)
}

/// Mirror failures are logged and never fail the command.
async fn keep_locally(local: &LocalConfig, update: impl FnOnce(&mut Library)) {
    if let Err(err) = LocalBackend::mirror(local, update).await {
        tracing::warn!(error = %err, path = %local.file().display(), "could not mirror server data");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use circulation_app::{
        app,
        circulation::{BookDraft, Role, UserDraft},
        state::AppState,
    };
    use circulation_db::DocumentStore;
    use circulation_kernel::settings::{AuthSettings, Settings};
    use tempfile::TempDir;

    use super::*;

    /// Admin "admin", student "s1" and one copy of book "b1".
    fn catalog() -> Library {
        let mut lib = Library::default();
        lib.upsert_user(UserDraft {
            id: Some("admin".into()),
            name: "Librarian".into(),
            role: Role::Admin,
            class_name: None,
            avatar_url: None,
        })
        .unwrap();
        lib.upsert_user(UserDraft {
            id: Some("s1".into()),
            name: "Ana".into(),
            role: Role::Student,
            class_name: Some("7B".into()),
            avatar_url: None,
        })
        .unwrap();
        lib.upsert_book(BookDraft {
            id: Some("b1".into()),
            title: "Dune".into(),
            author: "Herbert".into(),
            total_copies: 1,
            ..Default::default()
        })
        .unwrap();
        lib
    }

    fn config(dir: &TempDir) -> LocalConfig {
        LocalConfig::new(dir.path().to_path_buf(), &AuthSettings::default())
    }

    async fn seeded_dir() -> (TempDir, LocalConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        LocalBackend::mirror(&config, |lib| *lib = catalog())
            .await
            .unwrap();
        (dir, config)
    }

    fn unreachable_client() -> RemoteClient {
        RemoteClient::new("http://127.0.0.1:1", None, Duration::from_millis(500)).unwrap()
    }

    /// Serve the full application on an ephemeral port, starting from `catalog()`.
    async fn serve(uploads: &TempDir) -> String {
        let mut settings = Settings::default();
        settings.uploads.dir = uploads.path().to_path_buf();
        let state = AppState::with_store(settings, DocumentStore::with_state(None, catalog()));
        let registry = app::build_registry(&state);
        app::boot(&registry, &state).await.unwrap();
        let router = circulation_http::build_router(&registry, &state.settings);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn unreachable_server_switches_to_local_for_good() {
        let (dir, config) = seeded_dir().await;
        let mut circulation = Circulation::remote(unreachable_client(), config, "s1".into());
        assert!(!circulation.is_offline());

        let books = circulation.books().await.unwrap();
        assert_eq!(books.len(), 1);
        assert!(circulation.is_offline());
        assert_eq!(
            circulation.local_path(),
            Some(dir.path().join("library.json"))
        );
    }

    #[tokio::test]
    async fn a_fresh_local_store_starts_with_the_admin() {
        let dir = tempfile::tempdir().unwrap();
        let mut circulation = Circulation::offline(config(&dir), "admin".into())
            .await
            .unwrap();

        let me = circulation.whoami().await.unwrap();
        assert!(me.is_admin());
        assert_eq!(me.user_name, AuthSettings::default().admin_name);
        assert!(circulation.books().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_reads_feed_the_offline_store() {
        let uploads = tempfile::tempdir().unwrap();
        let base_url = serve(&uploads).await;
        let dir = tempfile::tempdir().unwrap();

        let anonymous = RemoteClient::new(&base_url, None, Duration::from_secs(5)).unwrap();
        let session = anonymous.login("s1", None).await.unwrap();
        let client =
            RemoteClient::new(&base_url, Some(session.token), Duration::from_secs(5)).unwrap();
        let mut online = Circulation::remote(client, config(&dir), "s1".into());
        let snapshot = online.snapshot().await.unwrap();
        assert!(!online.is_offline());
        assert_eq!(snapshot.books.len(), 1);

        // A later run that cannot reach the server works from the mirror.
        let mut offline = Circulation::remote(unreachable_client(), config(&dir), "s1".into());
        let request = offline.borrow("b1").await.unwrap();
        assert!(offline.is_offline());
        assert_eq!(request.user_id, "s1");
        assert_eq!(request.book_title, "Dune");
    }

    #[tokio::test]
    async fn offline_borrow_refuses_duplicates() {
        let (_dir, config) = seeded_dir().await;
        let mut circulation = Circulation::offline(config, "s1".into()).await.unwrap();

        let request = circulation.borrow("b1").await.unwrap();
        assert_eq!(request.user_id, "s1");

        let err = circulation.borrow("b1").await.unwrap_err();
        assert!(matches!(err, ClientError::Refused(_)), "got {err}");
    }

    #[tokio::test]
    async fn offline_admin_commands_need_an_admin() {
        let (_dir, config) = seeded_dir().await;
        let mut circulation = Circulation::offline(config, "s1".into()).await.unwrap();
        let request = circulation.borrow("b1").await.unwrap();

        let err = circulation
            .resolve(&request.id, RequestAction::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Refused(_)));

        let outcome = circulation.login("admin", None).await.unwrap();
        assert!(outcome.token.is_none());
        assert!(outcome.identity.is_admin());

        let resolution = circulation
            .resolve(&request.id, RequestAction::Approve)
            .await
            .unwrap();
        assert!(resolution.stock_applied);

        let snapshot = circulation.snapshot().await.unwrap();
        assert_eq!(snapshot.books[0].available_copies, 0);
        assert_eq!(snapshot.history.len(), 1);
    }

    #[tokio::test]
    async fn offline_changes_persist_across_processes() {
        let (_dir, config) = seeded_dir().await;
        {
            let mut circulation = Circulation::offline(config.clone(), "s1".into())
                .await
                .unwrap();
            circulation.borrow("b1").await.unwrap();
        }
        let mut reopened = Circulation::offline(config, "admin".into()).await.unwrap();
        let snapshot = reopened.snapshot().await.unwrap();
        assert_eq!(snapshot.requests.len(), 1);
        assert_eq!(snapshot.waitlist_position("b1", "s1"), Some(1));
    }
}
