//! Offline backend: the same commands against a JSON document on disk.

use std::path::{Path, PathBuf};

use chrono::Utc;

use circulation_app::circulation::{
    Book, BorrowRequest, CirculationError, Fine, FineInput, Library, RequestAction, Resolution,
    ReturnReceipt, Role, UserDraft,
};
use circulation_db::DocumentStore;
use circulation_kernel::settings::AuthSettings;

use crate::{error::ClientError, session::Identity};

const FILE_NAME: &str = "library.json";

/// Where the offline document lives and the admin account it starts with.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub dir: PathBuf,
    pub admin_user_id: String,
    pub admin_name: String,
}

impl LocalConfig {
    pub fn new(dir: PathBuf, auth: &AuthSettings) -> Self {
        Self {
            dir,
            admin_user_id: auth.admin_user_id.clone(),
            admin_name: auth.admin_name.clone(),
        }
    }

    pub fn file(&self) -> PathBuf {
        self.dir.join(FILE_NAME)
    }

    async fn store(&self) -> Result<DocumentStore<Library>, ClientError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| anyhow::anyhow!("cannot create {}: {}", self.dir.display(), e))?;
        let store = DocumentStore::at_path(self.file());
        store.load().await?;
        Ok(store)
    }
}

pub struct LocalBackend {
    store: DocumentStore<Library>,
    acting_user: String,
}

impl LocalBackend {
    /// Open the document, adding the configured admin when it is missing.
    pub async fn open(config: &LocalConfig, acting_user: String) -> Result<Self, ClientError> {
        let store = config.store().await?;
        let has_admin = store
            .read(|lib| lib.find_user(&config.admin_user_id).is_some())
            .await;
        if !has_admin {
            store
                .transact(|lib| {
                    lib.upsert_user(UserDraft {
                        id: Some(config.admin_user_id.clone()),
                        name: config.admin_name.clone(),
                        role: Role::Admin,
                        class_name: None,
                        avatar_url: None,
                    })
                    .map_err(ClientError::from)
                })
                .await?;
            tracing::info!(admin_user_id = %config.admin_user_id, "local admin account created");
        }
        tracing::info!(
            path = %config.file().display(),
            acting_user = %acting_user,
            "local store opened"
        );
        Ok(Self { store, acting_user })
    }

    /// Copy server data into the offline document. Last write wins.
    pub async fn mirror(
        config: &LocalConfig,
        update: impl FnOnce(&mut Library),
    ) -> Result<(), ClientError> {
        let store = config.store().await?;
        store
            .transact(|lib| {
                update(lib);
                Ok::<_, ClientError>(())
            })
            .await?;
        tracing::debug!(path = %config.file().display(), "server data mirrored locally");
        Ok(())
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.store.path().map(Path::to_path_buf)
    }

    pub async fn books(&self) -> Vec<Book> {
        self.store.read(|lib| lib.books.clone()).await
    }

    pub async fn snapshot(&self) -> Library {
        self.store.snapshot().await
    }

    /// Switch the acting user. There is no credential check offline.
    pub async fn login(&mut self, user_id: &str) -> Result<Identity, ClientError> {
        let identity = self.identity_of(user_id).await?;
        self.acting_user = identity.user_id.clone();
        Ok(identity)
    }

    pub async fn whoami(&self) -> Result<Identity, ClientError> {
        self.identity_of(&self.acting_user).await
    }

    async fn identity_of(&self, user_id: &str) -> Result<Identity, ClientError> {
        self.store
            .read(|lib| lib.find_user(user_id).map(Identity::from))
            .await
            .ok_or_else(|| CirculationError::UserNotFound(user_id.to_string()).into())
    }

    async fn require_admin(&self) -> Result<(), ClientError> {
        let me = self.whoami().await?;
        if me.is_admin() {
            Ok(())
        } else {
            Err(ClientError::Refused(format!("'{}' is not an admin", me.user_id)))
        }
    }

    pub async fn create_request(&self, book_id: &str) -> Result<BorrowRequest, ClientError> {
        let user_id = self.acting_user.clone();
        self.store
            .transact(|lib| {
                lib.create_request(book_id, &user_id, Utc::now())
                    .map_err(ClientError::from)
            })
            .await
    }

    pub async fn resolve_request(
        &self,
        request_id: &str,
        action: RequestAction,
    ) -> Result<Resolution, ClientError> {
        self.require_admin().await?;
        self.store
            .transact(|lib| {
                lib.resolve_request(request_id, action, Utc::now())
                    .map_err(ClientError::from)
            })
            .await
    }

    pub async fn process_return(
        &self,
        book_id: &str,
        user_id: &str,
        fine: Option<FineInput>,
    ) -> Result<ReturnReceipt, ClientError> {
        self.require_admin().await?;
        self.store
            .transact(|lib| {
                lib.process_return(book_id, user_id, fine, Utc::now())
                    .map_err(ClientError::from)
            })
            .await
    }

    pub async fn pay_fine(&self, fine_id: &str) -> Result<Fine, ClientError> {
        self.require_admin().await?;
        self.store
            .transact(|lib| lib.pay_fine(fine_id).map_err(ClientError::from))
            .await
    }
}
