use anyhow::Context;

/// The shared admin secret, held only as a bcrypt hash.
#[derive(Debug, Clone, Default)]
pub struct AdminCredential {
    hash: Option<String>,
}

impl AdminCredential {
    pub fn new(hash: Option<String>) -> Self {
        Self {
            hash: hash.filter(|h| !h.trim().is_empty()),
        }
    }

    /// Hash `secret` with `cost`. Used by tooling and tests to mint a credential.
    pub fn from_secret(secret: &str, cost: u32) -> anyhow::Result<Self> {
        let hash = bcrypt::hash(secret, cost).context("failed to hash admin secret")?;
        Ok(Self { hash: Some(hash) })
    }

    pub fn is_configured(&self) -> bool {
        self.hash.is_some()
    }

    /// Check `candidate` against the stored hash off the async runtime.
    ///
    /// An unconfigured credential or a malformed hash never verifies.
    pub async fn verify(&self, candidate: &str) -> bool {
        let Some(hash) = self.hash.clone() else {
            return false;
        };
        let candidate = candidate.to_owned();

        match tokio::task::spawn_blocking(move || bcrypt::verify(candidate, &hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(err)) => {
                tracing::warn!(target: "circulation-authz", error = %err, "admin hash could not be checked");
                false
            }
            Err(err) => {
                tracing::error!(target: "circulation-authz", error = %err, "credential check panicked");
                false
            }
        }
    }
}
